//! CSV reading and writing for packet rows and probe samples.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ibc::PacketDelayRow;
use crate::topology::NodePosition;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("no CSV files found in {0}")]
    NoInput(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> ExportError + '_ {
    move |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_err(parent))
        }
        _ => Ok(()),
    }
}

/// Name of the checkpoint written after scanning up to `height`
pub fn checkpoint_file_name(start: u64, height: u64) -> String {
    format!("ibc_packet_delay_{}-{}.csv", start, height)
}

pub fn checkpoint_path(dir: &Path, start: u64, height: u64) -> PathBuf {
    dir.join(checkpoint_file_name(start, height))
}

/// Write `records` to `path`, replacing it, with a header row
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(csv_err(path))?;
    for record in records {
        writer.serialize(record).map_err(csv_err(path))?;
    }
    writer.flush().map_err(io_err(path))
}

/// Append one record, writing the header only when the file is new or empty
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(record).map_err(csv_err(path))?;
    writer.flush().map_err(io_err(path))
}

/// Read every record of a CSV; rows that fail to decode are skipped with a warning.
///
/// An empty file yields no records.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ExportError> {
    let file = File::open(path).map_err(io_err(path))?;
    if file.metadata().map_err(io_err(path))?.len() == 0 {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(file);
    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping row {} of {}: {}", line + 2, path.display(), e),
        }
    }
    Ok(records)
}

pub fn write_rows(path: &Path, rows: &[PacketDelayRow]) -> Result<(), ExportError> {
    write_records(path, rows)
}

pub fn read_rows(path: &Path) -> Result<Vec<PacketDelayRow>, ExportError> {
    read_records(path)
}

/// Write `node,x,y` rows with coordinates rounded to six decimals
pub fn write_positions(path: &Path, positions: &[NodePosition]) -> Result<(), ExportError> {
    let rounded: Vec<NodePosition> = positions
        .iter()
        .map(|p| NodePosition {
            node: p.node.clone(),
            x: round6(p.x),
            y: round6(p.y),
        })
        .collect();
    write_records(path, &rounded)
}

fn round6(v: f64) -> f64 {
    // adding zero folds -0.0 into 0.0
    (v * 1e6).round() / 1e6 + 0.0
}

/// Serialized form of a row without header, used to compare rows for equality
pub fn row_fingerprint(row: &PacketDelayRow) -> String {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if writer.serialize(row).is_err() {
        return format!("{:?}", row);
    }
    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|_| format!("{:?}", row))
}

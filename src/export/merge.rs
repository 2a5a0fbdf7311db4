//! Merging partial CSVs into one deduplicated table.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use super::csv_io::{read_rows, row_fingerprint, write_rows, ExportError};
use crate::ibc::PacketDelayRow;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub files_read: usize,
    pub files_empty: usize,
    pub rows_in: usize,
    pub rows_out: usize,
    pub duplicates: usize,
}

/// CSV files directly under `dir`, sorted by path
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    let entries = fs::read_dir(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

/// Drop exact duplicate rows, keeping the first occurrence
pub fn dedup_rows(rows: Vec<PacketDelayRow>) -> (Vec<PacketDelayRow>, usize) {
    let mut seen = HashSet::with_capacity(rows.len());
    let before = rows.len();
    let kept: Vec<PacketDelayRow> = rows
        .into_iter()
        .filter(|row| seen.insert(row_fingerprint(row)))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Read `files` (in parallel, concatenated in the given order) and deduplicate
pub fn merge_files(files: &[PathBuf]) -> Result<(Vec<PacketDelayRow>, MergeSummary), ExportError> {
    let tables: Vec<Vec<PacketDelayRow>> = files
        .par_iter()
        .map(|path| read_rows(path))
        .collect::<Result<_, _>>()?;

    let mut summary = MergeSummary::default();
    let mut all = Vec::new();
    for (path, rows) in files.iter().zip(tables) {
        if rows.is_empty() {
            log::debug!("Skipping empty file {}", path.display());
            summary.files_empty += 1;
            continue;
        }
        summary.files_read += 1;
        summary.rows_in += rows.len();
        all.extend(rows);
    }

    let (rows, duplicates) = dedup_rows(all);
    summary.rows_out = rows.len();
    summary.duplicates = duplicates;
    Ok((rows, summary))
}

/// Merge every CSV in `dir` into `output`.
///
/// `output` itself is excluded from the inputs when it lives in `dir`.
pub fn merge_directory(dir: &Path, output: &Path) -> Result<MergeSummary, ExportError> {
    let output_abs = fs::canonicalize(output).ok();
    let files: Vec<PathBuf> = list_csv_files(dir)?
        .into_iter()
        .filter(|p| output_abs.is_none() || fs::canonicalize(p).ok() != output_abs)
        .collect();
    if files.is_empty() {
        return Err(ExportError::NoInput(dir.to_path_buf()));
    }

    log::info!("Merging {} CSV files from {}", files.len(), dir.display());
    let (rows, summary) = merge_files(&files)?;
    write_rows(output, &rows)?;
    log::info!(
        "Wrote {} rows to {} ({} duplicates dropped, {} empty files)",
        summary.rows_out,
        output.display(),
        summary.duplicates,
        summary.files_empty
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(seq: &str, send: u64, ack: Option<u64>) -> PacketDelayRow {
        let mut row = PacketDelayRow {
            channel_id: "channel-141".to_string(),
            sequence: seq.to_string(),
            send_height: Some(send),
            ack_height: ack,
            ..Default::default()
        };
        row.refresh_delays();
        row
    }

    #[test]
    fn test_dedup_keeps_first() {
        let rows = vec![row("1", 10, Some(12)), row("2", 11, None), row("1", 10, Some(12))];
        let (kept, dropped) = dedup_rows(rows);
        assert_eq!(dropped, 1);
        assert_eq!(kept, vec![row("1", 10, Some(12)), row("2", 11, None)]);
    }

    #[test]
    fn test_rows_differing_in_one_cell_are_kept() {
        let (kept, dropped) = dedup_rows(vec![row("1", 10, None), row("1", 10, Some(12))]);
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_merge_directory_and_idempotence() {
        let dir = TempDir::new().unwrap();
        let parts = dir.path().join("current");
        fs::create_dir_all(&parts).unwrap();
        write_rows(&parts.join("ibc_packet_delay_1-100.csv"), &[row("1", 10, Some(12))]).unwrap();
        write_rows(
            &parts.join("ibc_packet_delay_1-200.csv"),
            &[row("1", 10, Some(12)), row("2", 150, Some(153))],
        )
        .unwrap();
        fs::File::create(parts.join("empty.csv")).unwrap();
        fs::write(parts.join("notes.txt"), "ignored").unwrap();

        let merged = dir.path().join("merged.csv");
        let summary = merge_directory(&parts, &merged).unwrap();
        assert_eq!(summary.files_read, 2);
        assert_eq!(summary.files_empty, 1);
        assert_eq!(summary.rows_in, 3);
        assert_eq!(summary.rows_out, 2);
        assert_eq!(summary.duplicates, 1);

        let first = fs::read_to_string(&merged).unwrap();
        let again = dir.path().join("again.csv");
        let (rows, summary) = merge_files(&[merged.clone()]).unwrap();
        assert_eq!(summary.duplicates, 0);
        write_rows(&again, &rows).unwrap();
        assert_eq!(fs::read_to_string(&again).unwrap(), first);
    }

    #[test]
    fn test_output_inside_input_dir_is_excluded() {
        let dir = TempDir::new().unwrap();
        write_rows(&dir.path().join("a.csv"), &[row("1", 10, None)]).unwrap();
        let output = dir.path().join("merged.csv");
        merge_directory(dir.path(), &output).unwrap();
        let summary = merge_directory(dir.path(), &output).unwrap();
        assert_eq!(summary.files_read, 1);
        assert_eq!(summary.rows_out, 1);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = merge_directory(dir.path(), &dir.path().join("out.csv"));
        assert!(matches!(result, Err(ExportError::NoInput(_))));
    }
}

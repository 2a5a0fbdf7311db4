//! CSV export, checkpoint naming and multi-file merge.

pub mod csv_io;
pub mod merge;

pub use csv_io::{
    append_record, checkpoint_path, read_records, read_rows, write_positions, write_records,
    write_rows, ExportError,
};
pub use merge::{merge_directory, merge_files, MergeSummary};

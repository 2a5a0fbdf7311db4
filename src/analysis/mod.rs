//! Offline analysis of packet-delay and probe CSVs.
//!
//! This module provides delay statistics, distribution fitting, fee
//! relationships and the plots and reports built from them.

pub mod delay;
pub mod fit;
pub mod plots;
pub mod probes;
pub mod prompt;
pub mod report;
pub mod stats;
pub mod types;

pub use delay::{analyze_delays, DelayAnalysis, DelayTables};
pub use fit::{fit_families, Family, FitReport, FitResult};
pub use types::*;
pub use report::{generate_json_report, generate_text_report};

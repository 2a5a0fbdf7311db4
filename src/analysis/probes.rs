//! Summaries of the block-interval and mempool probe outputs.

use super::stats::{self, Histogram};
use super::types::{BlockIntervalReport, MempoolReport};
use crate::ibc::time::format_time;
use crate::scan::block_times::{interval_values, BlockIntervalRow};
use crate::scan::MempoolSample;

pub fn block_interval_report(rows: &[BlockIntervalRow]) -> BlockIntervalReport {
    BlockIntervalReport {
        blocks: rows.len(),
        first_height: rows.first().map(|r| r.height),
        last_height: rows.last().map(|r| r.height),
        interval_sec: stats::describe(&interval_values(rows)),
    }
}

pub fn block_interval_histogram(rows: &[BlockIntervalRow]) -> Option<Histogram> {
    let values = interval_values(rows);
    Histogram::new(&values, stats::freedman_diaconis_bins(&values))
}

/// Columns of the mempool CSV that get plotted, with their axis labels
pub const MEMPOOL_SERIES: [(&str, &str); 3] = [
    ("n_txs", "Unconfirmed transactions"),
    ("total", "Total transactions"),
    ("total_bytes", "Total bytes"),
];

pub fn mempool_series(samples: &[MempoolSample], column: &str) -> Vec<f64> {
    samples
        .iter()
        .filter_map(|s| match column {
            "n_txs" => Some(s.n_txs as f64),
            "total" => Some(s.total as f64),
            "total_bytes" => Some(s.total_bytes as f64),
            _ => None,
        })
        .collect()
}

pub fn mempool_report(samples: &[MempoolSample]) -> MempoolReport {
    MempoolReport {
        samples: samples.len(),
        first_sample: samples.first().map(|s| format_time(&s.timestamp)),
        last_sample: samples.last().map(|s| format_time(&s.timestamp)),
        n_txs: stats::describe(&mempool_series(samples, "n_txs")),
        total: stats::describe(&mempool_series(samples, "total")),
        total_bytes: stats::describe(&mempool_series(samples, "total_bytes")),
    }
}

/// Seconds since the first sample, for time-axis scatter plots
pub fn elapsed_seconds(samples: &[MempoolSample]) -> Vec<f64> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|s| crate::ibc::time::seconds_between(&first.timestamp, &s.timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibc::time::parse_block_time;

    fn sample(t: &str, n: u64) -> MempoolSample {
        MempoolSample {
            timestamp: parse_block_time(t).unwrap(),
            n_txs: n,
            total: n * 2,
            total_bytes: n * 1000,
        }
    }

    #[test]
    fn test_mempool_report() {
        let samples = vec![
            sample("2025-01-01T00:00:00Z", 2),
            sample("2025-01-01T00:00:03Z", 4),
            sample("2025-01-01T00:00:06Z", 6),
        ];
        let report = mempool_report(&samples);
        assert_eq!(report.samples, 3);
        assert_eq!(report.n_txs.mean, 4.0);
        assert_eq!(report.total_bytes.max, 6000.0);
        assert_eq!(report.first_sample.as_deref(), Some("2025-01-01T00:00:00.000000Z"));
        assert_eq!(elapsed_seconds(&samples), vec![0.0, 3.0, 6.0]);
        assert!(mempool_series(&samples, "bogus").is_empty());
    }

    #[test]
    fn test_block_interval_report() {
        let times: Vec<(u64, chrono::DateTime<chrono::Utc>)> = [
            (1, "2025-01-01T00:00:00Z"),
            (2, "2025-01-01T00:00:06Z"),
            (3, "2025-01-01T00:00:13Z"),
        ]
        .iter()
        .map(|(h, t)| (*h, parse_block_time(t).unwrap()))
        .collect();
        let rows = crate::scan::block_times::intervals(&times);
        let report = block_interval_report(&rows);
        assert_eq!(report.blocks, 3);
        assert_eq!(report.interval_sec.count, 2);
        assert_eq!(report.interval_sec.mean, 6.5);
        assert_eq!(report.last_height, Some(3));
        assert!(block_interval_histogram(&rows).is_some());
    }
}

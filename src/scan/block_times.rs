//! Block production interval sampling.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::block_progress;
use crate::ibc::time::{csv_datetime, seconds_between};
use crate::rpc::ChainRpc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockIntervalRow {
    pub height: u64,
    #[serde(with = "csv_datetime")]
    pub time: DateTime<Utc>,
    /// Seconds since the previous height; empty when that height is missing
    pub interval_sec: Option<f64>,
}

/// Header times for `start..=end`; unfetchable heights are skipped with a warning
pub fn sample_block_times<R: ChainRpc>(
    rpc: &R,
    start: u64,
    end: u64,
    request_delay: Duration,
    show_progress: bool,
) -> Vec<BlockIntervalRow> {
    let progress = block_progress(end.saturating_sub(start) + 1, show_progress);
    let mut times = Vec::new();
    for height in start..=end {
        match rpc.block_time(height) {
            Ok(time) => times.push((height, time)),
            Err(e) => log::warn!("Skipping height {}: {}", height, e),
        }
        progress.inc(1);
        if height < end && !request_delay.is_zero() {
            thread::sleep(request_delay);
        }
    }
    progress.finish_and_clear();
    intervals(&times)
}

/// Intervals between consecutive heights
pub fn intervals(times: &[(u64, DateTime<Utc>)]) -> Vec<BlockIntervalRow> {
    let mut rows = Vec::with_capacity(times.len());
    let mut previous: Option<(u64, DateTime<Utc>)> = None;
    for &(height, time) in times {
        let interval_sec = match previous {
            Some((h, t)) if h + 1 == height => Some(seconds_between(&t, &time)),
            _ => None,
        };
        rows.push(BlockIntervalRow {
            height,
            time,
            interval_sec,
        });
        previous = Some((height, time));
    }
    rows
}

pub fn interval_values(rows: &[BlockIntervalRow]) -> Vec<f64> {
    rows.iter().filter_map(|r| r.interval_sec).collect()
}

//! Timestamp gap-fill for rows whose send or ack time is missing.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::progress::block_progress;
use crate::ibc::PacketDelayRow;
use crate::rpc::ChainRpc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillSummary {
    /// Distinct heights referenced by a row with an empty time
    pub heights_missing: usize,
    pub heights_fetched: usize,
    pub heights_failed: Vec<u64>,
    pub rows_updated: usize,
}

/// Heights that some row needs a timestamp for
pub fn missing_heights(rows: &[PacketDelayRow]) -> BTreeSet<u64> {
    let mut heights = BTreeSet::new();
    for row in rows {
        if let (Some(h), None) = (row.send_height, row.send_time) {
            heights.insert(h);
        }
        if let (Some(h), None) = (row.ack_height, row.ack_time) {
            heights.insert(h);
        }
        if let (Some(h), None) = (row.recv_height, row.recv_time) {
            heights.insert(h);
        }
    }
    heights
}

/// Fill empty times from `times`, recomputing delays for touched rows.
///
/// Returns the number of rows changed.
pub fn apply_times(rows: &mut [PacketDelayRow], times: &BTreeMap<u64, DateTime<Utc>>) -> usize {
    let lookup = |h: Option<u64>| h.and_then(|h| times.get(&h).copied());
    let mut updated = 0;
    for row in rows.iter_mut() {
        let mut changed = false;
        if row.send_time.is_none() {
            if let Some(t) = lookup(row.send_height) {
                row.send_time = Some(t);
                changed = true;
            }
        }
        if row.ack_time.is_none() {
            if let Some(t) = lookup(row.ack_height) {
                row.ack_time = Some(t);
                changed = true;
            }
        }
        if row.recv_time.is_none() {
            if let Some(t) = lookup(row.recv_height) {
                row.recv_time = Some(t);
                changed = true;
            }
        }
        if changed {
            row.refresh_delays();
            updated += 1;
        }
    }
    updated
}

/// Fetch each missing height once and fill the rows in place
pub fn fill_missing_times<R: ChainRpc>(
    rpc: &R,
    rows: &mut [PacketDelayRow],
    request_delay: Duration,
    show_progress: bool,
) -> FillSummary {
    let heights = missing_heights(rows);
    let mut summary = FillSummary {
        heights_missing: heights.len(),
        ..Default::default()
    };
    if heights.is_empty() {
        log::info!("No missing timestamps");
        return summary;
    }

    log::info!("Fetching timestamps for {} heights", heights.len());
    let progress = block_progress(heights.len() as u64, show_progress);
    let mut times = BTreeMap::new();
    for (i, height) in heights.iter().copied().enumerate() {
        match rpc.block_time(height) {
            Ok(time) => {
                times.insert(height, time);
            }
            Err(e) => {
                log::warn!("Could not fetch time for height {}: {}", height, e);
                summary.heights_failed.push(height);
            }
        }
        progress.inc(1);
        if i + 1 < heights.len() && !request_delay.is_zero() {
            thread::sleep(request_delay);
        }
    }
    progress.finish_and_clear();

    summary.heights_fetched = times.len();
    summary.rows_updated = apply_times(rows, &times);
    log::info!(
        "Filled {} rows from {} heights ({} failed)",
        summary.rows_updated,
        summary.heights_fetched,
        summary.heights_failed.len()
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibc::time::parse_block_time;
    use crate::rpc::MemoryChain;

    fn row(send: u64, ack: Option<u64>) -> PacketDelayRow {
        PacketDelayRow {
            channel_id: "channel-0".to_string(),
            sequence: send.to_string(),
            send_height: Some(send),
            ack_height: ack,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_heights_are_unique() {
        let mut rows = vec![row(10, Some(12)), row(10, Some(13)), row(11, None)];
        rows[2].send_time = parse_block_time("2025-01-01T00:00:00Z");
        let heights: Vec<u64> = missing_heights(&rows).into_iter().collect();
        assert_eq!(heights, vec![10, 12, 13]);
    }

    #[test]
    fn test_fill_recomputes_delays_and_reports_failures() {
        let chain = MemoryChain::new()
            .with_block(10, "2025-01-01T00:00:00Z")
            .with_block(12, "2025-01-01T00:00:11.000001Z");
        let mut rows = vec![row(10, Some(12)), row(10, Some(99))];

        let summary = fill_missing_times(&chain, &mut rows, Duration::ZERO, false);
        assert_eq!(summary.heights_missing, 3);
        assert_eq!(summary.heights_fetched, 2);
        assert_eq!(summary.heights_failed, vec![99]);
        assert_eq!(summary.rows_updated, 2);

        assert_eq!(rows[0].time_delay_sec, Some(11.000001));
        assert_eq!(rows[0].block_delay, Some(2));
        assert!(rows[1].send_time.is_some());
        assert_eq!(rows[1].ack_time, None);
        assert_eq!(rows[1].time_delay_sec, None);
    }

    #[test]
    fn test_existing_times_are_kept() {
        let original = parse_block_time("2025-06-01T00:00:00Z");
        let mut rows = vec![row(10, None)];
        rows[0].send_time = original;
        let times = BTreeMap::from([(10, parse_block_time("2030-01-01T00:00:00Z").unwrap())]);
        assert_eq!(apply_times(&mut rows, &times), 0);
        assert_eq!(rows[0].send_time, original);
    }
}

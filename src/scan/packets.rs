//! Sequential packet scan over a height range.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use super::progress::block_progress;
use crate::export::{checkpoint_path, write_rows, ExportError};
use crate::ibc::{extract_packet_events, PacketCorrelator, PacketDelayRow};
use crate::rpc::ChainRpc;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub start_height: u64,
    /// Inclusive
    pub end_height: u64,
    /// Write a checkpoint CSV every this many blocks; 0 disables checkpoints
    pub checkpoint_interval: u64,
    pub checkpoint_dir: Option<PathBuf>,
    pub request_delay: Duration,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub start_height: u64,
    pub end_height: u64,
    pub blocks_scanned: u64,
    /// Blocks whose results could not be fetched
    pub blocks_skipped: u64,
    /// Heights with packet events whose header time could not be fetched
    pub missing_times: u64,
    pub events: u64,
    pub sends: usize,
    pub acks: usize,
    pub recvs: usize,
    pub matched: usize,
    pub checkpoints: Vec<PathBuf>,
}

pub struct PacketScanner<'a, R: ChainRpc> {
    rpc: &'a R,
    options: ScanOptions,
    correlator: PacketCorrelator,
}

impl<'a, R: ChainRpc> PacketScanner<'a, R> {
    pub fn new(rpc: &'a R, options: ScanOptions) -> Self {
        Self {
            rpc,
            options,
            correlator: PacketCorrelator::new(),
        }
    }

    pub fn correlator(&self) -> &PacketCorrelator {
        &self.correlator
    }

    pub fn rows(&self) -> Vec<PacketDelayRow> {
        self.correlator.rows()
    }

    /// Scan one height; returns the number of packet events recorded.
    ///
    /// A block whose results cannot be fetched is reported as an error and
    /// leaves the store untouched.
    pub fn scan_height(&mut self, height: u64) -> Result<usize, crate::rpc::RpcError> {
        let results = self.rpc.block_results(height)?;
        let events = extract_packet_events(height, &results);
        if events.is_empty() {
            return Ok(0);
        }

        if self.correlator.block_time(height).is_none() {
            match self.rpc.block_time(height) {
                Ok(time) => self.correlator.record_block_time(height, time),
                Err(e) => log::warn!("No block time for height {}: {}", height, e),
            }
        }

        let count = events.len();
        log::debug!("Height {}: {} packet events", height, count);
        self.correlator.record_events(events);
        Ok(count)
    }

    /// Scan the whole range, writing checkpoints as configured
    pub fn run(&mut self) -> Result<ScanSummary, ExportError> {
        let ScanOptions {
            start_height,
            end_height,
            ..
        } = self.options;
        let mut summary = ScanSummary {
            start_height,
            end_height,
            ..Default::default()
        };
        if end_height < start_height {
            log::warn!("Empty range {}..={}", start_height, end_height);
            return Ok(summary);
        }

        log::info!("Scanning heights {} to {}", start_height, end_height);
        let progress = block_progress(end_height - start_height + 1, self.options.show_progress);

        for height in start_height..=end_height {
            match self.scan_height(height) {
                Ok(count) => {
                    summary.blocks_scanned += 1;
                    summary.events += count as u64;
                    if count > 0 && self.correlator.block_time(height).is_none() {
                        summary.missing_times += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Skipping height {}: {}", height, e);
                    summary.blocks_skipped += 1;
                }
            }

            let done = height - start_height + 1;
            if self.options.checkpoint_interval > 0
                && done % self.options.checkpoint_interval == 0
                && height < end_height
            {
                if let Some(path) = self.write_checkpoint(height)? {
                    summary.checkpoints.push(path);
                }
            }

            progress.inc(1);
            if height < end_height && !self.options.request_delay.is_zero() {
                thread::sleep(self.options.request_delay);
            }
        }
        progress.finish_and_clear();

        let stats = self.correlator.stats();
        summary.sends = stats.sends;
        summary.acks = stats.acks;
        summary.recvs = stats.recvs;
        summary.matched = stats.matched;
        log::info!(
            "Scan finished: {} blocks, {} skipped, {} sends, {} matched acks",
            summary.blocks_scanned,
            summary.blocks_skipped,
            summary.sends,
            summary.matched
        );
        Ok(summary)
    }

    fn write_checkpoint(&self, height: u64) -> Result<Option<PathBuf>, ExportError> {
        let Some(dir) = &self.options.checkpoint_dir else {
            return Ok(None);
        };
        let path = checkpoint_path(dir, self.options.start_height, height);
        let rows = self.correlator.rows();
        write_rows(&path, &rows)?;
        log::info!("Checkpoint at height {}: {} rows -> {}", height, rows.len(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{BlockResults, Event, EventAttribute, TxResult};
    use crate::rpc::MemoryChain;
    use tempfile::TempDir;

    fn packet_tx(kind: &str, channel: &str, seq: &str) -> TxResult {
        let attr = |k: &str, v: &str| EventAttribute {
            key: Some(k.to_string()),
            value: Some(v.to_string()),
        };
        TxResult {
            code: 0,
            events: vec![Event {
                kind: kind.to_string(),
                attributes: vec![attr("packet_sequence", seq), attr("packet_src_channel", channel)],
            }],
        }
    }

    fn results(txs: Vec<TxResult>) -> BlockResults {
        BlockResults {
            txs_results: Some(txs),
            ..Default::default()
        }
    }

    fn options(start: u64, end: u64) -> ScanOptions {
        ScanOptions {
            start_height: start,
            end_height: end,
            checkpoint_interval: 0,
            checkpoint_dir: None,
            request_delay: Duration::ZERO,
            show_progress: false,
        }
    }

    #[test]
    fn test_scan_matches_send_and_ack() {
        let chain = MemoryChain::new()
            .with_block(10, "2025-01-01T00:00:00Z")
            .with_block(11, "2025-01-01T00:00:06Z")
            .with_block(12, "2025-01-01T00:00:12.5Z")
            .with_results(10, results(vec![packet_tx("send_packet", "channel-0", "1")]))
            .with_results(12, results(vec![packet_tx("acknowledge_packet", "channel-0", "1")]));

        let mut scanner = PacketScanner::new(&chain, options(10, 12));
        let summary = scanner.run().unwrap();
        assert_eq!(summary.blocks_scanned, 3);
        assert_eq!(summary.blocks_skipped, 0);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.matched, 1);

        let rows = scanner.rows();
        assert_eq!(rows[0].block_delay, Some(2));
        assert_eq!(rows[0].time_delay_sec, Some(12.5));
    }

    #[test]
    fn test_unfetchable_block_is_skipped() {
        let chain = MemoryChain::new()
            .with_block(1, "2025-01-01T00:00:00Z")
            .with_block(3, "2025-01-01T00:00:12Z");
        let summary = PacketScanner::new(&chain, options(1, 3)).run().unwrap();
        assert_eq!(summary.blocks_scanned, 2);
        assert_eq!(summary.blocks_skipped, 1);
    }

    #[test]
    fn test_checkpoints_are_written() {
        let dir = TempDir::new().unwrap();
        let mut chain = MemoryChain::new();
        for h in 1..=5 {
            chain = chain.with_block(h, "2025-01-01T00:00:00Z");
        }
        chain = chain.with_results(1, results(vec![packet_tx("send_packet", "channel-7", "3")]));

        let mut opts = options(1, 5);
        opts.checkpoint_interval = 2;
        opts.checkpoint_dir = Some(dir.path().to_path_buf());
        let summary = PacketScanner::new(&chain, opts).run().unwrap();

        assert_eq!(
            summary.checkpoints,
            vec![
                dir.path().join("ibc_packet_delay_1-2.csv"),
                dir.path().join("ibc_packet_delay_1-4.csv"),
            ]
        );
        let rows = crate::export::read_rows(&summary.checkpoints[0]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ack_height, None);
    }

    #[test]
    fn test_zero_interval_writes_no_checkpoints() {
        let dir = TempDir::new().unwrap();
        let chain = MemoryChain::new()
            .with_block(1, "2025-01-01T00:00:00Z")
            .with_block(2, "2025-01-01T00:00:06Z");
        let mut opts = options(1, 2);
        opts.checkpoint_dir = Some(dir.path().to_path_buf());
        let summary = PacketScanner::new(&chain, opts).run().unwrap();

        assert!(summary.checkpoints.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_range() {
        let chain = MemoryChain::new();
        let summary = PacketScanner::new(&chain, options(5, 4)).run().unwrap();
        assert_eq!(summary.blocks_scanned, 0);
    }
}

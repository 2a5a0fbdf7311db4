//! Mempool size polling.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::export::{append_record, ExportError};
use crate::ibc::time::csv_datetime;
use crate::rpc::ChainRpc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolSample {
    #[serde(with = "csv_datetime")]
    pub timestamp: DateTime<Utc>,
    pub n_txs: u64,
    pub total: u64,
    pub total_bytes: u64,
}

pub struct MempoolPoller<'a, R: ChainRpc> {
    rpc: &'a R,
    output: PathBuf,
    interval: Duration,
    max_samples: Option<u64>,
}

impl<'a, R: ChainRpc> MempoolPoller<'a, R> {
    pub fn new(rpc: &'a R, output: &Path, interval: Duration, max_samples: Option<u64>) -> Self {
        Self {
            rpc,
            output: output.to_path_buf(),
            interval,
            max_samples,
        }
    }

    /// Take one sample and append it to the output CSV.
    ///
    /// `Ok(None)` means the node could not be queried this round.
    pub fn poll_once(&self) -> Result<Option<MempoolSample>, ExportError> {
        let snapshot = match self.rpc.unconfirmed_txs() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Mempool query failed: {}", e);
                return Ok(None);
            }
        };
        let sample = MempoolSample {
            timestamp: Utc::now().trunc_subsecs(6),
            n_txs: snapshot.n_txs.unwrap_or(0),
            total: snapshot.total.unwrap_or(0),
            total_bytes: snapshot.total_bytes.unwrap_or(0),
        };
        append_record(&self.output, &sample)?;
        log::info!(
            "mempool: {} txs ({} total, {} bytes)",
            sample.n_txs,
            sample.total,
            sample.total_bytes
        );
        Ok(Some(sample))
    }

    /// Poll until `max_samples` samples were recorded, or forever without a limit.
    ///
    /// Returns the number of samples written.
    pub fn run(&self) -> Result<u64, ExportError> {
        log::info!(
            "Polling mempool every {:?} into {}",
            self.interval,
            self.output.display()
        );
        let mut written = 0;
        loop {
            if self.poll_once()?.is_some() {
                written += 1;
            }
            if self.max_samples.is_some_and(|max| written >= max) {
                return Ok(written);
            }
            thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::read_records;
    use crate::rpc::types::UnconfirmedTxs;
    use crate::rpc::MemoryChain;
    use tempfile::TempDir;

    #[test]
    fn test_poller_appends_samples() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("unconfirmed_txs.csv");
        let chain = MemoryChain::new().with_mempool(vec![
            UnconfirmedTxs {
                n_txs: Some(3),
                total: Some(40),
                total_bytes: Some(12_000),
            },
            UnconfirmedTxs {
                n_txs: Some(5),
                total: Some(41),
                total_bytes: None,
            },
        ]);

        let poller = MempoolPoller::new(&chain, &output, Duration::ZERO, Some(2));
        assert_eq!(poller.run().unwrap(), 2);
        // a second run appends without a second header
        assert_eq!(poller.run().unwrap(), 2);

        let samples: Vec<MempoolSample> = read_records(&output).unwrap();
        let counts: Vec<u64> = samples.iter().map(|s| s.n_txs).collect();
        assert_eq!(counts, vec![3, 5, 5, 5]);
        assert_eq!(samples[1].total_bytes, 0);
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.matches("timestamp").count(), 1);
    }
}

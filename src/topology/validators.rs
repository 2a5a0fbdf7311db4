//! Validator co-signing from commit signatures.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::WeightedGraph;
use crate::ibc::time::{csv_datetime, parse_block_time, seconds_between};
use crate::rpc::types::BlockResponse;
use crate::rpc::ChainRpc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSignature {
    pub height: u64,
    pub validator_address: String,
    #[serde(with = "csv_datetime")]
    pub timestamp: DateTime<Utc>,
    /// Signature time minus block time
    pub delay_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoSigningSummary {
    pub blocks_requested: u64,
    pub blocks_with_signatures: u64,
    pub blocks_skipped: u64,
    pub signatures: usize,
    pub validators: usize,
}

/// Non-proposer signatures of a block, with their delay from the header time.
///
/// Absent votes (empty address or unparsable time) are skipped.
pub fn block_signatures(block: &BlockResponse) -> Vec<ValidatorSignature> {
    let header = &block.block.header;
    let Some(block_time) = parse_block_time(&header.time) else {
        log::debug!("Height {}: unparsable header time {:?}", header.height, header.time);
        return Vec::new();
    };
    let proposer = header.proposer_address.as_deref().unwrap_or("");
    let Some(commit) = &block.block.last_commit else {
        return Vec::new();
    };

    commit
        .signatures
        .iter()
        .filter_map(|sig| {
            let address = sig.validator_address.as_deref().filter(|a| !a.is_empty())?;
            if address == proposer {
                return None;
            }
            let timestamp = parse_block_time(sig.timestamp.as_deref()?)?;
            Some(ValidatorSignature {
                height: header.height,
                validator_address: address.to_string(),
                timestamp,
                delay_ms: seconds_between(&block_time, &timestamp) * 1000.0,
            })
        })
        .collect()
}

/// Walk `count` heights downward from `start` collecting signatures
pub fn collect_signatures<R: ChainRpc>(
    rpc: &R,
    start: u64,
    count: u64,
    request_delay: Duration,
) -> (Vec<ValidatorSignature>, CoSigningSummary) {
    let mut summary = CoSigningSummary {
        blocks_requested: count.min(start),
        ..Default::default()
    };
    let mut all = Vec::new();
    let lowest = start.saturating_sub(count);

    for height in (lowest + 1..=start).rev() {
        match rpc.block(height) {
            Ok(block) => {
                let signatures = block_signatures(&block);
                log::debug!("Height {}: {} signatures", height, signatures.len());
                if !signatures.is_empty() {
                    summary.blocks_with_signatures += 1;
                }
                all.extend(signatures);
            }
            Err(e) => {
                log::warn!("Skipping height {}: {}", height, e);
                summary.blocks_skipped += 1;
            }
        }
        if height > lowest + 1 && !request_delay.is_zero() {
            thread::sleep(request_delay);
        }
    }

    summary.signatures = all.len();
    summary.validators = {
        let mut addrs: Vec<&str> = all.iter().map(|s| s.validator_address.as_str()).collect();
        addrs.sort_unstable();
        addrs.dedup();
        addrs.len()
    };
    (all, summary)
}

/// Undirected graph; edge weight counts the blocks both validators signed
pub fn cosigning_graph(signatures: &[ValidatorSignature]) -> WeightedGraph {
    let mut by_height: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    for sig in signatures {
        by_height
            .entry(sig.height)
            .or_default()
            .push(sig.validator_address.as_str());
    }

    let mut graph = WeightedGraph::undirected();
    for validators in by_height.values_mut() {
        validators.sort_unstable();
        validators.dedup();
        for (i, a) in validators.iter().enumerate() {
            for b in &validators[i + 1..] {
                graph.increment_edge(a, b, 1.0);
            }
        }
    }
    graph
}

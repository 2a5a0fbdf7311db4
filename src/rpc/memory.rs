//! In-memory chain serving canned RPC responses.
//!
//! Used to replay captured payloads and to drive the scanners in tests
//! without a node.

use std::cell::Cell;
use std::collections::BTreeMap;

use super::client::{ChainRpc, RpcError};
use super::types::*;

#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: BTreeMap<u64, BlockResponse>,
    results: BTreeMap<u64, BlockResults>,
    net_info: Option<NetInfo>,
    mempool: Vec<UnconfirmedTxs>,
    mempool_polls: Cell<usize>,
}

fn missing(path: String) -> RpcError {
    RpcError::MissingField {
        url: format!("memory:{}", path),
        field: "result",
    }
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block header with the given RFC 3339 time
    pub fn with_block(mut self, height: u64, time: &str) -> Self {
        self.blocks.insert(
            height,
            BlockResponse {
                block: Block {
                    header: Header {
                        height,
                        time: time.to_string(),
                        proposer_address: None,
                    },
                    last_commit: None,
                },
            },
        );
        self
    }

    /// Add a block header with a proposer and commit signatures `(validator, time)`
    pub fn with_signed_block(
        mut self,
        height: u64,
        time: &str,
        proposer: &str,
        signatures: &[(&str, &str)],
    ) -> Self {
        let signatures = signatures
            .iter()
            .map(|(validator, ts)| CommitSig {
                validator_address: Some(validator.to_string()),
                timestamp: Some(ts.to_string()),
            })
            .collect();
        self.blocks.insert(
            height,
            BlockResponse {
                block: Block {
                    header: Header {
                        height,
                        time: time.to_string(),
                        proposer_address: Some(proposer.to_string()),
                    },
                    last_commit: Some(Commit { signatures }),
                },
            },
        );
        self
    }

    pub fn with_results(mut self, height: u64, results: BlockResults) -> Self {
        self.results.insert(height, results);
        self
    }

    pub fn with_net_info(mut self, net_info: NetInfo) -> Self {
        self.net_info = Some(net_info);
        self
    }

    /// Mempool snapshots served in order, repeating the last one
    pub fn with_mempool(mut self, samples: Vec<UnconfirmedTxs>) -> Self {
        self.mempool = samples;
        self
    }
}

impl ChainRpc for MemoryChain {
    fn block(&self, height: u64) -> Result<BlockResponse, RpcError> {
        self.blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| missing(format!("/block?height={}", height)))
    }

    /// Heights with a header but no explicit results read as empty blocks
    fn block_results(&self, height: u64) -> Result<BlockResults, RpcError> {
        match self.results.get(&height) {
            Some(results) => Ok(results.clone()),
            None if self.blocks.contains_key(&height) => Ok(BlockResults {
                height: Some(height),
                ..Default::default()
            }),
            None => Err(missing(format!("/block_results?height={}", height))),
        }
    }

    fn net_info(&self) -> Result<NetInfo, RpcError> {
        self.net_info.clone().ok_or_else(|| missing("/net_info".to_string()))
    }

    fn unconfirmed_txs(&self) -> Result<UnconfirmedTxs, RpcError> {
        let index = self.mempool_polls.get();
        self.mempool_polls.set(index + 1);
        self.mempool
            .get(index)
            .or(self.mempool.last())
            .cloned()
            .ok_or_else(|| missing("/unconfirmed_txs".to_string()))
    }

    fn status(&self) -> Result<Status, RpcError> {
        let (height, block) = self
            .blocks
            .iter()
            .next_back()
            .ok_or_else(|| missing("/status".to_string()))?;
        Ok(Status {
            sync_info: SyncInfo {
                latest_block_height: *height,
                latest_block_time: Some(block.block.header.time.clone()),
            },
        })
    }
}

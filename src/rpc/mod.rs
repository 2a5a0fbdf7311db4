//! Tendermint RPC access.
//!
//! Sequential blocking GETs against `/block`, `/block_results`, `/net_info`,
//! `/unconfirmed_txs` and `/status`, with a configurable retry policy.

pub mod client;
pub mod memory;
pub mod retry;
pub mod types;

pub use client::{ChainRpc, RpcClient, RpcError};
pub use memory::MemoryChain;
pub use retry::{Backoff, RetryPolicy};

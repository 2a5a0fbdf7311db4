//! Sequential collection stages that talk to an RPC node.
//!
//! Every stage issues one request at a time and sleeps `request_delay`
//! between heights.

pub mod block_times;
pub mod fill;
pub mod mempool;
pub mod packets;
mod progress;

pub use block_times::{sample_block_times, BlockIntervalRow};
pub use fill::{fill_missing_times, FillSummary};
pub use mempool::{MempoolPoller, MempoolSample};
pub use packets::{PacketScanner, ScanOptions, ScanSummary};

//! # ibcscope - IBC packet lifecycle scanner and relay delay analysis
//!
//! This library scans Cosmos SDK chains over Tendermint RPC for IBC packet
//! lifecycle events, joins each `send_packet` with its `acknowledge_packet`,
//! and analyses the resulting relay delays offline.
//!
//! ## Overview
//!
//! Collection and analysis are split into two binaries that share this crate:
//!
//! - `ibcscope` talks to an RPC node: packet scans, timestamp gap-filling,
//!   block interval sampling, mempool polling, peer and validator graphs.
//! - `delay-analyzer` works on CSV files only: merging, delay statistics,
//!   distribution fitting, fee scatter plots and probe reports.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration structures and validation
//! - `config_loader`: configuration file loading and CLI overrides
//! - `rpc`: blocking RPC client, retry policy and response types
//! - `ibc`: event extraction and the send/ack correlator
//! - `scan`: block-range loops with checkpoints and progress bars
//! - `export`: CSV reading, writing and merging
//! - `topology`: peer and validator co-signing graphs
//! - `analysis`: statistics, curve fitting, plots and reports
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ibcscope::config::ChainPreset;
//! use ibcscope::rpc::{RetryPolicy, RpcClient};
//! use ibcscope::scan::{PacketScanner, ScanOptions};
//! use std::time::Duration;
//!
//! let rpc = RpcClient::new(
//!     ChainPreset::Osmosis.default_rpc_url(),
//!     Duration::from_secs(5),
//!     RetryPolicy::bounded(5, Duration::from_secs(1)),
//! )?;
//! let mut scanner = PacketScanner::new(
//!     &rpc,
//!     ScanOptions {
//!         start_height: 30_159_500,
//!         end_height: 30_159_600,
//!         checkpoint_interval: 0,
//!         checkpoint_dir: None,
//!         request_delay: Duration::from_millis(100),
//!         show_progress: false,
//!     },
//! );
//! let summary = scanner.run()?;
//! ibcscope::export::write_rows("packets.csv".as_ref(), &scanner.rows())?;
//! println!("{} of {} sends acknowledged", summary.matched, summary.sends);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   log_level: info
//!
//! chain:
//!   preset: osmosis
//!   # rpc_url: "http://127.0.0.1:26657"
//!
//! retry:
//!   max_attempts: 10
//!   delay: "1s"
//!   backoff_step: "500ms"
//!
//! scan:
//!   start_height: 30159500
//!   checkpoint_interval: 5000
//!   checkpoint_dir: "current"
//! ```
//!
//! ## Error Handling
//!
//! Library modules return typed errors built with `thiserror`; the binaries
//! and the configuration loader use `color_eyre` for reports with context.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod export;
pub mod ibc;
pub mod rpc;
pub mod scan;
pub mod topology;

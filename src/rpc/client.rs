//! Blocking HTTP client for the Tendermint RPC.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::retry::RetryPolicy;
use super::types::*;
use crate::ibc::time::parse_block_time;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {url} has no `{field}`")]
    MissingField { url: String, field: &'static str },
    #[error("invalid block time {value:?} at height {height}")]
    InvalidTimestamp { height: u64, value: String },
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<RpcError>,
    },
}

/// The RPC calls the scanners need; implemented over HTTP by [`RpcClient`].
pub trait ChainRpc {
    fn block(&self, height: u64) -> Result<BlockResponse, RpcError>;
    fn block_results(&self, height: u64) -> Result<BlockResults, RpcError>;
    fn net_info(&self) -> Result<NetInfo, RpcError>;
    fn unconfirmed_txs(&self) -> Result<UnconfirmedTxs, RpcError>;
    fn status(&self) -> Result<Status, RpcError>;

    /// Header time of a block, truncated to microseconds
    fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RpcError> {
        let block = self.block(height)?;
        parse_block_time(&block.block.header.time).ok_or(RpcError::InvalidTimestamp {
            height,
            value: block.block.header.time,
        })
    }

    fn latest_height(&self) -> Result<u64, RpcError> {
        Ok(self.status()?.sync_info.latest_block_height)
    }
}

pub struct RpcClient {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl RpcClient {
    pub fn new(base_url: &str, timeout: Duration, policy: RetryPolicy) -> Result<Self, RpcError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ibcscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RpcError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `path` and decode the `result` member, retrying per the policy
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        self.policy
            .run(|attempt| {
                log::debug!("GET {} (attempt {})", url, attempt);
                self.get_once(&url)
            })
            .map_err(|(last, attempts)| RpcError::Exhausted {
                url: url.clone(),
                attempts,
                last: Box::new(last),
            })
    }

    fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, RpcError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|source| RpcError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RpcError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().map_err(|source| RpcError::Transport {
            url: url.to_string(),
            source,
        })?;

        let envelope: RpcEnvelope<T> =
            serde_json::from_str(&body).map_err(|source| RpcError::Decode {
                url: url.to_string(),
                source,
            })?;

        envelope.result.ok_or(RpcError::MissingField {
            url: url.to_string(),
            field: "result",
        })
    }
}

impl ChainRpc for RpcClient {
    fn block(&self, height: u64) -> Result<BlockResponse, RpcError> {
        self.get_json(&format!("/block?height={}", height))
    }

    fn block_results(&self, height: u64) -> Result<BlockResults, RpcError> {
        self.get_json(&format!("/block_results?height={}", height))
    }

    fn net_info(&self) -> Result<NetInfo, RpcError> {
        self.get_json("/net_info")
    }

    fn unconfirmed_txs(&self) -> Result<UnconfirmedTxs, RpcError> {
        self.get_json("/unconfirmed_txs")
    }

    fn status(&self) -> Result<Status, RpcError> {
        self.get_json("/status")
    }
}

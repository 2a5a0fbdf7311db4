use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::rpc::retry::{Backoff, RetryPolicy};

/// Chains with a known public RPC endpoint
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChainPreset {
    Celestia,
    Cosmoshub,
    Injective,
    Osmosis,
    Noble,
}

impl ChainPreset {
    /// Default Tendermint RPC base URL for the chain
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            ChainPreset::Celestia => "https://celestia-mainnet-rpc.itrocket.net",
            ChainPreset::Cosmoshub => "https://cosmoshub.tendermintrpc.lava.build",
            ChainPreset::Injective => "https://rpc.lavenderfive.com:443/injective",
            ChainPreset::Osmosis => "https://rpc.lavenderfive.com/osmosis",
            ChainPreset::Noble => "https://noble-rpc.polkachu.com",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainPreset::Celestia => "celestia",
            ChainPreset::Cosmoshub => "cosmoshub",
            ChainPreset::Injective => "injective",
            ChainPreset::Osmosis => "osmosis",
            ChainPreset::Noble => "noble",
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanConfig>,
    #[serde(default)]
    pub fill: FillConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.chain.rpc_url {
            if url.trim().is_empty() {
                return Err(ValidationError::InvalidChain(
                    "rpc_url cannot be empty".to_string(),
                ));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidChain(format!(
                    "rpc_url must be an http(s) URL, got {}",
                    url
                )));
            }
        }

        self.retry.validate()?;
        if let Some(retry) = &self.fill.retry {
            retry.validate()?;
        }

        if let Some(scan) = &self.scan {
            if let Some(end) = scan.end_height {
                if end < scan.start_height {
                    return Err(ValidationError::InvalidScan(format!(
                        "end_height {} is below start_height {}",
                        end, scan.start_height
                    )));
                }
            }
        }

        if self.topology.min_traffic_mb < 0.0 {
            return Err(ValidationError::InvalidTopology(
                "min_traffic_mb cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the RPC base URL: explicit URL first, then the preset's default
    pub fn rpc_url(&self) -> Option<String> {
        self.chain.resolve_url()
    }
}

/// General settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
        }
    }
}

/// Which chain to talk to
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChainConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<ChainPreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl ChainConfig {
    pub fn resolve_url(&self) -> Option<String> {
        self.rpc_url
            .as_ref()
            .map(|u| u.trim_end_matches('/').to_string())
            .or_else(|| self.preset.map(|p| p.default_rpc_url().to_string()))
    }

    /// Short label used in output file names and logs
    pub fn label(&self) -> String {
        match (&self.preset, &self.rpc_url) {
            (Some(preset), _) => preset.name().to_string(),
            (None, Some(url)) => url
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .split('/')
                .next()
                .unwrap_or("chain")
                .to_string(),
            (None, None) => "chain".to_string(),
        }
    }
}

/// Retry behaviour of the RPC client
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Give up after this many attempts; absent means retry forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub delay: Duration,
    /// Extra delay added per failed attempt; absent means fixed delay
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub backoff_step: Option<Duration>,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay: default_retry_delay(),
            backoff_step: None,
            timeout: default_timeout(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == Some(0) {
            return Err(ValidationError::InvalidRetry(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::InvalidRetry(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.delay,
            backoff: match self.backoff_step {
                Some(step) => Backoff::Incremental { step },
                None => Backoff::Fixed,
            },
        }
    }
}

/// Packet scan range and output locations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    pub start_height: u64,
    /// Absent means "latest height reported by /status"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_height: Option<u64>,
    /// Blocks between checkpoint CSVs; 0 disables checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    #[serde(with = "humantime_serde", default = "default_request_delay")]
    pub request_delay: Duration,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

fn default_checkpoint_interval() -> u64 {
    5000
}

fn default_request_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("current")
}

/// Timestamp gap-filling settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FillConfig {
    /// Overrides the top-level retry section for gap-filling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(with = "humantime_serde", default = "default_fill_delay")]
    pub request_delay: Duration,
}

fn default_fill_delay() -> Duration {
    Duration::from_millis(500)
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            retry: None,
            request_delay: default_fill_delay(),
        }
    }
}

impl FillConfig {
    /// Gap-filling gives up on a height after 30 attempts 2 seconds apart
    pub fn retry_or_default(&self, general: &RetryConfig) -> RetryConfig {
        self.retry.clone().unwrap_or_else(|| RetryConfig {
            max_attempts: Some(30),
            delay: Duration::from_secs(2),
            backoff_step: None,
            timeout: general.timeout.max(Duration::from_secs(10)),
        })
    }
}

/// Mempool polling settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MempoolConfig {
    #[serde(with = "humantime_serde", default = "default_mempool_interval")]
    pub interval: Duration,
    #[serde(default = "default_mempool_output")]
    pub output: PathBuf,
}

fn default_mempool_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_mempool_output() -> PathBuf {
    PathBuf::from("unconfirmed_txs.csv")
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            interval: default_mempool_interval(),
            output: default_mempool_output(),
        }
    }
}

/// Peer topology settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopologyConfig {
    #[serde(default = "default_min_traffic")]
    pub min_traffic_mb: f64,
}

fn default_min_traffic() -> f64 {
    1.0
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            min_traffic_mb: default_min_traffic(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid chain configuration: {0}")]
    InvalidChain(String),
    #[error("Invalid retry configuration: {0}")]
    InvalidRetry(String),
    #[error("Invalid scan configuration: {0}")]
    InvalidScan(String),
    #[error("Invalid topology configuration: {0}")]
    InvalidTopology(String),
}

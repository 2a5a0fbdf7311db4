//! Report types shared by the analysis commands.

use serde::Serialize;

use super::delay::DelayAnalysis;
use super::fit::FitReport;
use super::stats::Describe;

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    pub analysis_timestamp: String,
    pub input: String,
    pub tool_version: String,
}

impl AnalysisMetadata {
    pub fn now(input: &str) -> Self {
        Self {
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            input: input.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Mempool size statistics over a polling run
#[derive(Debug, Clone, Serialize)]
pub struct MempoolReport {
    pub samples: usize,
    pub first_sample: Option<String>,
    pub last_sample: Option<String>,
    pub n_txs: Describe,
    pub total: Describe,
    pub total_bytes: Describe,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockIntervalReport {
    pub blocks: usize,
    pub first_height: Option<u64>,
    pub last_height: Option<u64>,
    pub interval_sec: Describe,
}

/// Complete analysis report; sections absent from a run are omitted
#[derive(Debug, Clone, Serialize)]
pub struct FullAnalysisReport {
    pub metadata: AnalysisMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_analysis: Option<DelayAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_analysis: Option<FitReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mempool_analysis: Option<MempoolReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_interval_analysis: Option<BlockIntervalReport>,
}

impl FullAnalysisReport {
    pub fn new(metadata: AnalysisMetadata) -> Self {
        Self {
            metadata,
            delay_analysis: None,
            fit_analysis: None,
            mempool_analysis: None,
            block_interval_analysis: None,
        }
    }
}

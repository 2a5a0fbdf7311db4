//! Response payloads of the Tendermint/CometBFT RPC endpoints used here.
//!
//! Only the fields the scanners read are modelled. Tendermint encodes most
//! integers as JSON strings, so numeric fields go through [`de::u64_lenient`].

use serde::{Deserialize, Serialize};

/// JSON-RPC envelope: `{"jsonrpc": "2.0", "id": .., "result": ..}`
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// `/block?height=N`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockResponse {
    pub block: Block,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Block {
    pub header: Header,
    #[serde(default)]
    pub last_commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Header {
    #[serde(deserialize_with = "de::u64_lenient")]
    pub height: u64,
    pub time: String,
    #[serde(default)]
    pub proposer_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Commit {
    #[serde(default)]
    pub signatures: Vec<CommitSig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitSig {
    #[serde(default)]
    pub validator_address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `/block_results?height=N`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlockResults {
    #[serde(default, deserialize_with = "de::opt_u64_lenient")]
    pub height: Option<u64>,
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
    #[serde(default)]
    pub begin_block_events: Option<Vec<Event>>,
    #[serde(default)]
    pub end_block_events: Option<Vec<Event>>,
    /// CometBFT 0.38 replaces begin/end block events with this list
    #[serde(default)]
    pub finalize_block_events: Option<Vec<Event>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EventAttribute {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// `/net_info`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetInfo {
    #[serde(default, deserialize_with = "de::opt_u64_lenient")]
    pub n_peers: Option<u64>,
    #[serde(default)]
    pub peers: Vec<Peer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Peer {
    #[serde(default)]
    pub node_info: PeerNodeInfo,
    #[serde(default)]
    pub is_outbound: bool,
    #[serde(default)]
    pub remote_ip: Option<String>,
    #[serde(default)]
    pub connection_status: ConnectionStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PeerNodeInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub moniker: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectionStatus {
    #[serde(rename = "SendMonitor", default)]
    pub send_monitor: FlowMonitor,
    #[serde(rename = "RecvMonitor", default)]
    pub recv_monitor: FlowMonitor,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlowMonitor {
    #[serde(rename = "Bytes", default, deserialize_with = "de::opt_u64_lenient")]
    pub bytes: Option<u64>,
}

/// `/unconfirmed_txs`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UnconfirmedTxs {
    #[serde(default, deserialize_with = "de::opt_u64_lenient")]
    pub n_txs: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64_lenient")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64_lenient")]
    pub total_bytes: Option<u64>,
}

/// `/status`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Status {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncInfo {
    #[serde(deserialize_with = "de::u64_lenient")]
    pub latest_block_height: u64,
    #[serde(default)]
    pub latest_block_time: Option<String>,
}

pub mod de {
    //! Integers that arrive either as JSON numbers or as decimal strings.

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Str(String),
        Num(u64),
    }

    fn to_u64<E: Error>(value: StringOrNumber) -> Result<u64, E> {
        match value {
            StringOrNumber::Num(n) => Ok(n),
            StringOrNumber::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| E::custom(format!("invalid integer {:?}: {}", s, e))),
        }
    }

    pub fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        to_u64(StringOrNumber::deserialize(deserializer)?)
    }

    pub fn opt_u64_lenient<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            Some(value) => to_u64(value).map(Some),
            None => Ok(None),
        }
    }
}

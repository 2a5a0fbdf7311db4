//! Packet identifiers and lifecycle records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::csv_time;

/// Identifies one packet transit attempt within a scan range
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketKey {
    pub channel_id: String,
    pub sequence: String,
}

impl PacketKey {
    pub fn new(channel_id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            sequence: sequence.into(),
        }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.sequence)
    }
}

/// Lifecycle event types this crate tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketEventKind {
    Send,
    Recv,
    Ack,
}

impl PacketEventKind {
    pub fn from_event_type(kind: &str) -> Option<Self> {
        match kind {
            "send_packet" => Some(PacketEventKind::Send),
            "recv_packet" => Some(PacketEventKind::Recv),
            "acknowledge_packet" => Some(PacketEventKind::Ack),
            _ => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PacketEventKind::Send => "send_packet",
            PacketEventKind::Recv => "recv_packet",
            PacketEventKind::Ack => "acknowledge_packet",
        }
    }
}

/// Transaction fee as reported by the `tx`/`tx_fee`/`fee_pay` events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    pub amount: Option<String>,
    pub denom: Option<String>,
}

/// ICS-20 transfer details decoded from `packet_data`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub denom: Option<String>,
    pub amount: Option<String>,
}

/// One packet event pulled out of a block
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEvent {
    pub kind: PacketEventKind,
    pub key: PacketKey,
    pub height: u64,
    /// Index of the transaction in the block; `None` for block-level events
    pub tx_index: Option<usize>,
    /// `packet_dst_channel`, the counterparty end of the packet's channel
    pub dst_channel: Option<String>,
    pub fee: FeeInfo,
    pub transfer: TransferInfo,
    pub ack_success: Option<bool>,
    pub acknowledgement: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendRecord {
    pub height: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub dst_channel: Option<String>,
    pub fee: FeeInfo,
    pub transfer: TransferInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckRecord {
    pub height: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub acknowledgement: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecvRecord {
    pub height: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub acknowledgement: Option<String>,
}

/// One CSV row: a send key joined with its acknowledgement, if any.
///
/// Field order is the column order of every CSV this crate writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketDelayRow {
    pub channel_id: String,
    pub sequence: String,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub send_height: Option<u64>,
    #[serde(default, with = "csv_time")]
    pub send_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub ack_height: Option<u64>,
    #[serde(default, with = "csv_time")]
    pub ack_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub block_delay: Option<i64>,
    #[serde(default)]
    pub time_delay_sec: Option<f64>,
    #[serde(default)]
    pub fee_amount: Option<String>,
    #[serde(default)]
    pub fee_denom: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub denom: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub ack_success: Option<bool>,
    #[serde(default)]
    pub acknowledgement: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub recv_height: Option<u64>,
    #[serde(default, with = "csv_time")]
    pub recv_time: Option<DateTime<Utc>>,
}

impl PacketDelayRow {
    /// Column names in output order
    pub const COLUMNS: [&'static str; 18] = [
        "channel_id",
        "sequence",
        "send_height",
        "send_time",
        "ack_height",
        "ack_time",
        "block_delay",
        "time_delay_sec",
        "fee_amount",
        "fee_denom",
        "sender",
        "receiver",
        "denom",
        "amount",
        "ack_success",
        "acknowledgement",
        "recv_height",
        "recv_time",
    ];

    pub fn key(&self) -> PacketKey {
        PacketKey::new(self.channel_id.clone(), self.sequence.clone())
    }

    /// Recompute `block_delay` and `time_delay_sec` from heights and times
    pub fn refresh_delays(&mut self) {
        self.block_delay = match (self.send_height, self.ack_height) {
            (Some(send), Some(ack)) => Some(ack as i64 - send as i64),
            _ => None,
        };
        self.time_delay_sec = match (&self.send_time, &self.ack_time) {
            (Some(send), Some(ack)) => Some(super::time::seconds_between(send, ack)),
            _ => None,
        };
    }
}

/// Column readers that tolerate spreadsheet-style numbers.
///
/// Integer columns with gaps come back from dataframe tools as `123.0`;
/// booleans as `True`/`False`. Unreadable cells become empty.
pub mod lenient {
    use serde::{Deserialize, Deserializer};

    fn cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    fn parse_integral(s: &str) -> Option<f64> {
        let value = s.parse::<f64>().ok()?;
        (value.is_finite() && value.fract() == 0.0).then_some(value)
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(cell(deserializer)?.and_then(|s| {
            s.parse::<u64>()
                .ok()
                .or_else(|| parse_integral(&s).filter(|v| *v >= 0.0).map(|v| v as u64))
        }))
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(cell(deserializer)?
            .and_then(|s| s.parse::<i64>().ok().or_else(|| parse_integral(&s).map(|v| v as i64))))
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        Ok(cell(deserializer)?.and_then(|s| match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_roundtrip_names() {
        for kind in [PacketEventKind::Send, PacketEventKind::Recv, PacketEventKind::Ack] {
            assert_eq!(PacketEventKind::from_event_type(kind.event_type()), Some(kind));
        }
        assert_eq!(PacketEventKind::from_event_type("write_acknowledgement"), None);
    }

    #[test]
    fn test_refresh_delays() {
        let mut row = PacketDelayRow {
            channel_id: "channel-0".to_string(),
            sequence: "7".to_string(),
            send_height: Some(100),
            send_time: super::super::time::parse_block_time("2025-01-01T00:00:00Z"),
            ack_height: Some(103),
            ack_time: super::super::time::parse_block_time("2025-01-01T00:00:18.5Z"),
            ..Default::default()
        };
        row.refresh_delays();
        assert_eq!(row.block_delay, Some(3));
        assert_eq!(row.time_delay_sec, Some(18.5));

        row.ack_time = None;
        row.refresh_delays();
        assert_eq!(row.block_delay, Some(3));
        assert_eq!(row.time_delay_sec, None);
    }

    #[test]
    fn test_reads_dataframe_style_cells() {
        let data = "channel_id,sequence,send_height,send_time,ack_height,ack_time,block_delay,fee_amount,fee_denom\n\
                    channel-141,9,30159500,2025-01-01 00:00:00.000000,30159503.0,,3.0,1500uosmo,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let row: PacketDelayRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.send_height, Some(30159500));
        assert_eq!(row.ack_height, Some(30159503));
        assert_eq!(row.block_delay, Some(3));
        assert_eq!(row.ack_time, None);
        assert_eq!(row.fee_amount.as_deref(), Some("1500uosmo"));
        assert_eq!(row.fee_denom, None);
        assert_eq!(row.recv_height, None);
    }

    #[test]
    fn test_columns_match_serialized_header() {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(PacketDelayRow::default()).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(header, PacketDelayRow::COLUMNS.join(","));
    }
}

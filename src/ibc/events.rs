//! Packet event extraction from `/block_results` payloads.
//!
//! Block-level events (`begin_block_events`, `end_block_events`,
//! `finalize_block_events`) and each transaction's `events` are scanned for
//! `send_packet`, `recv_packet` and `acknowledge_packet`. Events without a
//! usable `packet_sequence`/`packet_src_channel` pair are skipped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::types::*;
use crate::rpc::types::{BlockResults, Event};

/// Single coin such as `2500uatom` or `12ibc/27394FB0`
static COIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)([A-Za-z][A-Za-z0-9/:._-]*)$").expect("Invalid coin regex")
});

const FEE_EVENT_TYPES: [&str; 3] = ["tx_fee", "fee_pay", "tx"];

/// Key/value view of an event's attributes; a repeated key keeps its last value
pub fn attribute_map(event: &Event) -> HashMap<&str, &str> {
    event
        .attributes
        .iter()
        .filter_map(|attr| Some((attr.key.as_deref()?, attr.value.as_deref().unwrap_or(""))))
        .collect()
}

fn non_empty<'a>(attrs: &HashMap<&str, &'a str>, key: &str) -> Option<&'a str> {
    attrs.get(key).copied().filter(|v| !v.is_empty())
}

/// Packet key of an event, if both identifiers are present and non-empty
pub fn packet_key(attrs: &HashMap<&str, &str>) -> Option<PacketKey> {
    let sequence = non_empty(attrs, "packet_sequence")?;
    let channel_id = non_empty(attrs, "packet_src_channel")?;
    Some(PacketKey::new(channel_id, sequence))
}

/// Fee paid by the transaction whose events are given
pub fn extract_fee(events: &[Event]) -> FeeInfo {
    let mut fee = FeeInfo::default();
    for event in events {
        if !FEE_EVENT_TYPES.contains(&event.kind.as_str()) {
            continue;
        }
        let attrs = attribute_map(event);
        let amount = non_empty(&attrs, "amount").or_else(|| non_empty(&attrs, "fee"));
        // the generic `tx` event carries signatures and sequences too
        if event.kind == "tx" && amount.is_none() {
            continue;
        }
        fee.amount = amount.map(str::to_string);
        fee.denom = non_empty(&attrs, "denom").map(str::to_string);
    }

    if fee.denom.is_none() {
        if let Some(caps) = fee.amount.as_deref().and_then(|a| COIN.captures(a)) {
            let amount = caps[1].to_string();
            fee.denom = Some(caps[2].to_string());
            fee.amount = Some(amount);
        }
    }

    fee
}

#[derive(Debug, Default, Deserialize)]
struct Ics20PacketData {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    receiver: Option<String>,
    #[serde(default)]
    denom: Option<String>,
    #[serde(default, deserialize_with = "amount_string")]
    amount: Option<String>,
}

fn amount_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Transfer details from an ICS-20 `packet_data` attribute; other payloads yield nothing
pub fn extract_transfer(attrs: &HashMap<&str, &str>) -> TransferInfo {
    let Some(raw) = non_empty(attrs, "packet_data") else {
        return TransferInfo::default();
    };
    match serde_json::from_str::<Ics20PacketData>(raw) {
        Ok(data) => TransferInfo {
            sender: data.sender,
            receiver: data.receiver,
            denom: data.denom,
            amount: data.amount,
        },
        Err(_) => TransferInfo::default(),
    }
}

/// Result of one `acknowledge_packet`, as reported by the transfer module
#[derive(Debug, Clone, Default, PartialEq)]
struct AckOutcome {
    success: Option<bool>,
    acknowledgement: Option<String>,
}

/// Outcomes keyed by the index of their `acknowledge_packet` event.
///
/// The transfer module emits its `fungible_token_packet` events right after
/// the ack they belong to (one with `acknowledgement`, one with `success` or
/// `error`), so every such event up to the next packet event is merged into
/// the preceding ack's outcome.
fn ack_outcomes(events: &[Event]) -> HashMap<usize, AckOutcome> {
    let mut outcomes: HashMap<usize, AckOutcome> = HashMap::new();
    let mut current = None;

    for (index, event) in events.iter().enumerate() {
        match event.kind.as_str() {
            "acknowledge_packet" => current = Some(index),
            "send_packet" | "recv_packet" | "write_acknowledgement" => current = None,
            "fungible_token_packet" => {
                let Some(ack_index) = current else {
                    continue;
                };
                let attrs = attribute_map(event);
                let outcome = outcomes.entry(ack_index).or_default();
                if let Some(value) = attrs.get("success") {
                    outcome.success = Some(*value != "false");
                } else if attrs.contains_key("error") {
                    outcome.success = Some(false);
                }
                if let Some(ack) = non_empty(&attrs, "acknowledgement") {
                    outcome.acknowledgement = Some(ack.to_string());
                }
            }
            _ => {}
        }
    }

    outcomes
}

/// Acknowledgements written for received packets, keyed by packet
fn written_acks(events: &[Event]) -> HashMap<PacketKey, String> {
    events
        .iter()
        .filter(|e| e.kind == "write_acknowledgement")
        .filter_map(|e| {
            let attrs = attribute_map(e);
            let key = packet_key(&attrs)?;
            let ack = non_empty(&attrs, "packet_ack")?;
            Some((key, ack.to_string()))
        })
        .collect()
}

/// Extract packet events from one group of events sharing a context
/// (one transaction, or the block-level lists).
fn extract_group(
    height: u64,
    tx_index: Option<usize>,
    events: &[Event],
    out: &mut Vec<PacketEvent>,
) {
    let fee = match tx_index {
        Some(_) => extract_fee(events),
        None => FeeInfo::default(),
    };
    let mut outcomes = ack_outcomes(events);
    let written = written_acks(events);

    for (index, event) in events.iter().enumerate() {
        let Some(kind) = PacketEventKind::from_event_type(&event.kind) else {
            continue;
        };
        let attrs = attribute_map(event);
        let Some(key) = packet_key(&attrs) else {
            log::debug!(
                "Skipping {} at height {} without sequence/channel",
                event.kind,
                height
            );
            continue;
        };

        let mut packet = PacketEvent {
            kind,
            key,
            height,
            tx_index,
            dst_channel: non_empty(&attrs, "packet_dst_channel").map(str::to_string),
            fee: FeeInfo::default(),
            transfer: TransferInfo::default(),
            ack_success: None,
            acknowledgement: None,
        };

        match kind {
            PacketEventKind::Send => {
                packet.fee = fee.clone();
                packet.transfer = extract_transfer(&attrs);
            }
            PacketEventKind::Ack => {
                if let Some(outcome) = outcomes.remove(&index) {
                    packet.ack_success = outcome.success;
                    packet.acknowledgement = outcome.acknowledgement;
                }
            }
            PacketEventKind::Recv => {
                packet.acknowledgement = written.get(&packet.key).cloned();
            }
        }

        out.push(packet);
    }
}

/// All packet events of one block, block-level events first, then per transaction
pub fn extract_packet_events(height: u64, results: &BlockResults) -> Vec<PacketEvent> {
    let mut out = Vec::new();

    let block_level: Vec<Event> = [
        &results.begin_block_events,
        &results.end_block_events,
        &results.finalize_block_events,
    ]
    .into_iter()
    .flatten()
    .flatten()
    .cloned()
    .collect();
    extract_group(height, None, &block_level, &mut out);

    if let Some(txs) = &results.txs_results {
        for (index, tx) in txs.iter().enumerate() {
            extract_group(height, Some(index), &tx.events, &mut out);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{EventAttribute, TxResult};

    fn event(kind: &str, attrs: &[(&str, &str)]) -> Event {
        Event {
            kind: kind.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| EventAttribute {
                    key: Some(k.to_string()),
                    value: Some(v.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_send_with_fee_and_transfer() {
        let tx = TxResult {
            code: 0,
            events: vec![
                event("tx", &[("fee", "2500uatom"), ("fee_payer", "cosmos1x")]),
                event(
                    "send_packet",
                    &[
                        ("packet_data", r#"{"amount":"1000","denom":"uatom","receiver":"osmo1r","sender":"cosmos1s"}"#),
                        ("packet_sequence", "42"),
                        ("packet_src_channel", "channel-141"),
                    ],
                ),
            ],
        };
        let results = BlockResults {
            txs_results: Some(vec![tx]),
            ..Default::default()
        };

        let events = extract_packet_events(100, &results);
        assert_eq!(events.len(), 1);
        let send = &events[0];
        assert_eq!(send.kind, PacketEventKind::Send);
        assert_eq!(send.key, PacketKey::new("channel-141", "42"));
        assert_eq!(send.tx_index, Some(0));
        assert_eq!(send.fee.amount.as_deref(), Some("2500"));
        assert_eq!(send.fee.denom.as_deref(), Some("uatom"));
        assert_eq!(send.transfer.sender.as_deref(), Some("cosmos1s"));
        assert_eq!(send.transfer.amount.as_deref(), Some("1000"));
    }

    #[test]
    fn test_tx_fee_event_with_denom() {
        let events = vec![event("tx_fee", &[("amount", "300"), ("denom", "inj")])];
        let fee = extract_fee(&events);
        assert_eq!(fee.amount.as_deref(), Some("300"));
        assert_eq!(fee.denom.as_deref(), Some("inj"));
    }

    #[test]
    fn test_fees_do_not_leak_between_transactions() {
        let paid = TxResult {
            code: 0,
            events: vec![event("tx_fee", &[("amount", "5"), ("denom", "utia")])],
        };
        let unpaid = TxResult {
            code: 0,
            events: vec![event(
                "send_packet",
                &[("packet_sequence", "1"), ("packet_src_channel", "channel-2")],
            )],
        };
        let results = BlockResults {
            txs_results: Some(vec![paid, unpaid]),
            ..Default::default()
        };
        let events = extract_packet_events(7, &results);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fee, FeeInfo::default());
    }

    #[test]
    fn test_ack_success_and_block_level_events() {
        let tx = TxResult {
            code: 0,
            events: vec![
                event(
                    "acknowledge_packet",
                    &[("packet_sequence", "9"), ("packet_src_channel", "channel-0")],
                ),
                event("fungible_token_packet", &[("module", "transfer"), ("acknowledgement", "result:\"AQ==\"")]),
                event("fungible_token_packet", &[("success", "\u{1}")]),
            ],
        };
        let results = BlockResults {
            txs_results: Some(vec![tx]),
            end_block_events: Some(vec![event(
                "send_packet",
                &[("packet_sequence", "3"), ("packet_src_channel", "channel-5")],
            )]),
            ..Default::default()
        };

        let events = extract_packet_events(55, &results);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, PacketEventKind::Send);
        assert_eq!(events[0].tx_index, None);
        assert_eq!(events[1].kind, PacketEventKind::Ack);
        assert_eq!(events[1].acknowledgement.as_deref(), Some("result:\"AQ==\""));
        assert_eq!(events[1].ack_success, Some(true));
    }

    fn ack(seq: &str) -> Event {
        event(
            "acknowledge_packet",
            &[
                ("packet_sequence", seq),
                ("packet_src_channel", "channel-0"),
                ("packet_dst_channel", "channel-141"),
            ],
        )
    }

    #[test]
    fn test_batched_acks_keep_their_own_outcomes() {
        let events = vec![
            ack("1"),
            event("fungible_token_packet", &[("module", "transfer"), ("acknowledgement", "result:ack1")]),
            event("fungible_token_packet", &[("success", "\u{1}")]),
            ack("2"),
            event("fungible_token_packet", &[("module", "transfer"), ("acknowledgement", "error:ack2")]),
            event("fungible_token_packet", &[("error", "insufficient funds")]),
            ack("3"),
        ];
        let mut out = Vec::new();
        extract_group(8, Some(0), &events, &mut out);

        let outcomes: Vec<(&str, Option<bool>, Option<&str>)> = out
            .iter()
            .map(|e| (e.key.sequence.as_str(), e.ack_success, e.acknowledgement.as_deref()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("1", Some(true), Some("result:ack1")),
                ("2", Some(false), Some("error:ack2")),
                ("3", None, None),
            ]
        );
        assert_eq!(out[0].dst_channel.as_deref(), Some("channel-141"));
    }

    #[test]
    fn test_recv_transfer_events_do_not_reach_earlier_ack() {
        let events = vec![
            ack("4"),
            event(
                "recv_packet",
                &[("packet_sequence", "70"), ("packet_src_channel", "channel-3")],
            ),
            event("fungible_token_packet", &[("success", "false")]),
        ];
        let mut out = Vec::new();
        extract_group(9, Some(0), &events, &mut out);
        assert_eq!(out[0].kind, PacketEventKind::Ack);
        assert_eq!(out[0].ack_success, None);
    }

    #[test]
    fn test_failed_ack() {
        let events = vec![
            event(
                "acknowledge_packet",
                &[("packet_sequence", "9"), ("packet_src_channel", "channel-0")],
            ),
            event("fungible_token_packet", &[("error", "ABCI code: 5")]),
        ];
        let mut out = Vec::new();
        extract_group(1, Some(0), &events, &mut out);
        assert_eq!(out[0].ack_success, Some(false));
    }

    #[test]
    fn test_recv_picks_up_written_ack() {
        let events = vec![
            event(
                "recv_packet",
                &[("packet_sequence", "11"), ("packet_src_channel", "channel-1")],
            ),
            event(
                "write_acknowledgement",
                &[
                    ("packet_sequence", "11"),
                    ("packet_src_channel", "channel-1"),
                    ("packet_ack", "{\"result\":\"AQ==\"}"),
                ],
            ),
        ];
        let mut out = Vec::new();
        extract_group(3, Some(0), &events, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, PacketEventKind::Recv);
        assert_eq!(out[0].acknowledgement.as_deref(), Some("{\"result\":\"AQ==\"}"));
    }

    #[test]
    fn test_missing_identifiers_are_skipped() {
        let results = BlockResults {
            begin_block_events: Some(vec![
                event("send_packet", &[("packet_sequence", "1")]),
                event("send_packet", &[("packet_sequence", ""), ("packet_src_channel", "channel-1")]),
            ]),
            ..Default::default()
        };
        assert!(extract_packet_events(1, &results).is_empty());
    }

    #[test]
    fn test_non_transfer_packet_data_is_ignored() {
        let attrs: HashMap<&str, &str> = [("packet_data", "not json")].into_iter().collect();
        assert_eq!(extract_transfer(&attrs), TransferInfo::default());
    }
}

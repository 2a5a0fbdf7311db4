//! In-memory packet store and the send/ack join.
//!
//! Records are keyed by [`PacketKey`]; a repeated key overwrites the earlier
//! record. Acks whose send was never observed stay unmatched.
//!
//! A receive only joins a send row when it is the same packet: same source
//! channel and sequence, and the same destination channel. Receives of
//! inbound packets share source channel ids with local sends by accident and
//! never match.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::time::seconds_between;
use super::types::*;

#[derive(Debug, Default)]
pub struct PacketCorrelator {
    sends: HashMap<PacketKey, SendRecord>,
    acks: HashMap<PacketKey, AckRecord>,
    /// Keyed by packet key plus `packet_dst_channel`
    recvs: HashMap<(PacketKey, Option<String>), RecvRecord>,
    block_times: BTreeMap<u64, DateTime<Utc>>,
}

/// Counts of what the store currently holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CorrelatorStats {
    pub sends: usize,
    pub acks: usize,
    pub recvs: usize,
    pub matched: usize,
    pub block_times: usize,
}

impl PacketCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: PacketEvent) {
        let timestamp = self.block_times.get(&event.height).copied();
        match event.kind {
            PacketEventKind::Send => {
                self.sends.insert(
                    event.key,
                    SendRecord {
                        height: event.height,
                        timestamp,
                        dst_channel: event.dst_channel,
                        fee: event.fee,
                        transfer: event.transfer,
                    },
                );
            }
            PacketEventKind::Ack => {
                self.acks.insert(
                    event.key,
                    AckRecord {
                        height: event.height,
                        timestamp,
                        success: event.ack_success,
                        acknowledgement: event.acknowledgement,
                    },
                );
            }
            PacketEventKind::Recv => {
                self.recvs.insert(
                    (event.key, event.dst_channel),
                    RecvRecord {
                        height: event.height,
                        timestamp,
                        acknowledgement: event.acknowledgement,
                    },
                );
            }
        }
    }

    pub fn record_events(&mut self, events: impl IntoIterator<Item = PacketEvent>) {
        for event in events {
            self.record_event(event);
        }
    }

    pub fn record_block_time(&mut self, height: u64, time: DateTime<Utc>) {
        self.block_times.insert(height, time);
    }

    pub fn block_time(&self, height: u64) -> Option<DateTime<Utc>> {
        self.block_times.get(&height).copied()
    }

    pub fn send(&self, key: &PacketKey) -> Option<&SendRecord> {
        self.sends.get(key)
    }

    pub fn ack(&self, key: &PacketKey) -> Option<&AckRecord> {
        self.acks.get(key)
    }

    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            sends: self.sends.len(),
            acks: self.acks.len(),
            recvs: self.recvs.len(),
            matched: self.sends.keys().filter(|k| self.acks.contains_key(*k)).count(),
            block_times: self.block_times.len(),
        }
    }

    /// Join every send with its ack and receive.
    ///
    /// Times come from the block-time map at join time, so timestamps fetched
    /// after the event was recorded are still used. Rows are ordered by
    /// `(send_height, channel_id, sequence)`.
    pub fn rows(&self) -> Vec<PacketDelayRow> {
        let mut keys: Vec<(&PacketKey, &SendRecord)> = self.sends.iter().collect();
        keys.sort_by(|(ka, a), (kb, b)| a.height.cmp(&b.height).then_with(|| ka.cmp(kb)));

        keys.into_iter()
            .map(|(key, send)| {
                let send_time = self.block_time(send.height).or(send.timestamp);
                let ack = self.acks.get(key);
                let ack_time = ack.and_then(|a| self.block_time(a.height).or(a.timestamp));
                let recv = send
                    .dst_channel
                    .as_ref()
                    .and_then(|dst| self.recvs.get(&(key.clone(), Some(dst.clone()))));

                PacketDelayRow {
                    channel_id: key.channel_id.clone(),
                    sequence: key.sequence.clone(),
                    send_height: Some(send.height),
                    send_time,
                    ack_height: ack.map(|a| a.height),
                    ack_time,
                    block_delay: ack.map(|a| a.height as i64 - send.height as i64),
                    time_delay_sec: match (&send_time, &ack_time) {
                        (Some(s), Some(a)) => Some(seconds_between(s, a)),
                        _ => None,
                    },
                    fee_amount: send.fee.amount.clone(),
                    fee_denom: send.fee.denom.clone(),
                    sender: send.transfer.sender.clone(),
                    receiver: send.transfer.receiver.clone(),
                    denom: send.transfer.denom.clone(),
                    amount: send.transfer.amount.clone(),
                    ack_success: ack.and_then(|a| a.success),
                    acknowledgement: ack.and_then(|a| a.acknowledgement.clone()),
                    recv_height: recv.map(|r| r.height),
                    recv_time: recv.and_then(|r| self.block_time(r.height).or(r.timestamp)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibc::time::parse_block_time;

    fn packet(kind: PacketEventKind, channel: &str, seq: &str, height: u64) -> PacketEvent {
        PacketEvent {
            kind,
            key: PacketKey::new(channel, seq),
            height,
            tx_index: Some(0),
            dst_channel: Some("channel-141".to_string()),
            fee: FeeInfo::default(),
            transfer: TransferInfo::default(),
            ack_success: None,
            acknowledgement: None,
        }
    }

    #[test]
    fn test_join_computes_delays() {
        let mut store = PacketCorrelator::new();
        store.record_block_time(100, parse_block_time("2025-01-01T00:00:00Z").unwrap());
        store.record_event(packet(PacketEventKind::Send, "channel-0", "1", 100));
        store.record_event(packet(PacketEventKind::Ack, "channel-0", "1", 104));
        // ack time arrives after the ack was recorded
        store.record_block_time(104, parse_block_time("2025-01-01T00:00:24.5Z").unwrap());

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].send_height, Some(100));
        assert_eq!(rows[0].ack_height, Some(104));
        assert_eq!(rows[0].block_delay, Some(4));
        assert_eq!(rows[0].time_delay_sec, Some(24.5));
    }

    #[test]
    fn test_unmatched_send_has_no_ack() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Send, "channel-3", "8", 10));
        let rows = store.rows();
        assert_eq!(rows[0].ack_height, None);
        assert_eq!(rows[0].ack_time, None);
        assert_eq!(rows[0].block_delay, None);
    }

    #[test]
    fn test_ack_without_send_is_dropped() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Ack, "channel-3", "8", 10));
        assert!(store.rows().is_empty());
        assert_eq!(store.stats().acks, 1);
        assert_eq!(store.stats().matched, 0);
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Send, "channel-1", "5", 10));
        store.record_event(packet(PacketEventKind::Send, "channel-1", "5", 12));
        store.record_event(packet(PacketEventKind::Ack, "channel-1", "5", 15));
        store.record_event(packet(PacketEventKind::Ack, "channel-1", "5", 16));

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].send_height, Some(12));
        assert_eq!(rows[0].ack_height, Some(16));
        assert_eq!(rows[0].block_delay, Some(4));
    }

    #[test]
    fn test_rows_are_ordered() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Send, "channel-9", "1", 20));
        store.record_event(packet(PacketEventKind::Send, "channel-1", "2", 10));
        store.record_event(packet(PacketEventKind::Send, "channel-0", "3", 20));
        let order: Vec<(Option<u64>, String)> = store
            .rows()
            .into_iter()
            .map(|r| (r.send_height, r.channel_id))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some(10), "channel-1".to_string()),
                (Some(20), "channel-0".to_string()),
                (Some(20), "channel-9".to_string()),
            ]
        );
    }

    #[test]
    fn test_recv_of_same_packet_is_joined() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Send, "channel-1", "5", 10));
        let mut recv = packet(PacketEventKind::Recv, "channel-1", "5", 11);
        recv.acknowledgement = Some("AQ==".to_string());
        store.record_event(recv);
        let rows = store.rows();
        assert_eq!(rows[0].recv_height, Some(11));
        // the ack column only reflects acknowledge_packet
        assert_eq!(rows[0].acknowledgement, None);
    }

    #[test]
    fn test_inbound_recv_does_not_join_local_send() {
        let mut store = PacketCorrelator::new();
        store.record_event(packet(PacketEventKind::Send, "channel-0", "5", 10));
        let mut inbound = packet(PacketEventKind::Recv, "channel-0", "5", 11);
        inbound.dst_channel = Some("channel-7".to_string());
        inbound.acknowledgement = Some("{\"result\":\"AQ==\"}".to_string());
        store.record_event(inbound);
        let mut unlabelled = packet(PacketEventKind::Recv, "channel-0", "5", 12);
        unlabelled.dst_channel = None;
        store.record_event(unlabelled);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recv_height, None);
        assert_eq!(rows[0].recv_time, None);
        assert_eq!(rows[0].acknowledgement, None);
        assert_eq!(store.stats().recvs, 2);
    }
}

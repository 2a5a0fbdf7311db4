//! End-to-end runs over an in-memory chain: scan, export, merge, fill and analysis.

use std::fs;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use tempfile::TempDir;

use ibcscope::analysis::{analyze_delays, fit_families, Family};
use ibcscope::export::{self, merge_directory};
use ibcscope::ibc::PacketDelayRow;
use ibcscope::rpc::types::{BlockResults, Event, EventAttribute, TxResult};
use ibcscope::rpc::MemoryChain;
use ibcscope::scan::{fill_missing_times, PacketScanner, ScanOptions};

const PACKETS: u64 = 40;

fn block_time(height: u64) -> DateTime<Utc> {
    // uneven block times so the delays spread out
    let millis = height * 6_000 + (height * 7919 % 1_500);
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(millis as i64)
}

fn rfc3339(height: u64) -> String {
    block_time(height).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

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

fn send_tx(seq: u64) -> TxResult {
    TxResult {
        code: 0,
        events: vec![
            event("tx", &[("fee", &format!("{}uosmo", 1000 + seq * 10))]),
            event(
                "send_packet",
                &[
                    ("packet_sequence", &seq.to_string()),
                    ("packet_src_channel", "channel-0"),
                ],
            ),
        ],
    }
}

fn ack_tx(seq: u64) -> TxResult {
    TxResult {
        code: 0,
        events: vec![event(
            "acknowledge_packet",
            &[
                ("packet_sequence", &seq.to_string()),
                ("packet_src_channel", "channel-0"),
            ],
        )],
    }
}

/// One send per height from 1, acked 2 to 5 blocks later
fn chain(last_height: u64) -> MemoryChain {
    let mut txs: Vec<Vec<TxResult>> = vec![Vec::new(); last_height as usize + 1];
    for seq in 1..=PACKETS {
        txs[seq as usize].push(send_tx(seq));
        let ack = seq + 2 + seq % 4;
        if ack <= last_height {
            txs[ack as usize].push(ack_tx(seq));
        }
    }

    let mut chain = MemoryChain::new();
    for height in 1..=last_height {
        chain = chain.with_block(height, &rfc3339(height)).with_results(
            height,
            BlockResults {
                txs_results: Some(txs[height as usize].clone()),
                ..Default::default()
            },
        );
    }
    chain
}

fn options(start: u64, end: u64, checkpoints: Option<&std::path::Path>) -> ScanOptions {
    ScanOptions {
        start_height: start,
        end_height: end,
        checkpoint_interval: if checkpoints.is_some() { 10 } else { 0 },
        checkpoint_dir: checkpoints.map(|p| p.to_path_buf()),
        request_delay: Duration::ZERO,
        show_progress: false,
    }
}

fn scan(chain: &MemoryChain, start: u64, end: u64) -> Vec<PacketDelayRow> {
    let mut scanner = PacketScanner::new(chain, options(start, end, None));
    scanner.run().unwrap();
    scanner.rows()
}

#[test]
fn test_scan_joins_every_packet() {
    let chain = chain(50);
    let rows = scan(&chain, 1, 50);

    assert_eq!(rows.len(), PACKETS as usize);
    for row in &rows {
        let send = row.send_height.unwrap();
        let ack = row.ack_height.unwrap();
        assert_eq!(row.block_delay, Some(ack as i64 - send as i64));
        assert!(row.block_delay.unwrap() >= 2);
        assert!(row.time_delay_sec.unwrap() > 0.0);
        assert_eq!(row.send_time, Some(block_time(send)));
        let seq: u64 = row.sequence.parse().unwrap();
        assert_eq!(row.fee_amount, Some((1000 + seq * 10).to_string()));
        assert_eq!(row.fee_denom.as_deref(), Some("uosmo"));
    }
}

#[test]
fn test_partial_range_leaves_acks_unmatched() {
    let chain = chain(50);
    // acks of the last packets fall beyond height 40
    let rows = scan(&chain, 1, 40);
    let unmatched: Vec<&PacketDelayRow> = rows.iter().filter(|r| r.ack_height.is_none()).collect();
    assert!(!unmatched.is_empty());
    for row in unmatched {
        assert_eq!(row.ack_time, None);
        assert_eq!(row.block_delay, None);
        assert_eq!(row.time_delay_sec, None);
    }

    // a range holding only acks yields no rows
    assert!(scan(&chain, 41, 50).is_empty());
}

#[test]
fn test_checkpoints_and_idempotent_merge() {
    let chain = chain(50);
    let dir = TempDir::new().unwrap();
    let checkpoints = dir.path().join("current");

    let mut scanner = PacketScanner::new(&chain, options(1, 50, Some(&checkpoints)));
    let summary = scanner.run().unwrap();
    assert_eq!(summary.blocks_scanned, 50);
    assert_eq!(
        summary.checkpoints,
        (1..=4)
            .map(|i| export::checkpoint_path(&checkpoints, 1, i * 10))
            .collect::<Vec<_>>()
    );

    // the same final table saved twice merges to one copy
    let parts = dir.path().join("parts");
    let rows = scanner.rows();
    export::write_rows(&parts.join("a.csv"), &rows).unwrap();
    export::write_rows(&parts.join("b.csv"), &rows).unwrap();
    fs::write(parts.join("empty.csv"), "").unwrap();

    let merged = dir.path().join("merged.csv");
    let first = merge_directory(&parts, &merged).unwrap();
    assert_eq!(first.files_empty, 1);
    assert_eq!(first.rows_out, rows.len());
    assert_eq!(first.duplicates, rows.len());

    let again_dir = dir.path().join("again");
    fs::create_dir_all(&again_dir).unwrap();
    fs::copy(&merged, again_dir.join("merged.csv")).unwrap();
    let remerged = dir.path().join("remerged.csv");
    let second = merge_directory(&again_dir, &remerged).unwrap();
    assert_eq!(second.duplicates, 0);
    assert_eq!(fs::read_to_string(&merged).unwrap(), fs::read_to_string(&remerged).unwrap());
}

#[test]
fn test_fill_recovers_missing_times() {
    let full = chain(50);
    let mut rows = scan(&full, 1, 50);
    for row in rows.iter_mut().filter(|r| r.sequence.ends_with('3')) {
        row.ack_time = None;
        row.time_delay_sec = None;
    }
    let expected = scan(&full, 1, 50);

    let summary = fill_missing_times(&full, &mut rows, Duration::ZERO, false);
    assert!(summary.heights_failed.is_empty());
    assert_eq!(summary.heights_missing, summary.heights_fetched);
    assert_eq!(summary.rows_updated, 4);
    assert_eq!(rows, expected);
}

#[test]
fn test_analysis_and_fits_are_deterministic() {
    let chain = chain(50);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("packets.csv");
    export::write_rows(&path, &scan(&chain, 1, 50)).unwrap();
    let rows = export::read_rows(&path).unwrap();

    let (analysis, tables) = analyze_delays(&rows, Some("0")).unwrap();
    assert_eq!(analysis.channel.as_deref(), Some("channel-0"));
    assert_eq!(analysis.rows_with_times, PACKETS as usize);
    assert_eq!(tables.with_delays.len(), PACKETS as usize);
    assert!(analysis.block_delay.min >= 2.0);
    assert!(analysis.fee.is_some());
    assert!(analyze_delays(&rows, Some("7")).is_err());

    let delays: Vec<f64> = tables.filtered.iter().filter_map(|r| r.time_delay_sec).collect();
    let first = fit_families(&delays, 20, false, &Family::ALL);
    let second = fit_families(&delays, 20, false, &Family::ALL);
    assert_eq!(first.outcomes.len(), 3);
    for (a, b) in first.outcomes.iter().zip(&second.outcomes) {
        assert_eq!(
            a.result.as_ref().map(|r| r.values()),
            b.result.as_ref().map(|r| r.values())
        );
    }
    assert_eq!(first.best, second.best);
}

#[test]
fn test_batched_relayer_tx_keeps_packet_data_apart() {
    let send = |seq: &str| {
        event(
            "send_packet",
            &[
                ("packet_sequence", seq),
                ("packet_src_channel", "channel-0"),
                ("packet_dst_channel", "channel-141"),
            ],
        )
    };
    let ack = |seq: &str| {
        event(
            "acknowledge_packet",
            &[
                ("packet_sequence", seq),
                ("packet_src_channel", "channel-0"),
                ("packet_dst_channel", "channel-141"),
            ],
        )
    };
    let relayer_tx = TxResult {
        code: 0,
        events: vec![
            // inbound packet from a counterparty whose channel id happens to match ours
            event(
                "recv_packet",
                &[
                    ("packet_sequence", "1"),
                    ("packet_src_channel", "channel-0"),
                    ("packet_dst_channel", "channel-7"),
                ],
            ),
            event("fungible_token_packet", &[("success", "true")]),
            event(
                "write_acknowledgement",
                &[
                    ("packet_sequence", "1"),
                    ("packet_src_channel", "channel-0"),
                    ("packet_ack", "{\"result\":\"AQ==\"}"),
                ],
            ),
            ack("1"),
            event("fungible_token_packet", &[("module", "transfer"), ("acknowledgement", "result:ack1")]),
            event("fungible_token_packet", &[("success", "\u{1}")]),
            ack("2"),
            event("fungible_token_packet", &[("module", "transfer"), ("acknowledgement", "error:ack2")]),
            event("fungible_token_packet", &[("error", "ABCI code: 5")]),
        ],
    };

    let chain = MemoryChain::new()
        .with_block(1, &rfc3339(1))
        .with_block(2, &rfc3339(2))
        .with_results(
            1,
            BlockResults {
                txs_results: Some(vec![TxResult {
                    code: 0,
                    events: vec![send("1"), send("2")],
                }]),
                ..Default::default()
            },
        )
        .with_results(
            2,
            BlockResults {
                txs_results: Some(vec![relayer_tx]),
                ..Default::default()
            },
        );

    let rows = scan(&chain, 1, 2);
    let outcomes: Vec<(&str, Option<bool>, Option<&str>, Option<u64>)> = rows
        .iter()
        .map(|r| {
            (
                r.sequence.as_str(),
                r.ack_success,
                r.acknowledgement.as_deref(),
                r.recv_height,
            )
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("1", Some(true), Some("result:ack1"), None),
            ("2", Some(false), Some("error:ack2"), None),
        ]
    );
}

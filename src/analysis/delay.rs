//! Delay derivation, channel selection and fee extraction over packet rows.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::stats::{self, Describe};
use crate::ibc::PacketDelayRow;

/// First run of digits in a fee cell such as `2500uatom`
static FEE_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("Invalid fee regex"));

pub const TOP_CHANNELS: usize = 7;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid channel {0:?}: expected `channel-N` or `N`")]
    Malformed(String),
    #[error("channel {0} does not appear in the data")]
    Unknown(String),
}

/// Normalise `141` or `channel-141` to `channel-141`
pub fn normalize_channel(input: &str) -> Result<String, ChannelError> {
    let trimmed = input.trim();
    let number = trimmed.strip_prefix("channel-").unwrap_or(trimmed);
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ChannelError::Malformed(input.to_string()));
    }
    Ok(format!("channel-{}", number))
}

/// Short label for file names: the channel number, or `all`
pub fn channel_label(channel: Option<&str>) -> String {
    match channel {
        Some(c) => c.strip_prefix("channel-").unwrap_or(c).to_string(),
        None => "all".to_string(),
    }
}

fn channel_number(channel: &str) -> Option<u64> {
    channel.strip_prefix("channel-")?.parse().ok()
}

/// Distinct channel ids, numerically ordered; non-numeric ids sort last
pub fn available_channels(rows: &[PacketDelayRow]) -> Vec<String> {
    let mut channels: Vec<String> = rows.iter().map(|r| r.channel_id.clone()).collect();
    channels.sort_by(|a, b| match (channel_number(a), channel_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    channels.dedup();
    channels
}

/// Channels by packet count, largest first, ties by channel id
pub fn top_channels(rows: &[PacketDelayRow], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.channel_id.as_str()).or_default() += 1;
    }
    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(c, n)| (c.to_string(), n))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(n);
    counts
}

/// Rows of one channel, which must exist in `rows`
pub fn filter_channel(
    rows: &[PacketDelayRow],
    channel: &str,
) -> Result<Vec<PacketDelayRow>, ChannelError> {
    let channel = normalize_channel(channel)?;
    let filtered: Vec<PacketDelayRow> = rows
        .iter()
        .filter(|r| r.channel_id == channel)
        .cloned()
        .collect();
    if filtered.is_empty() {
        return Err(ChannelError::Unknown(channel));
    }
    Ok(filtered)
}

/// Rows having both timestamps, with delays recomputed from them
pub fn with_delays(rows: &[PacketDelayRow]) -> Vec<PacketDelayRow> {
    rows.iter()
        .filter(|r| r.send_time.is_some() && r.ack_time.is_some())
        .cloned()
        .map(|mut r| {
            r.refresh_delays();
            r
        })
        .collect()
}

/// Drop rows whose time delay lies beyond `mean ± k·std`
pub fn remove_time_outliers(rows: &[PacketDelayRow], k: f64) -> Vec<PacketDelayRow> {
    let delays: Vec<f64> = rows.iter().filter_map(|r| r.time_delay_sec).collect();
    let (lo, hi) = stats::sigma_bounds(&delays, k);
    rows.iter()
        .filter(|r| r.time_delay_sec.is_some_and(|d| d >= lo && d <= hi))
        .cloned()
        .collect()
}

pub fn time_delays(rows: &[PacketDelayRow]) -> Vec<f64> {
    rows.iter().filter_map(|r| r.time_delay_sec).collect()
}

pub fn block_delays(rows: &[PacketDelayRow]) -> Vec<f64> {
    rows.iter().filter_map(|r| r.block_delay.map(|b| b as f64)).collect()
}

pub fn parse_fee(cell: &str) -> Option<f64> {
    FEE_DIGITS.find(cell).and_then(|m| m.as_str().parse().ok())
}

/// One row usable for fee plots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeePoint {
    pub send_time: DateTime<Utc>,
    pub delay_sec: f64,
    pub fee: f64,
}

pub fn fee_points(rows: &[PacketDelayRow]) -> Vec<FeePoint> {
    rows.iter()
        .filter_map(|r| {
            Some(FeePoint {
                send_time: r.send_time?,
                delay_sec: r.time_delay_sec?,
                fee: parse_fee(r.fee_amount.as_deref()?)?,
            })
        })
        .collect()
}

/// Pearson correlation; `None` with fewer than two points or zero variance
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let (mx, my) = (stats::mean(xs), stats::mean(ys));
    let cov: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let vx: f64 = xs.iter().map(|x| (x - mx) * (x - mx)).sum();
    let vy: f64 = ys.iter().map(|y| (y - my) * (y - my)).sum();
    (vx > 0.0 && vy > 0.0).then(|| cov / (vx * vy).sqrt())
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeSummary {
    pub points: usize,
    pub fee: Describe,
    pub delay_fee_correlation: Option<f64>,
}

pub fn fee_summary(points: &[FeePoint]) -> FeeSummary {
    let fees: Vec<f64> = points.iter().map(|p| p.fee).collect();
    let delays: Vec<f64> = points.iter().map(|p| p.delay_sec).collect();
    FeeSummary {
        points: points.len(),
        fee: stats::describe(&fees),
        delay_fee_correlation: correlation(&delays, &fees),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DelayAnalysis {
    pub channel: Option<String>,
    pub total_rows: usize,
    pub channel_rows: usize,
    pub rows_with_times: usize,
    pub rows_after_outliers: usize,
    pub top_channels: Vec<(String, usize)>,
    pub time_delay: Describe,
    pub block_delay: Describe,
    pub time_delay_bins: usize,
    pub block_delay_bins: usize,
    pub fee: Option<FeeSummary>,
}

/// Rows at each stage of the analysis
#[derive(Debug, Clone, Default)]
pub struct DelayTables {
    /// Selected channel with both timestamps, before outlier removal
    pub with_delays: Vec<PacketDelayRow>,
    /// After 3σ removal on the time delay
    pub filtered: Vec<PacketDelayRow>,
}

pub fn analyze_delays(
    rows: &[PacketDelayRow],
    channel: Option<&str>,
) -> Result<(DelayAnalysis, DelayTables), ChannelError> {
    let (channel, selected) = match channel {
        Some(c) => {
            let normalized = normalize_channel(c)?;
            let selected = filter_channel(rows, &normalized)?;
            (Some(normalized), selected)
        }
        None => (None, rows.to_vec()),
    };

    let with = with_delays(&selected);
    let filtered = remove_time_outliers(&with, 3.0);
    let times = time_delays(&filtered);
    let blocks = block_delays(&filtered);
    let points = fee_points(&filtered);

    let analysis = DelayAnalysis {
        channel,
        total_rows: rows.len(),
        channel_rows: selected.len(),
        rows_with_times: with.len(),
        rows_after_outliers: filtered.len(),
        top_channels: top_channels(rows, TOP_CHANNELS),
        time_delay: stats::describe(&times),
        block_delay: stats::describe(&blocks),
        time_delay_bins: stats::freedman_diaconis_bins(&times),
        block_delay_bins: stats::freedman_diaconis_bins(&blocks),
        fee: (!points.is_empty()).then(|| fee_summary(&points)),
    };
    log::info!(
        "{} rows with both times, {} after outlier removal",
        analysis.rows_with_times,
        analysis.rows_after_outliers
    );
    Ok((
        analysis,
        DelayTables {
            with_delays: with,
            filtered,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibc::time::parse_block_time;

    fn row(channel: &str, seq: u64, delay: Option<f64>, fee: Option<&str>) -> PacketDelayRow {
        let send = parse_block_time("2025-01-01T00:00:00Z").unwrap();
        PacketDelayRow {
            channel_id: channel.to_string(),
            sequence: seq.to_string(),
            send_height: Some(100),
            send_time: Some(send),
            ack_height: Some(103),
            ack_time: delay.map(|d| send + chrono::Duration::milliseconds((d * 1000.0) as i64)),
            fee_amount: fee.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_channel_normalisation() {
        assert_eq!(normalize_channel("141").unwrap(), "channel-141");
        assert_eq!(normalize_channel(" channel-0 ").unwrap(), "channel-0");
        assert!(matches!(normalize_channel("chan-1"), Err(ChannelError::Malformed(_))));
        assert!(matches!(normalize_channel("channel-"), Err(ChannelError::Malformed(_))));
        assert_eq!(channel_label(Some("channel-141")), "141");
        assert_eq!(channel_label(None), "all");
    }

    #[test]
    fn test_available_and_top_channels() {
        let rows = vec![
            row("channel-10", 1, None, None),
            row("channel-2", 2, None, None),
            row("channel-10", 3, None, None),
            row("channel-2", 4, None, None),
            row("channel-10", 5, None, None),
            row("weird", 6, None, None),
        ];
        assert_eq!(available_channels(&rows), vec!["channel-2", "channel-10", "weird"]);
        assert_eq!(
            top_channels(&rows, 2),
            vec![("channel-10".to_string(), 3), ("channel-2".to_string(), 2)]
        );
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let rows = vec![row("channel-1", 1, Some(5.0), None)];
        assert_eq!(
            filter_channel(&rows, "9"),
            Err(ChannelError::Unknown("channel-9".to_string()))
        );
        assert_eq!(filter_channel(&rows, "1").unwrap().len(), 1);
    }

    #[test]
    fn test_rows_without_times_are_dropped() {
        let mut rows = vec![row("channel-1", 1, Some(12.5), None), row("channel-1", 2, None, None)];
        rows[0].block_delay = None;
        let with = with_delays(&rows);
        assert_eq!(with.len(), 1);
        assert_eq!(with[0].time_delay_sec, Some(12.5));
        assert_eq!(with[0].block_delay, Some(3));
    }

    #[test]
    fn test_fee_parsing() {
        assert_eq!(parse_fee("2500uatom"), Some(2500.0));
        assert_eq!(parse_fee("fee: 30inj,5uatom"), Some(30.0));
        assert_eq!(parse_fee("none"), None);
    }

    #[test]
    fn test_analysis_pipeline() {
        let mut rows: Vec<PacketDelayRow> = (0..50)
            .map(|i| row("channel-0", i, Some(10.0 + (i % 5) as f64), Some("100uosmo")))
            .collect();
        rows.push(row("channel-0", 99, Some(5000.0), Some("1uosmo")));
        rows.push(row("channel-1", 1, None, None));

        let (analysis, tables) = analyze_delays(&rows, Some("0")).unwrap();
        assert_eq!(analysis.channel.as_deref(), Some("channel-0"));
        assert_eq!(analysis.total_rows, 52);
        assert_eq!(analysis.channel_rows, 51);
        assert_eq!(analysis.rows_with_times, 51);
        assert_eq!(analysis.rows_after_outliers, 50);
        assert_eq!(tables.with_delays.len(), 51);
        assert_eq!(analysis.time_delay.max, 14.0);
        assert_eq!(analysis.block_delay.mean, 3.0);
        let fee = analysis.fee.unwrap();
        assert_eq!(fee.points, 50);
        assert_eq!(fee.delay_fee_correlation, None);
    }

    #[test]
    fn test_correlation() {
        assert!((correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((correlation(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&[1.0], &[1.0]), None);
    }
}

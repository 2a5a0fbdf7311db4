//! Report generation for delay, fit and probe analyses.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::stats::Describe;
use super::types::*;

/// Generate JSON report
pub fn generate_json_report(report: &FullAnalysisReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

fn describe_lines(lines: &mut Vec<String>, name: &str, unit: &str, d: &Describe) {
    lines.push(format!("{}:", name));
    lines.push(format!("  count: {}", d.count));
    lines.push(format!("  mean:  {:.3}{}", d.mean, unit));
    lines.push(format!("  std:   {:.3}{}", d.std, unit));
    lines.push(format!("  min:   {:.3}{}", d.min, unit));
    lines.push(format!("  25%:   {:.3}{}", d.q25, unit));
    lines.push(format!("  50%:   {:.3}{}", d.median, unit));
    lines.push(format!("  75%:   {:.3}{}", d.q75, unit));
    lines.push(format!("  max:   {:.3}{}", d.max, unit));
    lines.push(String::new());
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{:.4}", v))
}

/// Render the text form of a report
pub fn render_text_report(report: &FullAnalysisReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    section(&mut lines, "IBC PACKET DELAY ANALYSIS");
    lines.push(format!("Analysis Date: {}", report.metadata.analysis_timestamp));
    lines.push(format!("Input: {}", report.metadata.input));
    lines.push(format!("Version: {}", report.metadata.tool_version));
    lines.push(String::new());

    if let Some(ref delay) = report.delay_analysis {
        section(&mut lines, "RELAY DELAYS");
        lines.push(format!(
            "Channel: {}",
            delay.channel.as_deref().unwrap_or("all")
        ));
        lines.push(format!("Rows in input: {}", delay.total_rows));
        lines.push(format!("Rows in selection: {}", delay.channel_rows));
        lines.push(format!("Rows with send and ack time: {}", delay.rows_with_times));
        lines.push(format!(
            "Rows after 3-sigma outlier removal: {}",
            delay.rows_after_outliers
        ));
        lines.push(String::new());

        if !delay.top_channels.is_empty() {
            lines.push("Top Channels:".to_string());
            for (i, (channel, count)) in delay.top_channels.iter().enumerate() {
                lines.push(format!("  {}. {}: {} packets", i + 1, channel, count));
            }
            lines.push(String::new());
        }

        describe_lines(&mut lines, "Time Delay", "s", &delay.time_delay);
        describe_lines(&mut lines, "Block Delay", " blocks", &delay.block_delay);
        lines.push(format!(
            "Histogram bins (Freedman-Diaconis): {} time, {} block",
            delay.time_delay_bins, delay.block_delay_bins
        ));
        lines.push(String::new());

        if let Some(ref fee) = delay.fee {
            lines.push(format!("Fees ({} packets with a fee):", fee.points));
            lines.push(format!("  mean: {:.1}, median: {:.1}, max: {:.1}", fee.fee.mean, fee.fee.median, fee.fee.max));
            lines.push(format!(
                "  delay/fee correlation: {}",
                fmt_opt(fee.delay_fee_correlation)
            ));
            lines.push(String::new());
        }
    }

    if let Some(ref fits) = report.fit_analysis {
        section(&mut lines, "DISTRIBUTION FITS");
        lines.push(format!(
            "Values: {} ({} excluded as outliers), bins: {}",
            fits.n_values, fits.n_excluded, fits.bins
        ));
        lines.push(String::new());

        for outcome in &fits.outcomes {
            match (&outcome.result, &outcome.error) {
                (Some(fit), _) => {
                    let params: Vec<String> = fit
                        .params
                        .iter()
                        .map(|(name, v)| format!("{}={:.4}", name, v))
                        .collect();
                    lines.push(format!("{}:", outcome.family.name()));
                    lines.push(format!("  parameters: {}", params.join(", ")));
                    lines.push(format!("  mean: {}, variance: {}", fmt_opt(fit.mean), fmt_opt(fit.variance)));
                    lines.push(format!("  RSS: {:.6e}, AIC: {:.3}", fit.rss, fit.aic));
                }
                (None, error) => {
                    lines.push(format!(
                        "{}: fit failed ({})",
                        outcome.family.name(),
                        error.as_deref().unwrap_or("unknown error")
                    ));
                }
            }
            lines.push(String::new());
        }

        match fits.best {
            Some(best) => lines.push(format!("Best fit by AIC: {}", best.name())),
            None => lines.push("No family could be fitted.".to_string()),
        }
        lines.push(String::new());
    }

    if let Some(ref blocks) = report.block_interval_analysis {
        section(&mut lines, "BLOCK INTERVALS");
        lines.push(format!(
            "Blocks: {} (heights {} to {})",
            blocks.blocks,
            blocks.first_height.map_or("-".to_string(), |h| h.to_string()),
            blocks.last_height.map_or("-".to_string(), |h| h.to_string())
        ));
        lines.push(String::new());
        describe_lines(&mut lines, "Interval", "s", &blocks.interval_sec);
    }

    if let Some(ref mempool) = report.mempool_analysis {
        section(&mut lines, "MEMPOOL");
        lines.push(format!(
            "Samples: {} ({} to {})",
            mempool.samples,
            mempool.first_sample.as_deref().unwrap_or("-"),
            mempool.last_sample.as_deref().unwrap_or("-")
        ));
        lines.push(String::new());
        describe_lines(&mut lines, "Unconfirmed transactions", "", &mempool.n_txs);
        describe_lines(&mut lines, "Total", "", &mempool.total);
        describe_lines(&mut lines, "Total bytes", "", &mempool.total_bytes);
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &FullAnalysisReport, output_path: &Path) -> Result<()> {
    let content = render_text_report(report);
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &FullAnalysisReport) {
    println!("\n=== IBC DELAY ANALYSIS SUMMARY ===\n");
    println!("Input: {}", report.metadata.input);

    if let Some(ref delay) = report.delay_analysis {
        println!("\nRelay Delays ({}):", delay.channel.as_deref().unwrap_or("all channels"));
        println!("  Packets analysed: {}", delay.rows_after_outliers);
        println!("  Mean: {:.2}s", delay.time_delay.mean);
        println!("  Median: {:.2}s", delay.time_delay.median);
        println!("  Mean block delay: {:.2}", delay.block_delay.mean);
    }

    if let Some(ref fits) = report.fit_analysis {
        println!("\nDistribution Fits:");
        for fit in fits.successful() {
            println!("  {}: AIC {:.3}", fit.family.name(), fit.aic);
        }
        if let Some(best) = fits.best {
            println!("  Best: {}", best.name());
        }
    }

    if let Some(ref blocks) = report.block_interval_analysis {
        println!("\nBlock Intervals:");
        println!("  Mean: {:.3}s over {} blocks", blocks.interval_sec.mean, blocks.blocks);
    }

    if let Some(ref mempool) = report.mempool_analysis {
        println!("\nMempool:");
        println!("  Samples: {}", mempool.samples);
        println!("  Mean unconfirmed txs: {:.1}", mempool.n_txs.mean);
    }

    println!();
}

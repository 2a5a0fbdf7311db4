//! Relay delay analysis CLI for ibcscope packet CSVs.
//!
//! Merges partial scans, computes delay statistics, fits delay
//! distributions and renders fee and mempool plots.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};

use ibcscope::analysis::{
    self,
    delay,
    plots::{self, Labels},
    probes, prompt, stats,
    types::{AnalysisMetadata, FullAnalysisReport},
    Family,
};
use ibcscope::export;
use ibcscope::ibc::PacketDelayRow;
use ibcscope::scan::MempoolSample;

#[derive(Parser)]
#[command(name = "delay-analyzer")]
#[command(about = "Relay delay analysis for IBC packet CSVs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for reports and plots
    #[arg(short, long, default_value = "analysis_output")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every CSV in a directory into one deduplicated file
    Merge {
        /// Directory holding checkpoint or partial CSVs
        dir: PathBuf,

        /// Name of the merged file inside the output directory
        #[arg(long, default_value = "merged_ibc_packets.csv")]
        name: String,
    },

    /// Delay statistics and histograms for all channels or one channel
    Delays {
        input: PathBuf,

        /// Channel to analyse (`channel-N` or `N`)
        #[arg(long)]
        channel: Option<String>,

        /// Ask for a channel filter on stdin
        #[arg(long)]
        interactive: bool,
    },

    /// Fit Gumbel, Fréchet and Normal densities to the time delays
    Fit {
        input: PathBuf,

        #[arg(long)]
        channel: Option<String>,

        /// Histogram bins
        #[arg(long, default_value_t = analysis::fit::DEFAULT_BINS)]
        bins: usize,

        /// Drop values beyond mean ± 3σ before fitting
        #[arg(long)]
        exclude_outliers: bool,

        /// Families to fit (default: all)
        #[arg(long = "family", value_enum)]
        families: Vec<Family>,
    },

    /// Scatter plots of fees against delays and send times
    Fees {
        input: PathBuf,

        #[arg(long)]
        channel: Option<String>,
    },

    /// Statistics and plots of a mempool polling CSV
    MempoolReport { input: PathBuf },

    /// Show summary statistics
    Summary { input: PathBuf },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory: {}", cli.output.display()))?;

    match cli.command {
        Commands::Merge { dir, name } => {
            let output = cli.output.join(name);
            let summary = export::merge_directory(&dir, &output)?;
            println!(
                "Merged {} files ({} empty): {} rows in, {} rows out, {} duplicates -> {}",
                summary.files_read,
                summary.files_empty,
                summary.rows_in,
                summary.rows_out,
                summary.duplicates,
                output.display()
            );
        }
        Commands::Delays {
            input,
            channel,
            interactive,
        } => {
            let rows = load_rows(&input)?;
            let channel = select_channel(&rows, channel, interactive)?;
            run_delay_analysis(&cli.output, &input, &rows, channel.as_deref())?;
        }
        Commands::Fit {
            input,
            channel,
            bins,
            exclude_outliers,
            families,
        } => {
            let rows = load_rows(&input)?;
            let families = if families.is_empty() {
                Family::ALL.to_vec()
            } else {
                families
            };
            run_fit(&cli.output, &input, &rows, channel.as_deref(), bins, exclude_outliers, &families)?;
        }
        Commands::Fees { input, channel } => {
            let rows = load_rows(&input)?;
            run_fee_plots(&cli.output, &rows, channel.as_deref())?;
        }
        Commands::MempoolReport { input } => {
            let samples: Vec<MempoolSample> = export::read_records(&input)?;
            if samples.is_empty() {
                return Err(eyre!("no mempool samples in {}", input.display()));
            }
            run_mempool_report(&cli.output, &input, &samples)?;
        }
        Commands::Summary { input } => {
            let rows = load_rows(&input)?;
            print_data_summary(&input, &rows);
        }
    }

    Ok(())
}

fn load_rows(input: &Path) -> Result<Vec<PacketDelayRow>> {
    log::info!("Loading {}...", input.display());
    let rows = export::read_rows(input)?;
    log::info!("Loaded {} rows", rows.len());
    Ok(rows)
}

fn select_channel(
    rows: &[PacketDelayRow],
    channel: Option<String>,
    interactive: bool,
) -> Result<Option<String>> {
    if channel.is_some() || !interactive {
        return Ok(channel);
    }
    let available = delay::available_channels(rows);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    Ok(prompt::prompt_channel(&mut input, &mut output, &available)?)
}

fn report_paths(output: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        output.join(format!("{}.json", stem)),
        output.join(format!("{}.txt", stem)),
    )
}

fn run_delay_analysis(
    output: &Path,
    input: &Path,
    rows: &[PacketDelayRow],
    channel: Option<&str>,
) -> Result<()> {
    let (delays, tables) = delay::analyze_delays(rows, channel)?;
    let label = delay::channel_label(delays.channel.as_deref());

    let csv_path = output.join(format!("ibc_time_delay_analysis_{}.csv", label));
    export::write_rows(&csv_path, &tables.with_delays)?;
    log::info!("Analysis rows written to {}", csv_path.display());

    let times = delay::time_delays(&tables.filtered);
    let blocks = delay::block_delays(&tables.filtered);
    match stats::Histogram::new(&times, delays.time_delay_bins) {
        Some(hist) => {
            let heights: Vec<f64> = hist.counts.iter().map(|c| *c as f64).collect();
            plots::draw_histogram(
                &output.join(format!("time_delay_histogram_{}.png", label)),
                &Labels {
                    title: &format!("Time delay, channel {}", label),
                    x: "Delay (s)",
                    y: "Packets",
                },
                &hist,
                &heights,
                Some(time_delay_axis(&times)),
                &[],
            )?;
        }
        None => log::warn!("No packets with both timestamps; skipping delay histograms"),
    }
    if let Some(hist) = stats::Histogram::new(&blocks, delays.block_delay_bins) {
        let heights: Vec<f64> = hist.counts.iter().map(|c| *c as f64).collect();
        plots::draw_histogram(
            &output.join(format!("block_delay_histogram_{}.png", label)),
            &Labels {
                title: &format!("Block delay, channel {}", label),
                x: "Delay (blocks)",
                y: "Packets",
            },
            &hist,
            &heights,
            None,
            &[],
        )?;
    }

    let mut report = FullAnalysisReport::new(AnalysisMetadata::now(&input.display().to_string()));
    report.delay_analysis = Some(delays);
    let (json, text) = report_paths(output, &format!("delay_report_{}", label));
    analysis::generate_json_report(&report, &json)?;
    analysis::generate_text_report(&report, &text)?;
    analysis::report::print_summary(&report);
    Ok(())
}

/// Histogram x range: from zero (or the smallest delay, if negative) to
/// 30 s past the 99th percentile
fn time_delay_axis(times: &[f64]) -> Range<f64> {
    let x_min = times.iter().copied().fold(0.0, f64::min);
    let x_max = stats::quantile(times, 0.99) + 30.0;
    if x_max > x_min {
        x_min..x_max
    } else {
        x_min..x_min + 1.0
    }
}

fn run_fit(
    output: &Path,
    input: &Path,
    rows: &[PacketDelayRow],
    channel: Option<&str>,
    bins: usize,
    exclude_outliers: bool,
    families: &[Family],
) -> Result<()> {
    let selected = match channel {
        Some(c) => delay::filter_channel(rows, c)?,
        None => rows.to_vec(),
    };
    let label = delay::channel_label(channel.map(delay::normalize_channel).transpose()?.as_deref());
    let values = delay::time_delays(&delay::with_delays(&selected));
    if values.is_empty() {
        return Err(eyre!("no packets with both timestamps in {}", input.display()));
    }

    log::info!("Fitting {} delays with {} bins", values.len(), bins);
    let fits = analysis::fit_families(&values, bins, exclude_outliers, families);

    if let Some(hist) = &fits.histogram {
        let range = hist.edges[0]..hist.edges[hist.bins()];
        let curves = plots::fit_curves(&fits, range);
        plots::draw_histogram(
            &output.join(format!("delay_fit_{}.png", label)),
            &Labels {
                title: &format!("Time delay distribution fits, channel {}", label),
                x: "Delay (s)",
                y: "Density",
            },
            hist,
            &hist.density(),
            None,
            &curves,
        )?;
    }

    let mut report = FullAnalysisReport::new(AnalysisMetadata::now(&input.display().to_string()));
    report.fit_analysis = Some(fits);
    let (json, text) = report_paths(output, &format!("fit_report_{}", label));
    analysis::generate_json_report(&report, &json)?;
    analysis::generate_text_report(&report, &text)?;
    analysis::report::print_summary(&report);
    Ok(())
}

fn run_fee_plots(output: &Path, rows: &[PacketDelayRow], channel: Option<&str>) -> Result<()> {
    let (delays, tables) = delay::analyze_delays(rows, channel)?;
    let label = delay::channel_label(delays.channel.as_deref());
    let points = delay::fee_points(&tables.filtered);
    let Some(first) = points.iter().map(|p| p.send_time).min() else {
        return Err(eyre!("no packets with a fee and both timestamps"));
    };
    let hours = |p: &delay::FeePoint| ibcscope::ibc::time::seconds_between(&first, &p.send_time) / 3600.0;

    let delay_vs_fee: Vec<(f64, f64)> = points.iter().map(|p| (p.fee, p.delay_sec)).collect();
    let fee_vs_time: Vec<(f64, f64)> = points.iter().map(|p| (hours(p), p.fee)).collect();
    let delay_vs_time: Vec<(f64, f64)> = points.iter().map(|p| (hours(p), p.delay_sec)).collect();

    plots::draw_scatter(
        &output.join(format!("delay_vs_fee_{}.png", label)),
        &Labels {
            title: "Relay delay vs fee",
            x: "Fee",
            y: "Delay (s)",
        },
        &delay_vs_fee,
        None,
    )?;
    plots::draw_scatter(
        &output.join(format!("fee_vs_send_time_{}.png", label)),
        &Labels {
            title: "Fee over time",
            x: "Hours since first send",
            y: "Fee",
        },
        &fee_vs_time,
        None,
    )?;
    plots::draw_scatter(
        &output.join(format!("delay_vs_send_time_{}.png", label)),
        &Labels {
            title: "Relay delay over time",
            x: "Hours since first send",
            y: "Delay (s)",
        },
        &delay_vs_time,
        None,
    )?;

    if let Some(fee) = &delays.fee {
        println!("Packets with a fee: {}", fee.points);
        println!("  Mean fee: {:.1}", fee.fee.mean);
        match fee.delay_fee_correlation {
            Some(r) => println!("  Delay/fee correlation: {:.4}", r),
            None => println!("  Delay/fee correlation: undefined"),
        }
    }
    Ok(())
}

fn run_mempool_report(output: &Path, input: &Path, samples: &[MempoolSample]) -> Result<()> {
    let elapsed = probes::elapsed_seconds(samples);
    for (column, axis) in probes::MEMPOOL_SERIES {
        let values = probes::mempool_series(samples, column);
        let points: Vec<(f64, f64)> = elapsed.iter().copied().zip(values.iter().copied()).collect();
        let scatter = Labels {
            title: axis,
            x: "Seconds since first sample",
            y: axis,
        };
        plots::draw_scatter(&output.join(format!("mempool_{}_scatter.png", column)), &scatter, &points, None)?;
        plots::draw_scatter_log_y(
            &output.join(format!("mempool_{}_scatter_log.png", column)),
            &scatter,
            &points,
        )?;

        if let Some(hist) = stats::Histogram::new(&values, stats::freedman_diaconis_bins(&values)) {
            let labels = Labels {
                title: axis,
                x: axis,
                y: "Samples",
            };
            let heights: Vec<f64> = hist.counts.iter().map(|c| *c as f64).collect();
            plots::draw_histogram(
                &output.join(format!("mempool_{}_hist.png", column)),
                &labels,
                &hist,
                &heights,
                None,
                &[],
            )?;
            plots::draw_histogram_log_y(&output.join(format!("mempool_{}_hist_log.png", column)), &labels, &hist)?;
        }
    }

    let mut report = FullAnalysisReport::new(AnalysisMetadata::now(&input.display().to_string()));
    report.mempool_analysis = Some(probes::mempool_report(samples));
    let (json, text) = report_paths(output, "mempool_report");
    analysis::generate_json_report(&report, &json)?;
    analysis::generate_text_report(&report, &text)?;
    analysis::report::print_summary(&report);
    Ok(())
}

fn print_data_summary(input: &Path, rows: &[PacketDelayRow]) {
    // Quick summary without full analysis
    println!("\n=== IBC PACKET DATA SUMMARY ===\n");
    println!("Input: {}", input.display());
    println!();
    println!("Packets: {}", rows.len());
    println!(
        "  Acknowledged: {}",
        rows.iter().filter(|r| r.ack_height.is_some()).count()
    );
    println!(
        "  Received: {}",
        rows.iter().filter(|r| r.recv_height.is_some()).count()
    );
    println!(
        "  With both timestamps: {}",
        rows.iter().filter(|r| r.send_time.is_some() && r.ack_time.is_some()).count()
    );
    println!(
        "  Failed acks: {}",
        rows.iter().filter(|r| r.ack_success == Some(false)).count()
    );
    println!();
    println!("Channels: {}", delay::available_channels(rows).len());
    for (channel, count) in delay::top_channels(rows, delay::TOP_CHANNELS) {
        println!("  {}: {} packets", channel, count);
    }
    println!();
}

//! Collection CLI: scans a chain over RPC and writes CSV, JSON and DOT outputs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;

use ibcscope::analysis::{self, plots, probes, AnalysisMetadata, FullAnalysisReport};
use ibcscope::config::{ChainPreset, Config, RetryConfig};
use ibcscope::config_loader::{self, CliOverrides};
use ibcscope::export::{self, csv_io::checkpoint_file_name};
use ibcscope::rpc::{ChainRpc, RpcClient};
use ibcscope::scan::{self, PacketScanner, ScanOptions};
use ibcscope::topology::{self, WeightedGraph};

/// IBC packet lifecycle scanner for Cosmos chains
#[derive(Parser, Debug)]
#[command(name = "ibcscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chain preset providing the default RPC endpoint
    #[arg(long, value_enum)]
    chain: Option<ChainPreset>,

    /// Tendermint RPC base URL; overrides the preset
    #[arg(long)]
    rpc_url: Option<String>,

    /// Give up on a request after this many attempts
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a height range for packet events and join sends with acks
    Scan {
        /// First height to scan
        #[arg(long)]
        start: Option<u64>,

        /// Last height to scan (default: latest height)
        #[arg(long)]
        end: Option<u64>,

        /// Write a checkpoint CSV every N blocks (0 disables)
        #[arg(long)]
        checkpoint_interval: Option<u64>,

        /// Directory for checkpoint CSVs
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Pause between blocks in milliseconds
        #[arg(long)]
        request_delay_ms: Option<u64>,
    },

    /// Fill missing send/ack/recv timestamps in an existing CSV
    FillTimes {
        /// CSV produced by `scan` or `delay-analyzer merge`
        input: PathBuf,

        /// Where to write the filled CSV (default: overwrite the input)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Sample block times and report production intervals
    BlockTimes {
        #[arg(long)]
        start: u64,

        /// Last height (default: latest height)
        #[arg(long)]
        end: Option<u64>,

        /// Pause between blocks in milliseconds
        #[arg(long, default_value = "100")]
        request_delay_ms: u64,
    },

    /// Poll the mempool size and append samples to a CSV
    Mempool {
        /// Seconds between samples
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Stop after this many samples (default: run until interrupted)
        #[arg(long)]
        samples: Option<u64>,

        /// CSV file to append to
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Export the peer graph of the queried node
    Peers {
        /// Minimum send+recv traffic in MB for a peer to become an edge
        #[arg(long)]
        min_traffic_mb: Option<f64>,
    },

    /// Collect commit signatures and build the validator co-signing graph
    Validators {
        /// Highest height to walk down from (default: latest height)
        #[arg(long)]
        start: Option<u64>,

        /// Number of blocks to walk
        #[arg(long, default_value = "100")]
        count: u64,

        /// Pause between blocks in milliseconds
        #[arg(long, default_value = "100")]
        request_delay_ms: u64,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = config_loader::load_or_default(cli.config.as_deref())?;
    config_loader::apply_overrides(
        &mut config,
        &CliOverrides {
            preset: cli.chain,
            rpc_url: cli.rpc_url.clone(),
            max_attempts: cli.max_attempts,
            log_level: cli.log_level.clone(),
        },
    )?;

    let log_level = config
        .general
        .log_level
        .clone()
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if let Some(path) = &cli.config {
        info!("Configuration file: {}", path.display());
    }

    let output = output_dir(&cli, &config);
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;
    let show_progress = !cli.no_progress;

    match cli.command {
        Commands::Scan {
            start,
            end,
            checkpoint_interval,
            checkpoint_dir,
            request_delay_ms,
        } => {
            let rpc = build_client(&config, &config.retry)?;
            let scan_config = config.scan.as_ref();
            let start = start
                .or(scan_config.map(|s| s.start_height))
                .ok_or_else(|| eyre!("no start height: pass --start or set scan.start_height"))?;
            let end = match end.or(scan_config.and_then(|s| s.end_height)) {
                Some(end) => end,
                None => rpc.latest_height().context("Failed to query the latest height")?,
            };
            if end < start {
                return Err(eyre!("end height {} is below start height {}", end, start));
            }

            let options = ScanOptions {
                start_height: start,
                end_height: end,
                checkpoint_interval: checkpoint_interval
                    .or(scan_config.map(|s| s.checkpoint_interval))
                    .unwrap_or(5000),
                checkpoint_dir: Some(
                    checkpoint_dir
                        .or(scan_config.map(|s| s.checkpoint_dir.clone()))
                        .unwrap_or_else(|| output.join("current")),
                ),
                request_delay: request_delay_ms
                    .map(Duration::from_millis)
                    .or(scan_config.map(|s| s.request_delay))
                    .unwrap_or(Duration::from_millis(100)),
                show_progress,
            };
            run_scan(&rpc, options, &output)?;
        }
        Commands::FillTimes { input, out } => {
            let retry = config.fill.retry_or_default(&config.retry);
            let rpc = build_client(&config, &retry)?;
            let mut rows = export::read_rows(&input)?;
            info!("Loaded {} rows from {}", rows.len(), input.display());

            let summary =
                scan::fill_missing_times(&rpc, &mut rows, config.fill.request_delay, show_progress);
            let out = out.unwrap_or(input);
            export::write_rows(&out, &rows)?;

            if !summary.heights_failed.is_empty() {
                warn!(
                    "{} heights could not be fetched: {:?}",
                    summary.heights_failed.len(),
                    summary.heights_failed
                );
            }
            println!(
                "Filled {} rows ({} of {} heights fetched) -> {}",
                summary.rows_updated,
                summary.heights_fetched,
                summary.heights_missing,
                out.display()
            );
        }
        Commands::BlockTimes {
            start,
            end,
            request_delay_ms,
        } => {
            let rpc = build_client(&config, &config.retry)?;
            let end = match end {
                Some(end) => end,
                None => rpc.latest_height().context("Failed to query the latest height")?,
            };
            let rows = scan::sample_block_times(
                &rpc,
                start,
                end,
                Duration::from_millis(request_delay_ms),
                show_progress,
            );
            let csv_path = output.join(format!("block_times_{}-{}.csv", start, end));
            export::write_records(&csv_path, &rows)?;
            info!("{} block times written to {}", rows.len(), csv_path.display());

            let mut report = FullAnalysisReport::new(AnalysisMetadata::now(&csv_path.display().to_string()));
            report.block_interval_analysis = Some(probes::block_interval_report(&rows));
            analysis::generate_json_report(&report, &output.join("block_interval_report.json"))?;
            analysis::generate_text_report(&report, &output.join("block_interval_report.txt"))?;

            match probes::block_interval_histogram(&rows) {
                Some(hist) => {
                    let heights: Vec<f64> = hist.counts.iter().map(|c| *c as f64).collect();
                    plots::draw_histogram(
                        &output.join("block_intervals.png"),
                        &plots::Labels {
                            title: "Block production intervals",
                            x: "Interval (s)",
                            y: "Blocks",
                        },
                        &hist,
                        &heights,
                        None,
                        &[],
                    )?;
                }
                None => warn!("No consecutive heights; skipping the interval histogram"),
            }
            analysis::report::print_summary(&report);
        }
        Commands::Mempool {
            interval_secs,
            samples,
            file,
        } => {
            let rpc = build_client(&config, &config.retry)?;
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.mempool.interval);
            let file = file.unwrap_or_else(|| output.join(&config.mempool.output));
            info!(
                "Polling {} every {:?}, appending to {}",
                rpc.base_url(),
                interval,
                file.display()
            );
            let written = scan::MempoolPoller::new(&rpc, &file, interval, samples).run()?;
            println!("{} samples written to {}", written, file.display());
        }
        Commands::Peers { min_traffic_mb } => {
            let rpc = build_client(&config, &config.retry)?;
            let min_traffic_mb = min_traffic_mb.unwrap_or(config.topology.min_traffic_mb);
            let net_info = rpc.net_info().context("Failed to query /net_info")?;
            let label = config.chain.label();
            let peers = topology::peer_topology(&label, &net_info, min_traffic_mb);

            let dot_path = output.join(format!("{}_peers.dot", label));
            fs::write(&dot_path, peers.graph.to_dot("peers", &format!("{} peer topology", label)))
                .with_context(|| format!("Failed to write {}", dot_path.display()))?;
            write_json(&output.join(format!("{}_peers.json", label)), &peers)?;
            export::write_records(&output.join(format!("{}_peers.csv", label)), &peers.peers)?;
            write_network(&output, &format!("{}_peer", label), "Peer topology", &peers.graph)?;

            println!(
                "{} peers, {} edges above {} MB -> {}",
                peers.n_peers,
                peers.graph.edge_count(),
                min_traffic_mb,
                dot_path.display()
            );
        }
        Commands::Validators {
            start,
            count,
            request_delay_ms,
        } => {
            let rpc = build_client(&config, &config.retry)?;
            let start = match start {
                Some(start) => start,
                None => rpc.latest_height().context("Failed to query the latest height")?,
            };
            let (signatures, summary) = topology::collect_signatures(
                &rpc,
                start,
                count,
                Duration::from_millis(request_delay_ms),
            );
            let label = config.chain.label();
            export::write_records(
                &output.join(format!("{}_validator_signatures_{}.csv", label, start)),
                &signatures,
            )?;
            let graph = topology::cosigning_graph(&signatures);
            let dot_path = output.join(format!("{}_validator_cosigning.dot", label));
            fs::write(
                &dot_path,
                graph.to_dot("cosigning", &format!("{} validator co-signing", label)),
            )
            .with_context(|| format!("Failed to write {}", dot_path.display()))?;
            write_json(&output.join(format!("{}_validator_summary.json", label)), &summary)?;
            write_network(&output, &format!("{}_validator", label), "Validator network", &graph)?;

            println!(
                "{} signatures from {} validators over {} blocks ({} skipped) -> {}",
                summary.signatures,
                summary.validators,
                summary.blocks_requested,
                summary.blocks_skipped,
                dot_path.display()
            );
        }
    }

    Ok(())
}

fn output_dir(cli: &Cli, config: &Config) -> PathBuf {
    cli.output
        .clone()
        .or_else(|| config.scan.as_ref().map(|s| s.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn build_client(config: &Config, retry: &RetryConfig) -> Result<RpcClient> {
    let url = config
        .rpc_url()
        .ok_or_else(|| eyre!("no RPC endpoint: pass --chain or --rpc-url, or set chain in the config"))?;
    info!("Using RPC endpoint {}", url);
    RpcClient::new(&url, retry.timeout, retry.policy())
        .with_context(|| format!("Failed to create RPC client for {}", url))
}

fn run_scan<R: ChainRpc>(rpc: &R, options: ScanOptions, output: &Path) -> Result<()> {
    let (start, end) = (options.start_height, options.end_height);
    let mut scanner = PacketScanner::new(rpc, options);
    let summary = scanner.run()?;

    let csv_path = output.join(checkpoint_file_name(start, end));
    let rows = scanner.rows();
    export::write_rows(&csv_path, &rows)?;
    write_json(&output.join(format!("scan_summary_{}-{}.json", start, end)), &summary)?;

    if summary.blocks_skipped > 0 {
        warn!("{} blocks could not be fetched", summary.blocks_skipped);
    }
    if summary.missing_times > 0 {
        warn!(
            "{} heights lack a timestamp; run `ibcscope fill-times {}`",
            summary.missing_times,
            csv_path.display()
        );
    }
    println!(
        "Scanned {} blocks: {} sends, {} acks, {} matched -> {}",
        summary.blocks_scanned,
        summary.sends,
        summary.acks,
        summary.matched,
        csv_path.display()
    );
    Ok(())
}

/// `{stem}_positions.csv` and `{stem}_network.png` from a circular layout
fn write_network(output: &Path, stem: &str, title: &str, graph: &WeightedGraph) -> Result<()> {
    if graph.node_count() == 0 {
        warn!("{} graph is empty; skipping positions and image", stem);
        return Ok(());
    }
    let positions = graph.circular_layout();
    export::write_positions(&output.join(format!("{}_positions.csv", stem)), &positions)?;
    plots::draw_network(
        &output.join(format!("{}_network.png", stem)),
        title,
        graph,
        &positions,
    )?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

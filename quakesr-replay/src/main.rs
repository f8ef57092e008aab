// QUAK/ESR Replay - Offline feed driver
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # QUAK/ESR Replay
//!
//! Drives the feed core from a recorded JSON-lines session or from a
//! simulated one, and reports the final averaged spectra.
//!
//! ## Usage
//!
//! ```bash
//! # Replay a recording ten times faster than it was taken
//! quakesr-replay --input session.jsonl --speed 10
//!
//! # Simulate 20 scans and keep the script
//! quakesr-replay --simulate 20 --save-script session.jsonl --sigma
//! ```

mod replay;
mod report;

use clap::Parser;
use quakesr::{ConnectionConfig, DiffDisplay, FeedConfig, ScanFeed};
use quakesr_testdata::{
    read_jsonl, write_jsonl, ScanConfig, ScanGenerator, ScriptedMessage, SessionScript,
};
use replay::{ReplayConfig, ReplayEngine, ReplayError};
use report::FeedReport;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// QUAK/ESR session replay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines session to replay
    #[arg(short, long, conflicts_with = "simulate")]
    input: Option<PathBuf>,

    /// Simulate a session with this many scans
    #[arg(long)]
    simulate: Option<usize>,

    /// Points per simulated scan
    #[arg(long, default_value = "64")]
    points: usize,

    /// Iterations per point in simulated scans
    #[arg(long, default_value = "4")]
    iterations: usize,

    /// Seed for simulated noise
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between simulated messages in milliseconds
    #[arg(long, default_value = "100")]
    delay_ms: u64,

    /// Write the simulated script to this file
    #[arg(long)]
    save_script: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = recorded pace)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Base topic (overrides the connection file)
    #[arg(short, long)]
    base_topic: Option<String>,

    /// Connection file (default: ~/.config/quakesrdisplay/connection.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start with running averages disabled
    #[arg(long)]
    no_running_average: bool,

    /// Report the difference in sigma units
    #[arg(long)]
    sigma: bool,

    /// Consumer polling period in milliseconds
    #[arg(long, default_value = "250")]
    poll_ms: u64,

    /// Write the final report as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("QUAK/ESR Replay v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ReplayError> {
    let feed_config = feed_config(&args)?;
    let base = feed_config.base();
    let script = load_script(&args, &base)?;

    let feed = ScanFeed::new(feed_config)?;
    let engine = ReplayEngine::new(
        ReplayConfig {
            speed: args.speed,
            poll_interval_ms: args.poll_ms,
            ..Default::default()
        },
        feed,
    )?;

    let summary = engine.run(script).await?;
    let report = FeedReport::collect(&engine.handle(), &summary);

    match args.output {
        Some(path) => {
            report.write(&path)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", report.to_json()?),
    }

    Ok(())
}

fn feed_config(args: &Args) -> Result<FeedConfig, ReplayError> {
    let connection = match &args.config {
        Some(path) => ConnectionConfig::load(path)?,
        None => ConnectionConfig::load_default()?,
    };

    let mut config = match &args.base_topic {
        Some(base) => FeedConfig::new(base),
        None => connection.feed_config(),
    };
    config.running_average = !args.no_running_average;
    if args.sigma {
        config.diff_display = DiffDisplay::Sigma;
    }

    info!("Subscription filter: {}", config.subscription_filter());
    Ok(config)
}

fn load_script(args: &Args, base: &str) -> Result<Vec<ScriptedMessage>, ReplayError> {
    if let Some(path) = &args.input {
        let script = read_jsonl(path)?;
        info!("Loaded {} messages from {}", script.len(), path.display());
        return Ok(script);
    }

    let scans = args.simulate.unwrap_or(10);
    let mut scan_config = ScanConfig::new()
        .with_points(args.points)
        .with_iterations(args.iterations);
    if let Some(seed) = args.seed {
        scan_config = scan_config.with_seed(seed);
    }

    let mut generator = ScanGenerator::new(scan_config)?;
    let script = SessionScript::new()
        .with_scans(scans)
        .with_delay_ms(args.delay_ms)
        .build(base, &mut generator);
    info!("Simulated {} scans ({} messages)", scans, script.len());

    if let Some(path) = &args.save_script {
        write_jsonl(path, &script)?;
        info!("Script written to {}", path.display());
    }

    Ok(script)
}

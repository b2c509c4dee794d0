//! Halostat - server browser statistics for Halo CE / PC
//!
//! Runs one refresh round: master server lists, UDP status sweep, summary.

mod collector;
mod config;
mod master;
mod output;
mod round;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "halostat")]
#[command(version)]
#[command(about = "Collect server and player counts from the Halo master servers", long_about = None)]
struct Args {
    /// Configuration file path (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Game variant to query: ce, pc (repeatable, default: all configured)
    #[arg(short, long = "variant")]
    variants: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Override the collector quiet period in milliseconds
    #[arg(long)]
    quiet_period_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let config = config::Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => config::Config::default(),
    };

    if let Some(quiet) = args.quiet_period_ms {
        if quiet == 0 {
            anyhow::bail!("--quiet-period-ms must be greater than zero");
        }
        config.collector.quiet_period_ms = quiet;
    }

    let codes = if args.variants.is_empty() {
        config.games.iter().map(|g| g.code.clone()).collect()
    } else {
        args.variants.clone()
    };

    info!(
        "Querying {}:{} for {}",
        config.master.host,
        config.master.port,
        codes.join(", ")
    );

    let report = round::run_round(&config, &codes).await;
    if report.is_empty() {
        warn!("No servers answered; nothing to update");
    }

    output::print_report(&report, args.json)?;
    Ok(())
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sjt_sync::TrackerOptions;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sjt-cli")]
#[command(about = "Study Jams progress tracker command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sweep every roster profile and update the data file.
    Run(RunArgs),
    /// Serve the refresh trigger endpoints.
    Serve,
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Roster file to read.
    #[arg(short, long, default_value = "main/data.json")]
    input: PathBuf,
    /// Roster file to write.
    #[arg(short, long, default_value = "main/data.json")]
    output: PathBuf,
    /// Concurrent fetch limit.
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,
    /// Seconds to pause after each fetch.
    #[arg(short, long, default_value_t = 1.0, value_parser = delay_seconds)]
    delay: f64,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 15)]
    timeout: u64,
    /// Sequential retry rounds for failed fetches.
    #[arg(short, long, default_value_t = 1)]
    retries: u32,
    /// Reconcile in memory without writing the roster.
    #[arg(long)]
    dry_run: bool,
    /// Process at most this many records (0 means all).
    #[arg(long, default_value_t = 0)]
    max: usize,
}

/// `Duration::from_secs_f64` panics on negative or non-finite input.
fn delay_seconds(raw: &str) -> Result<f64, String> {
    let seconds = raw.parse::<f64>().map_err(|err| err.to_string())?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err("expected a non-negative number of seconds".into())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sjt_storage=info".parse()?)
                .add_directive("sjt_sync=info".parse()?)
                .add_directive("sjt_web=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::parse_from(["sjt-cli"])))
    {
        Commands::Run(args) => {
            let options = TrackerOptions {
                input: args.input,
                output: args.output,
                concurrency: args.concurrency,
                delay: Duration::from_secs_f64(args.delay),
                timeout: Duration::from_secs(args.timeout),
                retry_rounds: args.retries,
                dry_run: args.dry_run,
                max_records: args.max,
            };
            let summary = sjt_sync::run_tracker(options).await?;
            println!(
                "sweep complete: run_id={} processed={} updated={} errors={} still_failing={}",
                summary.run_id,
                summary.processed,
                summary.updated,
                summary.errors,
                summary.still_failing.len()
            );
        }
        Commands::Serve => {
            sjt_web::serve_from_env().await?;
        }
    }

    Ok(())
}

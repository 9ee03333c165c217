//! dispatchq CLI: run one batch cycle, plus operator commands for the tables.

use clap::{Parser, Subcommand};
use dispatchq::config::Config;
use dispatchq::config::secrets::ExposeSecret;
use dispatchq::db::Db;
use dispatchq::engine::BatchCoordinator;
use dispatchq::model::work::CycleSummary;
use dispatchq::processor::HttpProcessor;
use dispatchq::telemetry::{TelemetryConfig, init_telemetry};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dispatchq", about = "Claim pending URLs, process them, write results back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one claim → dispatch → commit cycle and exit
    Run {
        /// Maximum items claimed this cycle (overrides BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum concurrent processor calls (overrides MAX_CONCURRENT)
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// Per-call processor timeout in seconds (overrides PROCESSOR_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the cycle summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Create the schema and both tables if missing
    Init,
    /// Insert URLs as PENDING work items
    Seed {
        /// URLs to enqueue
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Reset every PROCESSING item to PENDING (only when no cycle is running)
    Requeue,
    /// Show per-status row counts for both tables
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "dispatchq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret(), config.store.clone()).await?;

    match cli.command {
        Command::Run {
            batch_size,
            max_concurrent,
            timeout_secs,
            json,
        } => {
            if let Some(n) = batch_size {
                config.batch.batch_size = at_least_one("--batch-size", n)?;
            }
            if let Some(n) = max_concurrent {
                config.batch.max_concurrent = at_least_one("--max-concurrent", n)?;
            }
            if let Some(secs) = timeout_secs {
                config.batch.call_timeout =
                    Duration::from_secs(at_least_one("--timeout-secs", secs as usize)? as u64);
            }
            cmd_run(db, &config, json).await
        }
        Command::Init => {
            db.ensure_tables().await?;
            println!(
                "Ready: {} and {}",
                config.store.source(),
                config.store.target()
            );
            Ok(())
        }
        Command::Seed { urls } => {
            let items = db.seed(&urls).await?;
            for item in &items {
                println!("{}  {}", item.id, item.url);
            }
            println!("\n{} item(s) queued", items.len());
            Ok(())
        }
        Command::Requeue => {
            let reset = db.requeue_processing().await?;
            println!("Requeued {reset} item(s)");
            Ok(())
        }
        Command::Status => cmd_status(&db).await,
    }
}

fn at_least_one(flag: &str, n: usize) -> anyhow::Result<usize> {
    if n == 0 {
        anyhow::bail!("{flag} must be at least 1");
    }
    Ok(n)
}

async fn cmd_run(db: Db, config: &Config, json: bool) -> anyhow::Result<()> {
    let processor = HttpProcessor::new(&config.processor)?;
    let coordinator =
        BatchCoordinator::new(Arc::new(db), Arc::new(processor), config.batch.clone());

    let summary = coordinator.run_cycle().await?;
    print_summary(&summary, json)?;
    Ok(())
}

fn print_summary(summary: &CycleSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Run:        {}", summary.run_id);
    println!("Claimed:    {}", summary.claimed);
    println!("Completed:  {}", summary.completed);
    println!("Failed:     {}", summary.failed);
    println!("Duration:   {}ms", summary.duration_ms());
    Ok(())
}

async fn cmd_status(db: &Db) -> anyhow::Result<()> {
    let source = db.source_counts().await?;
    let target = db.target_counts().await?;

    println!("{}", db.location().source());
    for status in ["PENDING", "PROCESSING", "DONE"] {
        println!("  {:<18} {}", status, source.get(status));
    }
    println!("  {:<18} {}", "total", source.total());

    println!("{}", db.location().target());
    for status in ["COMPLETED", "FAILED_PROCESSING"] {
        println!("  {:<18} {}", status, target.get(status));
    }
    println!("  {:<18} {}", "total", target.total());
    Ok(())
}

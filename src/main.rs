use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod analytics;
mod args;
mod auth;
mod cfg;
mod cms;
mod csv_sink;
mod error;
mod job;
mod sheets;
mod transform;

use args::Args;
use cfg::Cfg;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting pageview_report");

    match run(args).await {
        Ok(()) => {
            info!("pageview_report completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Job failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = Cfg::load(args).context("failed to load configuration")?;

    let clients = auth::connect(&cfg)
        .await
        .context("failed to initialize API clients")?;

    let summary = job::run_job(&cfg, &clients.cms, &clients.analytics, &clients.sheets).await?;
    info!(
        "Run finished: {} blog rows, {} author rows",
        summary.blog_rows, summary.author_rows
    );
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

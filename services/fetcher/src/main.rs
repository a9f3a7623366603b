//! Sentinel-2 link fetcher: polling-mode catalog discovery plus the push
//! subscription endpoint, bundled in one process.

mod admission;
mod config;
mod poll;
mod server;

use anyhow::Result;
use catalog_client::CatalogClient;
use clap::Parser;
use pipeline_common::{DateGenParams, TileAllowlist};
use std::sync::Arc;
use std::time::Duration;
use storage::{Catalog, DownloadQueue};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Args;
use poll::PollScheduler;
use server::{start_server, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting Sentinel-2 link fetcher");

    let catalog = Arc::new(Catalog::connect(&args.database_url).await?);
    catalog.migrate().await?;

    let queue = Arc::new(DownloadQueue::connect(&args.redis_url).await?);
    let client = Arc::new(CatalogClient::new(&args.catalog_url)?);
    let allowlist = Arc::new(TileAllowlist::load(&args.accepted_tile_ids_filename)?);

    let scheduler = Arc::new(PollScheduler {
        catalog: catalog.clone(),
        queue: queue.clone(),
        client,
        allowlist: allowlist.clone(),
        page_size: args.page_size,
    });

    let state = Arc::new(ServerState {
        catalog: catalog.clone(),
        queue: queue.clone(),
        allowlist: allowlist.clone(),
        subscription_username: args.subscription_username.clone(),
        subscription_password: args.subscription_password.clone(),
        subscription_recency_days: args.subscription_recency_days,
    });

    if args.once {
        run_poll_sweep(&scheduler, &args).await?;
        return Ok(());
    }

    if !args.poll_disabled {
        let poll_scheduler = scheduler.clone();
        let poll_args = args.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = run_poll_sweep(&poll_scheduler, &poll_args).await {
                    tracing::error!(error = %e, "poll sweep failed");
                }
                tokio::time::sleep(Duration::from_secs(poll_args.poll_interval_secs)).await;
            }
        });
    }

    info!(port = args.port, "starting HTTP server");
    start_server(state, args.port).await?;

    Ok(())
}

/// Run one full sweep of the date generator's work items.
async fn run_poll_sweep(scheduler: &PollScheduler, args: &Args) -> Result<()> {
    let items = pipeline_common::generate_work_items(&DateGenParams {
        lookback_days: args.lookback_days,
        ..Default::default()
    });

    let results = scheduler.sweep(items, args.concurrent_dates).await;

    let outstanding = results.iter().filter(|r| !r.completed).count();
    info!(
        swept = results.len(),
        outstanding,
        "poll sweep complete"
    );

    Ok(())
}

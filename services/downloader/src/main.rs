//! Sentinel-2 download worker: a bounded-concurrency pool draining the
//! "to-download" queue and archiving granules to the object store.

mod config;
mod pool;
mod server;
mod worker;

use anyhow::Result;
use catalog_client::CatalogClient;
use clap::Parser;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use storage::{Catalog, DownloadQueue, ObjectStorage, ObjectStorageConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Args;
use pool::PoolStats;
use server::{start_server, ServerState};
use worker::Worker;

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

    info!("starting Sentinel-2 download worker");

    if !args.enable_downloading {
        info!("ENABLE_DOWNLOADING=false, worker will idle without claiming messages");
    }

    let catalog = Arc::new(Catalog::connect(&args.database_url).await?);
    catalog.migrate().await?;

    let queue = Arc::new(DownloadQueue::connect(&args.redis_url).await?);

    let storage_config = ObjectStorageConfig {
        endpoint: args.s3_endpoint.clone(),
        bucket: args.upload_bucket.clone(),
        access_key_id: args.s3_access_key.clone(),
        secret_access_key: args.s3_secret_key.clone(),
        region: args.s3_region.clone(),
        allow_http: args.s3_allow_http,
    };
    let objects = Arc::new(ObjectStorage::new(&storage_config)?);
    let catalog_client = Arc::new(CatalogClient::new(&args.catalog_url)?);
    let http = Client::builder().timeout(Duration::from_secs(900)).build()?;

    let config = Arc::new(args.clone());
    let worker = Arc::new(Worker {
        catalog: catalog.clone(),
        queue: queue.clone(),
        objects,
        catalog_client,
        http,
        config: config.clone(),
    });

    let stats = Arc::new(PoolStats::default());

    if args.once {
        if args.enable_downloading {
            pool::run_once(&worker, &queue, "downloader-once", args.max_concurrent, &stats).await;
        }
        return Ok(());
    }

    if args.enable_downloading {
        let worker = worker.clone();
        let queue = queue.clone();
        let stats = stats.clone();
        let max_concurrent = args.max_concurrent;
        tokio::spawn(async move {
            let consumer_name = format!("downloader-{}", std::process::id());
            loop {
                pool::run_once(&worker, &queue, &consumer_name, max_concurrent, &stats).await;
            }
        });
    }

    let state = Arc::new(ServerState { stats });
    info!(port = args.port, "starting HTTP server");
    start_server(state, args.port).await?;

    Ok(())
}

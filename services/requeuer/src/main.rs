//! Backfill requeuer: for a given ingestion date, re-admit undownloaded
//! granules to the "to-download" queue, or report them under `--dry-run`.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use pipeline_common::DownloadMessage;
use serde::Serialize;
use storage::{Catalog, DownloadQueue};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// `{ dry_run: bool (required), date: YYYY-MM-DD }` (§4.4).
///
/// `dry_run` has no default: `required = true` with `ArgAction::Set` forces
/// `--dry-run true` or `--dry-run false` on every invocation, so omission is
/// a clap usage error rather than silently taking the destructive branch.
#[derive(Parser, Debug)]
#[command(name = "requeuer")]
#[command(about = "Re-admit undownloaded Sentinel-2 granules for an ingestion date")]
struct Args {
    /// Required; omitting this flag is a usage error, not a default.
    #[arg(long, action = ArgAction::Set, required = true)]
    dry_run: bool,

    /// Ingestion date to requeue, `YYYY-MM-DD`.
    #[arg(long)]
    date: NaiveDate,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "REDIS_URL")]
    redis_url: String,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize)]
struct RequeuerResponse {
    dry_run: bool,
    date: String,
    granules: Vec<GranuleSummary>,
}

#[derive(Debug, Serialize)]
struct GranuleSummary {
    id: String,
    filename: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).json().finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let catalog = Catalog::connect(&args.database_url).await?;
    let granules = catalog.find_undownloaded_for_date(args.date).await?;

    info!(
        date = %args.date,
        count = granules.len(),
        dry_run = args.dry_run,
        "found undownloaded granules"
    );

    if !args.dry_run {
        let mut queue = DownloadQueue::connect(&args.redis_url).await?;
        for granule in &granules {
            let message = DownloadMessage {
                id: granule.id.clone(),
                download_url: granule.download_url.clone(),
            };
            queue.publish(&message).await?;
        }
        info!(count = granules.len(), "republished granules to the download queue");
    }

    let response = RequeuerResponse {
        dry_run: args.dry_run,
        date: args.date.format("%Y-%m-%d").to_string(),
        granules: granules
            .into_iter()
            .map(|g| GranuleSummary {
                id: g.id,
                filename: g.filename,
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_with_date_and_granules() {
        let response = RequeuerResponse {
            dry_run: true,
            date: "2023-06-10".to_string(),
            granules: vec![GranuleSummary {
                id: "abc".to_string(),
                filename: "S2A_MSIL1C_x.zip".to_string(),
            }],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"dry_run\":true"));
        assert!(json.contains("S2A_MSIL1C_x.zip"));
    }
}

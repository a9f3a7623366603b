//! Date generator: emits the ordered `(date, platform)` work items that
//! drive discovery (§4.1), as JSON lines on stdout for the orchestrator to
//! consume. Pure function of its CLI inputs; does no I/O beyond printing.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use pipeline_common::{generate_work_items, DateGenParams, Platform};
use serde::Serialize;
use std::io::Write;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// `{ now, lookback_days, platforms }`, all optional (§4.1).
#[derive(Parser, Debug)]
#[command(name = "date-generator")]
#[command(about = "Emit (date, platform) discovery work items")]
struct Args {
    /// Reference date (UTC), `YYYY-MM-DD`. Defaults to today.
    #[arg(long)]
    now: Option<NaiveDate>,

    /// How many days back from `now` to cover.
    #[arg(long, default_value = "5")]
    lookback_days: u32,

    /// Platform codes to cross with the date range, comma-separated
    /// (e.g. `S2A,S2B`). Defaults to all three.
    #[arg(long, value_delimiter = ',')]
    platforms: Vec<String>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize)]
struct WorkItemLine {
    date: String,
    platform: String,
}

fn main() -> Result<()> {
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

    let mut params = DateGenParams {
        lookback_days: args.lookback_days,
        ..Default::default()
    };
    if let Some(now) = args.now {
        params.now = now;
    }
    if !args.platforms.is_empty() {
        params.platforms = args
            .platforms
            .iter()
            .map(|p| p.parse::<Platform>())
            .collect::<Result<Vec<_>, _>>()?;
    }

    let items = generate_work_items(&params);
    info!(count = items.len(), "generated discovery work items");

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for item in &items {
        let line = WorkItemLine {
            date: item.date_str(),
            platform: item.platform.to_string(),
        };
        serde_json::to_writer(&mut handle, &line)?;
        writeln!(handle)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_line_serializes_as_expected() {
        let line = WorkItemLine {
            date: "2025-01-27".to_string(),
            platform: "S2B".to_string(),
        };
        let json = serde_json::to_string(&line).unwrap();
        assert_eq!(json, r#"{"date":"2025-01-27","platform":"S2B"}"#);
    }
}

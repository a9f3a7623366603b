//! Environment-backed configuration for the fetcher service.

use clap::Parser;

/// CLI/env configuration for the fetcher (poll + push).
#[derive(Parser, Debug, Clone)]
#[command(name = "fetcher")]
#[command(about = "Sentinel-2 granule link fetcher (poll + push)")]
pub struct Args {
    /// HTTP server port (status/health/metrics, push subscription endpoint)
    #[arg(long, env = "PORT", default_value = "8082")]
    pub port: u16,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string (to-download queue).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    /// CDSE OData service root, e.g. `https://catalogue.dataspace.copernicus.eu/odata/v1`.
    #[arg(long, env = "CDSE_CATALOG_URL")]
    pub catalog_url: String,

    /// Path to the MGRS tile allowlist (newline-delimited 5-char codes).
    #[arg(long, env = "ACCEPTED_TILE_IDS_FILENAME")]
    pub accepted_tile_ids_filename: String,

    /// Push subscription basic-auth username.
    #[arg(long, env = "SUBSCRIPTION_USERNAME")]
    pub subscription_username: String,

    /// Push subscription basic-auth password.
    #[arg(long, env = "SUBSCRIPTION_PASSWORD")]
    pub subscription_password: String,

    /// Reject push events whose `beginposition` is older than this many days.
    #[arg(long, env = "SUBSCRIPTION_RECENCY_DAYS", default_value = "30")]
    pub subscription_recency_days: i64,

    /// Page size for catalog queries.
    #[arg(long, env = "FETCHER_PAGE_SIZE", default_value = "100")]
    pub page_size: u32,

    /// Lookback window (days) fed to the date generator.
    #[arg(long, env = "FETCHER_LOOKBACK_DAYS", default_value = "5")]
    pub lookback_days: u32,

    /// Maximum number of (date, platform) pairs polled concurrently.
    #[arg(long, env = "FETCHER_CONCURRENT_DATES", default_value = "3")]
    pub concurrent_dates: usize,

    /// Seconds between poll sweeps once all (date, platform) pairs report `completed: true`.
    #[arg(long, env = "FETCHER_POLL_INTERVAL_SECS", default_value = "60")]
    pub poll_interval_secs: u64,

    /// Run a single poll sweep and exit instead of serving forever.
    #[arg(long)]
    pub once: bool,

    /// Disable the poll loop entirely; serve only the push endpoint.
    #[arg(long, env = "FETCHER_POLL_DISABLED")]
    pub poll_disabled: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

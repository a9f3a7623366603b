//! Environment-backed configuration for the download worker.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "downloader")]
#[command(about = "Sentinel-2 granule download worker")]
pub struct Args {
    /// HTTP server port (status/health/metrics).
    #[arg(long, env = "PORT", default_value = "8081")]
    pub port: u16,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string (to-download queue).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    /// CDSE OData service root, used for the checksum-drift lookup.
    #[arg(long, env = "CDSE_CATALOG_URL")]
    pub catalog_url: String,

    /// Object store endpoint (S3/MinIO).
    #[arg(long, env = "S3_ENDPOINT", default_value = "http://minio:9000")]
    pub s3_endpoint: String,

    /// Upload bucket name.
    #[arg(long, env = "UPLOAD_BUCKET")]
    pub upload_bucket: String,

    #[arg(long, env = "S3_ACCESS_KEY", default_value = "minioadmin")]
    pub s3_access_key: String,

    #[arg(long, env = "S3_SECRET_KEY", default_value = "minioadmin")]
    pub s3_secret_key: String,

    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    #[arg(long, env = "S3_ALLOW_HTTP", default_value = "true")]
    pub s3_allow_http: bool,

    /// Maximum simultaneous downloads (§4.3, "Concurrency bound").
    #[arg(long, env = "MAX_CONCURRENT_DOWNLOADS", default_value = "15")]
    pub max_concurrent: usize,

    /// Retry cap before a granule is abandoned.
    #[arg(long, env = "MAX_DOWNLOAD_RETRIES", default_value = "10")]
    pub max_download_retries: i32,

    /// Route downloads through IntHub2 instead of the default SciHub host.
    #[arg(long, env = "USE_INTHUB2", default_value = "false")]
    pub use_inthub2: bool,

    /// IntHub2 host to substitute into `download_url` when `use_inthub2` is set.
    #[arg(long, env = "INTHUB2_HOST", default_value = "inthub2.copernicus.eu")]
    pub inthub2_host: String,

    /// Master switch; when false the worker claims nothing (useful for draining).
    #[arg(long, env = "ENABLE_DOWNLOADING", default_value = "true")]
    pub enable_downloading: bool,

    /// SciHub (default) basic-auth username.
    #[arg(long, env = "SCIHUB_USERNAME")]
    pub scihub_username: String,

    /// SciHub (default) basic-auth password.
    #[arg(long, env = "SCIHUB_PASSWORD")]
    pub scihub_password: String,

    /// IntHub2 basic-auth username.
    #[arg(long, env = "INTHUB2_USERNAME", default_value = "")]
    pub inthub2_username: String,

    /// IntHub2 basic-auth password.
    #[arg(long, env = "INTHUB2_PASSWORD", default_value = "")]
    pub inthub2_password: String,

    /// Run a single drain-the-queue pass and exit instead of serving forever.
    #[arg(long)]
    pub once: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

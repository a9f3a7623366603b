//! Common types and utilities shared across the granule pipeline services.

pub mod allowlist;
pub mod dategen;
pub mod error;
pub mod model;

pub use allowlist::TileAllowlist;
pub use dategen::{generate as generate_work_items, DateGenParams, Platform, WorkItem};
pub use error::{PipelineError, PipelineResult};
pub use model::{
    DownloadMessage, Granule, GranuleCount, GranuleStatus, NewGranule, StatusEntry,
    DEFAULT_LEASE_SECONDS, DEFAULT_MAX_RETRIES, DEFAULT_SUBSCRIPTION_RECENCY_DAYS,
};

//! Shared domain types for the granule pipeline: the `granule`,
//! `granule_count`, and `status` entities named across all four services.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default cap on `download_retries` before a granule is abandoned.
pub const DEFAULT_MAX_RETRIES: i32 = 10;

/// Default recency window (days) for the push subscription handler.
pub const DEFAULT_SUBSCRIPTION_RECENCY_DAYS: i64 = 30;

/// Default download-worker lease duration, matching the queue's default
/// visibility timeout.
pub const DEFAULT_LEASE_SECONDS: i64 = 900;

/// The tagged state of a granule row. Stored alongside the boolean triple
/// (`downloaded`, `in_progress`, `expired`) named in the data model so both
/// representations stay queryable; every transition updates both together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GranuleStatus {
    Pending,
    InProgress,
    Done,
    Abandoned,
    Expired,
}

impl GranuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GranuleStatus::Pending => "pending",
            GranuleStatus::InProgress => "in_progress",
            GranuleStatus::Done => "done",
            GranuleStatus::Abandoned => "abandoned",
            GranuleStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for GranuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GranuleStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GranuleStatus::Pending),
            "in_progress" => Ok(GranuleStatus::InProgress),
            "done" => Ok(GranuleStatus::Done),
            "abandoned" => Ok(GranuleStatus::Abandoned),
            "expired" => Ok(GranuleStatus::Expired),
            other => Err(crate::error::PipelineError::Internal(format!(
                "unknown granule status: {other}"
            ))),
        }
    }
}

/// One Sentinel-2 product, as recorded in the `granule` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Granule {
    pub id: String,
    pub filename: String,
    pub tileid: String,
    pub size: i64,
    pub checksum: String,
    pub beginposition: DateTime<Utc>,
    pub endposition: DateTime<Utc>,
    pub ingestiondate: NaiveDate,
    pub download_url: String,
    pub downloaded: bool,
    pub in_progress: bool,
    pub uploaded_granule_file_location: Option<String>,
    pub download_started: Option<DateTime<Utc>>,
    pub download_finished: Option<DateTime<Utc>>,
    pub download_retries: i32,
    pub expired: bool,
    pub status: GranuleStatus,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// The subset of fields needed to admit a new granule, as produced by
/// either the catalog page parser or the push subscription handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGranule {
    pub id: String,
    pub filename: String,
    pub tileid: String,
    pub size: i64,
    pub checksum: String,
    pub beginposition: DateTime<Utc>,
    pub endposition: DateTime<Utc>,
    pub ingestiondate: NaiveDate,
    pub download_url: String,
}

/// The opaque "to-download" queue message: `{id, download_url}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadMessage {
    pub id: String,
    pub download_url: String,
}

impl From<&NewGranule> for DownloadMessage {
    fn from(g: &NewGranule) -> Self {
        DownloadMessage {
            id: g.id.clone(),
            download_url: g.download_url.clone(),
        }
    }
}

/// Per-(date, platform) discovery progress, tracked in `granule_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranuleCount {
    pub date: NaiveDate,
    pub platform: crate::dategen::Platform,
    pub available_links: i64,
    pub fetched_links: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A single persisted key/value entry in the generic `status` table, used
/// by the fetcher to durably track its per-(date, platform) page cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub key: String,
    pub value: String,
}

impl StatusEntry {
    /// Canonical key for the fetcher's page cursor, scoped to a single
    /// (date, platform) pair.
    pub fn cursor_key(date: NaiveDate, platform: crate::dategen::Platform) -> String {
        format!("cursor:{}:{}", date.format("%Y-%m-%d"), platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            GranuleStatus::Pending,
            GranuleStatus::InProgress,
            GranuleStatus::Done,
            GranuleStatus::Abandoned,
            GranuleStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<GranuleStatus>().unwrap(), s);
        }
    }

    #[test]
    fn cursor_key_is_stable() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
        assert_eq!(
            StatusEntry::cursor_key(date, crate::dategen::Platform::S2B),
            "cursor:2025-01-27:S2B"
        );
    }
}

//! Polling-mode link fetcher (§4.2.1).

use catalog_client::CatalogClient;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use pipeline_common::{Platform, PipelineResult, StatusEntry, TileAllowlist, WorkItem};
use std::sync::Arc;
use storage::{Catalog, DownloadQueue};
use tracing::{info, warn};

use crate::admission::admit;

/// Result of polling a single `(date, platform)` pair once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub date: NaiveDate,
    pub platform: Platform,
    pub completed: bool,
    pub admitted: usize,
}

/// Shared dependencies for the poll scheduler.
pub struct PollScheduler {
    pub catalog: Arc<Catalog>,
    pub queue: Arc<DownloadQueue>,
    pub client: Arc<CatalogClient>,
    pub allowlist: Arc<TileAllowlist>,
    pub page_size: u32,
}

impl PollScheduler {
    /// Run one page of discovery for `(date, platform)` (§4.2.1 steps 1-9).
    pub async fn poll_once(&self, date: NaiveDate, platform: Platform) -> PipelineResult<PollResult> {
        let cursor_key = StatusEntry::cursor_key(date, platform);
        let cursor: u32 = self
            .catalog
            .get_status(&cursor_key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let count = self.catalog.get_granule_count(date, platform).await?;

        let page = self
            .client
            .search_page(date, platform, cursor, Some(self.page_size))
            .await?;

        let available_links = count.available_links.max(page.total);

        if page.granules.is_empty() {
            self.catalog
                .upsert_granule_count(date, platform, available_links, count.fetched_links)
                .await?;
            info!(%date, %platform, "page empty, discovery complete");
            return Ok(PollResult {
                date,
                platform,
                completed: true,
                admitted: 0,
            });
        }

        let page_links = page.granules.len() as i64;

        let accepted: Vec<_> = page
            .granules
            .into_iter()
            .filter(|g| self.allowlist.accepts(&g.tileid))
            .collect();

        let mut admitted = 0usize;
        for granule in accepted {
            match admit(&self.catalog, &self.queue, granule).await {
                Ok(_) => admitted += 1,
                Err(e) => warn!(error = %e, "admission failed, will retry on next invocation"),
            }
        }

        let fetched_links = count.fetched_links + page_links;
        let next_cursor = cursor + self.page_size;

        self.catalog
            .upsert_granule_count(date, platform, available_links, fetched_links)
            .await?;
        self.catalog
            .set_status(&cursor_key, &next_cursor.to_string())
            .await?;

        let completed = next_cursor as i64 >= available_links;

        Ok(PollResult {
            date,
            platform,
            completed,
            admitted,
        })
    }

    /// Poll every work item once, bounded by `concurrent_dates` in flight.
    pub async fn sweep(&self, items: Vec<WorkItem>, concurrent_dates: usize) -> Vec<PollResult> {
        stream::iter(items.into_iter().map(|item| {
            let this = self;
            async move {
                match this.poll_once(item.date, item.platform).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!(date = %item.date_str(), platform = %item.platform, error = %e, "poll failed");
                        None
                    }
                }
            }
        }))
        .buffer_unordered(concurrent_dates)
        .filter_map(|r| async move { r })
        .collect()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_result_reports_completion() {
        let result = PollResult {
            date: NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
            platform: Platform::S2B,
            completed: true,
            admitted: 0,
        };
        assert!(result.completed);
    }
}

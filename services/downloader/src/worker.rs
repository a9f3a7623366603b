//! Queue-driven download worker: one pass over the granule state machine
//! (§4.3) per claimed message.

use catalog_client::CatalogClient;
use pipeline_common::PipelineResult;
use reqwest::Client;
use std::sync::Arc;
use storage::{ClaimOutcome, Catalog, DownloadQueue, ObjectStorage, QueueEntry, StoragePath};
use tracing::{error, info, warn};

use crate::config::Args;

/// Outcome of processing one queue entry, for status/metrics reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Downloaded,
    Skipped,
    TransientFailureRequeued,
    Abandoned,
    Expired,
    HardFailure,
}

/// Everything a worker needs to process one queue entry end to end.
pub struct Worker {
    pub catalog: Arc<Catalog>,
    pub queue: Arc<DownloadQueue>,
    pub objects: Arc<ObjectStorage>,
    pub catalog_client: Arc<CatalogClient>,
    pub http: Client,
    pub config: Arc<Args>,
}

impl Worker {
    /// Process one claimed entry, mirroring the detailed contract in §4.3.
    pub async fn process(&self, entry: &QueueEntry) -> PipelineResult<ProcessOutcome> {
        let id = &entry.message.id;

        // Step 1: load + lease.
        let claimed = match self
            .catalog
            .claim_lease(id, self.config.max_download_retries)
            .await?
        {
            ClaimOutcome::Claimed(g) => g,
            ClaimOutcome::NotFound => {
                info!(%id, "granule not found, dropping message");
                return Ok(ProcessOutcome::Skipped);
            }
            ClaimOutcome::AlreadyDownloaded => {
                info!(%id, "already downloaded, dropping message");
                return Ok(ProcessOutcome::Skipped);
            }
            ClaimOutcome::LeaseHeld => {
                info!(%id, "lease held by another worker, dropping message");
                return Ok(ProcessOutcome::Skipped);
            }
            ClaimOutcome::RetriesExhausted => {
                warn!(%id, "retry cap exceeded, abandoning");
                return Ok(ProcessOutcome::Abandoned);
            }
        };

        // Step 3: refresh checksum from upstream (checksum drift, §9).
        let checksum = match self.catalog_client.fetch_checksum(id).await {
            Ok(c) => {
                if c != claimed.checksum {
                    self.catalog.update_checksum(id, &c).await?;
                }
                c
            }
            Err(e) => {
                warn!(%id, error = %e, "checksum refresh failed, using stored checksum");
                claimed.checksum.clone()
            }
        };

        // Step 4: URL rewrite + credential selection.
        let (download_url, username, password) = if self.config.use_inthub2 {
            (
                rewrite_host(&claimed.download_url, &self.config.inthub2_host),
                self.config.inthub2_username.as_str(),
                self.config.inthub2_password.as_str(),
            )
        } else {
            (
                claimed.download_url.clone(),
                self.config.scihub_username.as_str(),
                self.config.scihub_password.as_str(),
            )
        };
        self.catalog.update_download_url(id, &download_url).await?;

        // Step 5: fetch + stream to object store.
        let fetch_result = self.fetch_and_upload(&download_url, username, password, &checksum, &claimed).await;

        match fetch_result {
            Ok(location) => {
                // Step 6: commit success.
                self.catalog.mark_downloaded(id, &location).await?;
                (*self.queue).clone().ack(&entry.entry_id).await?;
                info!(%id, location = %location, "download committed");
                Ok(ProcessOutcome::Downloaded)
            }
            Err(FetchError::Expired) => {
                self.catalog.mark_expired(id).await?;
                (*self.queue).clone().ack(&entry.entry_id).await?;
                warn!(%id, "upstream reports product expired");
                Ok(ProcessOutcome::Expired)
            }
            Err(FetchError::Transient(reason)) => {
                // Step 7: transient failure, requeue, ack the original.
                let retries = self.catalog.record_transient_failure(id).await?;
                let mut queue = (*self.queue).clone();
                queue.publish(&entry.message).await?;
                queue.ack(&entry.entry_id).await?;
                warn!(%id, retries, reason = %reason, "transient failure, requeued");
                Ok(ProcessOutcome::TransientFailureRequeued)
            }
            Err(FetchError::Hard(reason)) => {
                // Step 8: hard failure, surface the error so the broker redelivers.
                error!(%id, reason = %reason, "hard failure");
                Ok(ProcessOutcome::HardFailure)
            }
        }
    }

    async fn fetch_and_upload(
        &self,
        url: &str,
        username: &str,
        password: &str,
        expected_checksum: &str,
        claimed: &pipeline_common::Granule,
    ) -> Result<String, FetchError> {
        use futures::TryStreamExt;

        let response = self
            .http
            .get(url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("connection error: {e}")))?;

        match response.status() {
            s if s.is_success() => {}
            s if s.as_u16() == 404 || s.as_u16() == 410 => return Err(FetchError::Expired),
            s if s.as_u16() == 401 => {
                return Err(FetchError::Hard("upstream credentials rejected (401)".into()))
            }
            s if s.is_server_error() => {
                return Err(FetchError::Transient(format!("upstream {s}")))
            }
            s => return Err(FetchError::Hard(format!("unexpected upstream status {s}"))),
        }

        let key = StoragePath::granule_key(&claimed.beginposition.date_naive(), &claimed.filename);

        // Stream the body straight into the object store rather than
        // buffering the whole (often multi-GB) archive in memory first.
        let body = response
            .bytes_stream()
            .map_err(|e| pipeline_common::PipelineError::ObjectStore(format!("body read failed: {e}")));

        self.objects
            .put_stream_with_checksum(&key, body, expected_checksum)
            .await
            .map_err(|e| match e {
                pipeline_common::PipelineError::ChecksumMismatch { .. } => {
                    FetchError::Transient(e.to_string())
                }
                other => FetchError::Transient(other.to_string()),
            })?;

        Ok(format!("{}/{}", self.config.upload_bucket, key))
    }
}

enum FetchError {
    Transient(String),
    Hard(String),
    Expired,
}

/// Replace the host segment of `url` with `new_host`, preserving scheme and
/// path (§4.3 step 4, IntHub2 routing).
fn rewrite_host(url: &str, new_host: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        let path_start = after_scheme.find('/').unwrap_or(after_scheme.len());
        format!("{}{new_host}{}", &url[..scheme_end + 3], &after_scheme[path_start..])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_host_replaces_only_host_segment() {
        let url = "https://scihub.copernicus.eu/dhus/odata/v1/Products(abc)/$value";
        let rewritten = rewrite_host(url, "inthub2.copernicus.eu");
        assert_eq!(
            rewritten,
            "https://inthub2.copernicus.eu/dhus/odata/v1/Products(abc)/$value"
        );
    }

    #[test]
    fn rewrite_host_without_path_is_stable() {
        let url = "https://scihub.copernicus.eu";
        assert_eq!(rewrite_host(url, "inthub2.copernicus.eu"), "https://inthub2.copernicus.eu");
    }
}

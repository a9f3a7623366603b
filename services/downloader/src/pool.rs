//! Bounded-concurrency worker pool draining the "to-download" queue.

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storage::DownloadQueue;
use tracing::{error, warn};

use crate::worker::{ProcessOutcome, Worker};

/// Running counters surfaced on `/status`.
#[derive(Default)]
pub struct PoolStats {
    pub downloaded: AtomicU64,
    pub requeued: AtomicU64,
    pub abandoned: AtomicU64,
    pub expired: AtomicU64,
    pub hard_failures: AtomicU64,
}

impl PoolStats {
    fn record(&self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Downloaded => self.downloaded.fetch_add(1, Ordering::Relaxed),
            ProcessOutcome::TransientFailureRequeued => self.requeued.fetch_add(1, Ordering::Relaxed),
            ProcessOutcome::Abandoned => self.abandoned.fetch_add(1, Ordering::Relaxed),
            ProcessOutcome::Expired => self.expired.fetch_add(1, Ordering::Relaxed),
            ProcessOutcome::HardFailure => self.hard_failures.fetch_add(1, Ordering::Relaxed),
            ProcessOutcome::Skipped => 0,
        };
    }
}

/// Claim up to `max_concurrent` messages and process them concurrently via
/// `buffer_unordered`, mirroring the teacher's bounded-concurrency download
/// cycle but driven by a durable queue instead of a discovery listing.
pub async fn run_once(
    worker: &Worker,
    queue: &DownloadQueue,
    consumer_name: &str,
    max_concurrent: usize,
    stats: &PoolStats,
) -> usize {
    let mut queue = queue.clone();
    let entries = match queue.claim(consumer_name, max_concurrent, 5_000).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(error = %e, "queue claim failed");
            return 0;
        }
    };

    let processed = entries.len();

    stream::iter(entries.into_iter().map(|entry| async move {
        match worker.process(&entry).await {
            Ok(outcome) => {
                stats.record(outcome);
                if matches!(outcome, ProcessOutcome::HardFailure) {
                    // Leave unacked; the broker's visibility timeout redelivers it.
                } else if !matches!(outcome, ProcessOutcome::Downloaded | ProcessOutcome::Expired | ProcessOutcome::TransientFailureRequeued) {
                    let mut q = queue.clone();
                    let _ = q.ack(&entry.entry_id).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "processing error, leaving message for redelivery");
            }
        }
    }))
    .buffer_unordered(max_concurrent)
    .collect::<Vec<_>>()
    .await;

    processed
}

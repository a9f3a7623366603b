//! Shared admission routine (§4.2.3), used by both the poll scheduler and
//! the push subscription handler.

use pipeline_common::{NewGranule, PipelineResult};
use storage::{AdmissionOutcome, Catalog, DownloadQueue};
use tracing::{debug, info};

/// Conditionally insert `candidate` and, only when this call wins the
/// insert race, publish its download message.
///
/// Publish happens strictly after the row commits (the resolved ordering
/// from the design notes): a crash between insert and publish leaves a row
/// with no queue message, which the requeuer can repair, rather than a
/// queue message for a granule that was never durably recorded.
pub async fn admit(
    catalog: &Catalog,
    queue: &DownloadQueue,
    candidate: NewGranule,
) -> PipelineResult<AdmissionOutcome> {
    let outcome = catalog.admit_granule(&candidate).await?;

    if outcome == AdmissionOutcome::Inserted {
        let message = storage::catalog::download_message_for(&candidate);
        let mut queue = queue.clone();
        queue.publish(&message).await?;
        info!(id = %candidate.id, "admitted granule");
    } else {
        debug!(id = %candidate.id, "granule already present, no-op");
    }

    Ok(outcome)
}

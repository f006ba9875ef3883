//! Deduplication of superseded notices.
//!
//! New notices for a known `(name, source)` identity supersede the old ones:
//! every prior event's still-pending work is soft-deleted before the new
//! plan is built. Each prior event retires in its own repository transaction,
//! so a failure halfway through leaves the earlier batches committed.

use tracing::{debug, info};

use crate::db::repository::AlertRepository;
use crate::models::Event;

use super::PipelineError;

/// Retire the pending work of every prior event sharing this event's
/// identity.
///
/// An exact ivorn match means the same notice is being ingested twice and
/// aborts with [`PipelineError::DuplicateIdentifier`] before anything is
/// touched.
pub async fn reconcile_previous(
    repo: &dyn AlertRepository,
    event: &Event,
) -> Result<(), PipelineError> {
    let previous = repo.find_events(&event.name, &event.source).await?;

    if previous.is_empty() {
        info!(event = %event.name, "no previous entry for event");
        return Ok(());
    }

    if previous.iter().any(|prior| prior.ivorn == event.ivorn) {
        return Err(PipelineError::DuplicateIdentifier(event.ivorn.clone()));
    }

    debug!(
        event = %event.name,
        previous = previous.len(),
        "retiring requests of previous notices"
    );
    for prior in &previous {
        let counts = repo.retire_event_requests(prior.id).await?;
        if !counts.is_empty() {
            info!(
                event = %event.name,
                prior_ivorn = %prior.ivorn,
                mpointings = counts.mpointings,
                pointings = counts.pointings,
                "deleted pending requests of previous notice"
            );
        }
    }

    Ok(())
}

//! Service layer: the alert ingestion pipeline.
//!
//! Four components turn an in-process alert into persisted observation
//! requests:
//! - [`strategy`]: pure derivation of scheduling parameters from the event's
//!   strategy document;
//! - [`tiles`]: skymap-to-grid projection and credible-region masking;
//! - [`dedup`]: retiring the still-pending work of superseded notices;
//! - [`plan_builder`]: assembling and atomically persisting the plan.
//!
//! [`AlertPipeline::handle_event`] composes them in order. Everything up to
//! the final `store_plan` call is pure computation over immutable inputs, so
//! a failure anywhere leaves the database exactly as it was, apart from
//! dedup batches that had already committed.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::db::repository::{AlertRepository, RepositoryError};
use crate::grid::{GridError, SkyGridEngine, SkymapStore};
use crate::models::Event;

pub mod dedup;
pub mod plan_builder;
pub mod strategy;
pub mod tiles;

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod strategy_tests;

pub use plan_builder::PlanOutcome;
pub use strategy::{derive_plan, PlanSpec};
pub use tiles::{resolve_tiles, TileResolution};

/// Errors that abort handling of one event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The exact notice (same ivorn) has been ingested before.
    #[error("duplicate notice identifier: {0}")]
    DuplicateIdentifier(String),

    /// A grid-based strategy arrived but no grid is defined in the database.
    #[error("no grid defined in the database")]
    NoGridDefined,

    /// The event's strategy document is missing keys or has the wrong shape.
    #[error("malformed strategy document: {0}")]
    MalformedStrategy(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The alert ingestion pipeline.
///
/// Holds the repository, the grid engine and the skymap store behind trait
/// objects so tests can swap in deterministic fakes.
pub struct AlertPipeline {
    repo: Arc<dyn AlertRepository>,
    engine: Arc<dyn SkyGridEngine>,
    skymaps: Arc<dyn SkymapStore>,
    config: PipelineConfig,
}

impl AlertPipeline {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        engine: Arc<dyn SkyGridEngine>,
        skymaps: Arc<dyn SkymapStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repo,
            engine,
            skymaps,
            config,
        }
    }

    /// Ingest one event: retire superseded notices, then derive and persist
    /// its observation plan.
    pub async fn handle_event(&self, event: &Event) -> Result<PlanOutcome, PipelineError> {
        dedup::reconcile_previous(self.repo.as_ref(), event).await?;
        plan_builder::commit_plan(
            self.repo.as_ref(),
            self.engine.as_ref(),
            self.skymaps.as_ref(),
            &self.config,
            event,
        )
        .await
    }
}

//! Observation-plan assembly and storage.
//!
//! The only component that writes observation records. The full plan is
//! assembled in memory first and handed to the repository as one
//! [`ObservationPlan`], so any storage failure rolls back cleanly and the
//! caller never sees a partially ingested event.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::db::repository::AlertRepository;
use crate::grid::{GridError, SkyGridEngine, SkymapStore, TileRow};
use crate::models::{
    Event, GridRecord, NewEvent, NewSurvey, ObservationPlan, PlannedMpointing, PlannedTile,
    StoredPlan,
};

use super::strategy::{derive_plan, PlanSpec};
use super::tiles::resolve_tiles;
use super::PipelineError;

/// What handling one event produced.
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    /// A retraction: the event was recorded, nothing was scheduled.
    Retraction { event_id: i64 },
    /// Every candidate tile fell to the limits; the event was recorded and
    /// nothing was scheduled. Not an error.
    NoActionableTiles {
        event_id: i64,
        /// Contained probability of the best tile that was dropped
        best_missed_prob: Option<f64>,
    },
    /// Observation requests were created.
    Scheduled {
        event_id: i64,
        survey_id: Option<i64>,
        mpointing_ids: Vec<i64>,
    },
}

/// Build and persist the observation plan for one event.
pub async fn commit_plan(
    repo: &dyn AlertRepository,
    engine: &dyn SkyGridEngine,
    skymaps: &dyn SkymapStore,
    config: &PipelineConfig,
    event: &Event,
) -> Result<PlanOutcome, PipelineError> {
    let user = repo
        .ensure_user(
            &config.default_user.username,
            &config.default_user.password,
            &config.default_user.full_name,
        )
        .await?;

    if event.is_retraction() {
        info!(event = %event.name, "retraction notice, recording event only");
        let stored = store(repo, event, event_only_plan(event, user.id)).await?;
        return Ok(PlanOutcome::Retraction {
            event_id: stored.event_id,
        });
    }

    let spec = derive_plan(event, config.readout_overhead_sec)?;

    if !spec.on_grid() {
        let plan = coordinate_plan(event, user.id, &spec)?;
        let stored = store(repo, event, plan).await?;
        info!(
            event = %event.name,
            event_id = stored.event_id,
            "scheduled follow-up at event coordinates"
        );
        return Ok(PlanOutcome::Scheduled {
            event_id: stored.event_id,
            survey_id: None,
            mpointing_ids: stored.mpointing_ids,
        });
    }

    // Tiled path.
    let grid = authoritative_grid(repo, config).await?;
    let resolution = resolve_tiles(event, &grid, engine, skymaps).await?;

    let selected = apply_limits(&resolution.masked.rows, &spec);
    if selected.is_empty() {
        warn!(
            event = %event.name,
            best_missed_prob = ?resolution.full.max_prob(),
            "no tile passed the limits, recording event only"
        );
        let stored = store(repo, event, event_only_plan(event, user.id)).await?;
        return Ok(PlanOutcome::NoActionableTiles {
            event_id: stored.event_id,
            best_missed_prob: resolution.full.max_prob(),
        });
    }

    let mut mpointings = Vec::with_capacity(selected.len());
    for row in &selected {
        let tile = repo
            .find_grid_tile(grid.id, &row.name)
            .await?
            .ok_or_else(|| GridError::UnknownTile(row.name.clone()))?;
        mpointings.push(PlannedMpointing {
            object_name: format!("{}_{}", event.name, row.name),
            ra: None,
            dec: None,
            tile: Some(PlannedTile {
                grid_tile_id: tile.id,
                tile_name: row.name.clone(),
                weight: row.prob,
            }),
            params: spec.params.clone(),
            exposure_sets: spec.exposure_sets.clone(),
        });
    }

    let plan = ObservationPlan {
        event: NewEvent::from(event),
        user_id: user.id,
        survey: Some(NewSurvey {
            name: event.name.clone(),
            grid_id: grid.id,
        }),
        mpointings,
    };
    let stored = store(repo, event, plan).await?;
    info!(
        event = %event.name,
        event_id = stored.event_id,
        survey_id = ?stored.survey_id,
        tiles = stored.mpointing_ids.len(),
        "scheduled tiled follow-up"
    );
    Ok(PlanOutcome::Scheduled {
        event_id: stored.event_id,
        survey_id: stored.survey_id,
        mpointing_ids: stored.mpointing_ids,
    })
}

/// Pick the grid to schedule on: the configured one when pinned, otherwise
/// the most recently created.
async fn authoritative_grid(
    repo: &dyn AlertRepository,
    config: &PipelineConfig,
) -> Result<GridRecord, PipelineError> {
    if let Some(name) = &config.grid_name {
        return repo
            .grid_by_name(name)
            .await?
            .ok_or(PipelineError::NoGridDefined);
    }

    let count = repo.grid_count().await?;
    if count > 1 {
        // Latent ambiguity: several grids defined, newest wins.
        warn!(grids = count, "multiple grids defined, using the latest");
    }
    repo.latest_grid().await?.ok_or(PipelineError::NoGridDefined)
}

/// Truncate to the tile cap, then drop tiles at or below the probability
/// floor. Input rows are already sorted highest probability first.
fn apply_limits(rows: &[TileRow], spec: &PlanSpec) -> Vec<TileRow> {
    let cap = spec.strategy.tile_limit.unwrap_or(rows.len());
    rows.iter()
        .take(cap)
        .filter(|row| spec.strategy.prob_limit <= 0.0 || row.prob > spec.strategy.prob_limit)
        .cloned()
        .collect()
}

fn event_only_plan(event: &Event, user_id: i64) -> ObservationPlan {
    ObservationPlan {
        event: NewEvent::from(event),
        user_id,
        survey: None,
        mpointings: Vec::new(),
    }
}

fn coordinate_plan(
    event: &Event,
    user_id: i64,
    spec: &PlanSpec,
) -> Result<ObservationPlan, PipelineError> {
    let coord = event.coord.ok_or_else(|| {
        PipelineError::MalformedStrategy(
            "explicit-coordinate strategy but the event has no coordinates".to_string(),
        )
    })?;

    Ok(ObservationPlan {
        event: NewEvent::from(event),
        user_id,
        survey: None,
        mpointings: vec![PlannedMpointing {
            object_name: event.name.clone(),
            ra: Some(coord.ra_deg),
            dec: Some(coord.dec_deg),
            tile: None,
            params: spec.params.clone(),
            exposure_sets: spec.exposure_sets.clone(),
        }],
    })
}

async fn store(
    repo: &dyn AlertRepository,
    event: &Event,
    plan: ObservationPlan,
) -> Result<StoredPlan, PipelineError> {
    repo.store_plan(&plan).await.map_err(|e| {
        if e.is_unique_violation() {
            PipelineError::DuplicateIdentifier(event.ivorn.clone())
        } else {
            PipelineError::Repository(e)
        }
    })
}

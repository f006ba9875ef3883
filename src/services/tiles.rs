//! Skymap-to-grid tile resolution.
//!
//! Projects an event's skymap onto the stored tiling and selects the tiles
//! worth observing. Selection is by credible-region containment: a tile
//! passes when the mean contour value of its pixels is below the credible
//! level, meaning the bulk of the tile sits inside the 90% localisation
//! region. Poorly localised events where no tile passes fall back to raw
//! contained probability so a sharply peaked map still schedules something.

use tracing::debug;

use crate::grid::{GridError, SkyGrid, SkyGridEngine, SkymapStore, TileTable};
use crate::models::{Event, GridRecord};

use super::PipelineError;

/// Credible level for the containment mask.
const CONTOUR_LEVEL: f64 = 0.9;
/// Contained-probability floor for the fallback selection.
const FALLBACK_PROB: f64 = 0.9;

/// The outcome of projecting one skymap onto one grid. Immutable; the full
/// table is retained so callers can report the best tile that was missed.
#[derive(Debug, Clone)]
pub struct TileResolution {
    /// Every grid tile with its contained probability, highest first
    pub full: TileTable,
    /// The tiles that passed the containment mask, highest first
    pub masked: TileTable,
}

/// Resolve the observable tiles for an event on the given grid.
///
/// Fetches the skymap through `skymaps` when the event does not already
/// carry one; an event with neither a skymap nor a URL fails with
/// [`GridError::MissingSkymap`].
pub async fn resolve_tiles(
    event: &Event,
    grid_record: &GridRecord,
    engine: &dyn SkyGridEngine,
    skymaps: &dyn SkymapStore,
) -> Result<TileResolution, PipelineError> {
    let mut grid = engine.build_grid(&grid_record.into())?;

    let skymap = match &event.skymap {
        Some(skymap) => skymap.clone(),
        None => {
            let url = event
                .skymap_url
                .as_deref()
                .ok_or(GridError::MissingSkymap)?;
            debug!(event = %event.name, url, "fetching skymap");
            skymaps.fetch(url).await?
        }
    };
    grid.apply_skymap(&skymap)?;

    Ok(select_tiles(grid.as_ref(), &event.name))
}

pub(crate) fn select_tiles(grid: &dyn SkyGrid, event_name: &str) -> TileResolution {
    let mut full = grid.tile_table();
    full.sort_by_prob_descending();

    let mut masked = TileTable::new(
        full.rows
            .iter()
            .filter(|row| tile_inside_region(grid, &row.name))
            .cloned()
            .collect(),
    );

    if masked.is_empty() {
        // Poorly localised map: no tile sits mostly inside the credible
        // region. Keep any tile that contains most of the probability.
        masked = TileTable::new(
            full.rows
                .iter()
                .filter(|row| row.prob > FALLBACK_PROB)
                .cloned()
                .collect(),
        );
        debug!(
            event = event_name,
            tiles = masked.len(),
            "containment mask empty, fell back to contained probability"
        );
    }
    masked.sort_by_prob_descending();

    TileResolution { full, masked }
}

fn tile_inside_region(grid: &dyn SkyGrid, tile_name: &str) -> bool {
    match grid.tile_contours(tile_name) {
        Ok(contours) if !contours.is_empty() => {
            let mean = contours.iter().sum::<f64>() / contours.len() as f64;
            mean < CONTOUR_LEVEL
        }
        _ => false,
    }
}

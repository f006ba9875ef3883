//! Narrow interface over the external sky-tiling/skymap library.
//!
//! The pipeline never does geometry itself. It asks a [`SkyGridEngine`] to
//! build a grid from the stored tiling definition, applies an event's skymap
//! to it, and reads back a table of per-tile contained probability plus the
//! per-pixel contour values used for credible-region containment tests.
//! Implementations wrap whatever tiling library the deployment uses; tests
//! use a canned in-memory engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::GridRecord;

/// Errors surfaced by grid/skymap collaborators.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("failed to build grid: {0}")]
    BuildFailed(String),

    #[error("failed to apply skymap: {0}")]
    SkymapFailed(String),

    #[error("unknown tile: {0}")]
    UnknownTile(String),

    #[error("event has no skymap and no skymap URL to fetch")]
    MissingSkymap,

    #[error("failed to fetch skymap from {url}: {message}")]
    FetchFailed { url: String, message: String },
}

/// A probability density map over the sky locating a transient.
///
/// The pixel payload is opaque to this crate; engines interpret it. GRB
/// events synthesize a Gaussian map from their position error, GW events
/// download theirs from the notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyMap {
    /// The event this map localises
    pub object: String,
    /// Where the map came from, when it was downloaded
    pub url: Option<String>,
    /// HEALPix resolution parameter
    pub nside: u32,
    /// Per-pixel probability density, in the engine's pixel ordering
    pub pixels: Vec<f64>,
}

/// Geometry inputs for building a grid, taken from the stored definition.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub ra_fov_deg: f64,
    pub dec_fov_deg: f64,
    pub ra_overlap: f64,
    pub dec_overlap: f64,
    pub algorithm: String,
}

impl From<&GridRecord> for GridSpec {
    fn from(record: &GridRecord) -> Self {
        Self {
            ra_fov_deg: record.ra_fov,
            dec_fov_deg: record.dec_fov,
            ra_overlap: record.ra_overlap,
            dec_overlap: record.dec_overlap,
            algorithm: record.algorithm.clone(),
        }
    }
}

/// One row of a tile-probability table.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRow {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    /// Skymap probability contained in the tile footprint
    pub prob: f64,
}

/// A table of tiles with contained probability.
#[derive(Debug, Clone, Default)]
pub struct TileTable {
    pub rows: Vec<TileRow>,
}

impl TileTable {
    pub fn new(rows: Vec<TileRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest contained probability in the table, if any rows exist.
    pub fn max_prob(&self) -> Option<f64> {
        self.rows
            .iter()
            .map(|row| row.prob)
            .fold(None, |best, prob| match best {
                Some(b) if b >= prob => Some(b),
                _ => Some(prob),
            })
    }

    /// Sort rows by contained probability, highest first. Ties keep their
    /// original relative order.
    pub fn sort_by_prob_descending(&mut self) {
        self.rows
            .sort_by(|a, b| b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Builds in-memory grids from stored tiling definitions.
pub trait SkyGridEngine: Send + Sync {
    fn build_grid(&self, spec: &GridSpec) -> Result<Box<dyn SkyGrid>, GridError>;
}

/// An in-memory grid with an applied skymap.
///
/// `tile_table` and `tile_contours` are only meaningful after
/// `apply_skymap` has succeeded.
pub trait SkyGrid: Send {
    /// Project a skymap onto the grid, computing per-tile probabilities.
    fn apply_skymap(&mut self, skymap: &SkyMap) -> Result<(), GridError>;

    /// Per-tile contained probability, one row per grid tile.
    fn tile_table(&self) -> TileTable;

    /// The per-pixel cumulative-probability contour values inside one tile's
    /// footprint. A pixel's contour value is the credible level at which that
    /// pixel enters the localisation region.
    fn tile_contours(&self, tile_name: &str) -> Result<Vec<f64>, GridError>;

    /// All tile names in the grid, in table order.
    fn tile_names(&self) -> Vec<String>;
}

/// Fetches skymaps that were not delivered inline with the notice.
///
/// This is a blocking I/O boundary; callers treat it like any other
/// repository call.
#[async_trait]
pub trait SkymapStore: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SkyMap, GridError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TileTable {
        TileTable::new(vec![
            TileRow {
                name: "T0001".into(),
                ra: 10.0,
                dec: -5.0,
                prob: 0.2,
            },
            TileRow {
                name: "T0002".into(),
                ra: 12.0,
                dec: -5.0,
                prob: 0.55,
            },
            TileRow {
                name: "T0003".into(),
                ra: 14.0,
                dec: -5.0,
                prob: 0.05,
            },
        ])
    }

    #[test]
    fn test_sort_by_prob_descending() {
        let mut table = table();
        table.sort_by_prob_descending();
        let names: Vec<_> = table.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["T0002", "T0001", "T0003"]);
    }

    #[test]
    fn test_max_prob() {
        assert_eq!(table().max_prob(), Some(0.55));
        assert_eq!(TileTable::default().max_prob(), None);
    }
}

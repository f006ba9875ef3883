//! Typed observing strategy.
//!
//! The upstream alert handler attaches a nested strategy document to each
//! event (observing window, cadence, constraints and exposure sets resolved
//! from its strategy tables). This module gives that document a closed, typed
//! shape so missing or malformed keys fail at deserialization rather than at
//! use.

use serde::{Deserialize, Serialize};

/// Wait time between visits: either one cadence for every repeat, or an
/// explicit per-repeat sequence. Both forms are valid and preserved as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitTime {
    /// A single wait time in minutes applied between every visit
    Single(f64),
    /// An ordered sequence of wait times, one per repeat
    Sequence(Vec<f64>),
}

/// One requested (count, exposure time, filter) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSpec {
    pub num_exp: i32,
    /// Exposure time in seconds
    pub exptime: f64,
    /// Filter name, e.g. `L`, `R`, `G`, `B`
    pub filt: String,
}

/// Repeat cadence for the meta-pointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceSpec {
    /// Number of visits to schedule in total
    pub num_todo: i32,
    pub wait_time: WaitTime,
}

/// Observability constraints applied to every visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintsSpec {
    /// Maximum Sun altitude in degrees (i.e. how dark it must be)
    pub max_sunalt: f64,
    /// Minimum target altitude in degrees
    pub min_alt: f64,
    /// Minimum Moon separation in degrees
    pub min_moonsep: f64,
    /// Maximum Moon brightness, as a phase descriptor or illumination
    /// fraction (kept as a string, passed through to the scheduler)
    pub max_moon: String,
}

/// The complete observing strategy for one event.
///
/// Field aliases accept the key names used by the legacy strategy tables
/// (`exposure_sets_dict`, `cadence_dict`, `constraints_dict`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservingStrategy {
    /// Whether to schedule on the survey tiling grid (skymap-driven) or at
    /// the event's own coordinates
    pub on_grid: bool,
    /// Cap on the number of tiles to schedule; required when `on_grid`
    #[serde(default)]
    pub tile_limit: Option<usize>,
    /// Drop tiles at or below this contained probability; 0 disables the floor
    #[serde(default)]
    pub prob_limit: f64,
    #[serde(alias = "exposure_sets_dict")]
    pub exposure_sets: Vec<ExposureSpec>,
    #[serde(alias = "cadence_dict")]
    pub cadence: CadenceSpec,
    #[serde(alias = "constraints_dict")]
    pub constraints: ConstraintsSpec,
    /// Scheduling window start, passed through as a time string
    pub start_time: String,
    /// Scheduling window stop, passed through as a time string
    pub stop_time: String,
    /// Initial queue rank
    pub rank: i32,
}

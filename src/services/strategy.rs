//! Strategy/parameter extraction.
//!
//! Pure derivation of the scheduling parameters for one event from its
//! nested strategy document. No I/O, no clock: everything downstream reuses
//! the one [`PlanSpec`] produced here.

use crate::models::{
    Event, ExposureSetParams, MpointingParams, ObservingStrategy,
};

use super::PipelineError;

/// Fixed pixel binning for alert follow-up exposures.
const BINNING: i32 = 1;
/// Fixed image type for alert follow-up exposures.
const IMGTYPE: &str = "SCIENCE";
/// Pointing validity sentinel: never expires.
const NO_EXPIRY: f64 = -1.0;

/// Everything derived from one event's strategy, before tiles are known.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub strategy: ObservingStrategy,
    pub params: MpointingParams,
    pub exposure_sets: Vec<ExposureSetParams>,
}

impl PlanSpec {
    pub fn on_grid(&self) -> bool {
        self.strategy.on_grid
    }
}

/// Derive the scheduling parameters for one event.
///
/// `readout_overhead_sec` is added to every exposure when computing the
/// minimum useful visit time. Fails with
/// [`PipelineError::MalformedStrategy`] before anything is written.
pub fn derive_plan(event: &Event, readout_overhead_sec: f64) -> Result<PlanSpec, PipelineError> {
    let strategy: ObservingStrategy = serde_json::from_value(event.strategy.clone())
        .map_err(|e| PipelineError::MalformedStrategy(e.to_string()))?;

    if strategy.exposure_sets.is_empty() {
        return Err(PipelineError::MalformedStrategy(
            "strategy has no exposure sets".to_string(),
        ));
    }
    for exp in &strategy.exposure_sets {
        if exp.num_exp < 0 {
            return Err(PipelineError::MalformedStrategy(format!(
                "negative num_exp {} in exposure set",
                exp.num_exp
            )));
        }
    }
    if strategy.on_grid && strategy.tile_limit.is_none() {
        return Err(PipelineError::MalformedStrategy(
            "on-grid strategy without a tile_limit".to_string(),
        ));
    }

    // Minimum visit time: every exposure plus one readout, summed over sets.
    let min_time: f64 = strategy
        .exposure_sets
        .iter()
        .map(|exp| (exp.exptime + readout_overhead_sec) * f64::from(exp.num_exp))
        .sum();

    let exposure_sets = strategy
        .exposure_sets
        .iter()
        .map(|exp| ExposureSetParams {
            num_exp: exp.num_exp,
            exptime: exp.exptime,
            filt: exp.filt.clone(),
            binning: BINNING,
            imgtype: IMGTYPE.to_string(),
        })
        .collect();

    let params = MpointingParams {
        too: true,
        min_time,
        valid_time: NO_EXPIRY,
        start_time: strategy.start_time.clone(),
        stop_time: strategy.stop_time.clone(),
        start_rank: strategy.rank,
        num_todo: strategy.cadence.num_todo,
        wait_time: strategy.cadence.wait_time.clone(),
        max_sunalt: strategy.constraints.max_sunalt,
        min_alt: strategy.constraints.min_alt,
        min_moonsep: strategy.constraints.min_moonsep,
        max_moon: strategy.constraints.max_moon.clone(),
    };

    Ok(PlanSpec {
        strategy,
        params,
        exposure_sets,
    })
}

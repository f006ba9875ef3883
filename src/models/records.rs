//! Persisted record types.
//!
//! These mirror the observation database tables the pipeline reads and
//! writes. Statuses are closed enums rather than free strings so illegal
//! transitions are unrepresentable; each enum serializes to the exact
//! lowercase string the database stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::event::{Event, EventType};
use super::strategy::WaitTime;

/// Lifecycle states of a meta-pointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpointingStatus {
    Scheduled,
    Unscheduled,
    Deleted,
    Completed,
    Expired,
}

impl MpointingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpointingStatus::Scheduled => "scheduled",
            MpointingStatus::Unscheduled => "unscheduled",
            MpointingStatus::Deleted => "deleted",
            MpointingStatus::Completed => "completed",
            MpointingStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(MpointingStatus::Scheduled),
            "unscheduled" => Some(MpointingStatus::Unscheduled),
            "deleted" => Some(MpointingStatus::Deleted),
            "completed" => Some(MpointingStatus::Completed),
            "expired" => Some(MpointingStatus::Expired),
            _ => None,
        }
    }

    /// Statuses that still represent pending work and are soft-deleted when a
    /// newer notice supersedes the event.
    pub fn is_retirable(&self) -> bool {
        matches!(self, MpointingStatus::Scheduled | MpointingStatus::Unscheduled)
    }
}

impl fmt::Display for MpointingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a single realized visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointingStatus {
    Pending,
    Running,
    Completed,
    Aborted,
    Interrupted,
    Expired,
    Deleted,
}

impl PointingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointingStatus::Pending => "pending",
            PointingStatus::Running => "running",
            PointingStatus::Completed => "completed",
            PointingStatus::Aborted => "aborted",
            PointingStatus::Interrupted => "interrupted",
            PointingStatus::Expired => "expired",
            PointingStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PointingStatus::Pending),
            "running" => Some(PointingStatus::Running),
            "completed" => Some(PointingStatus::Completed),
            "aborted" => Some(PointingStatus::Aborted),
            "interrupted" => Some(PointingStatus::Interrupted),
            "expired" => Some(PointingStatus::Expired),
            "deleted" => Some(PointingStatus::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for PointingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== Stored rows ====================

/// A persisted event notice.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
    pub ivorn: String,
    pub source: String,
    pub event_type: EventType,
    pub time: DateTime<Utc>,
    pub skymap: Option<String>,
}

/// Insert shape for an event row.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub ivorn: String,
    pub source: String,
    pub event_type: EventType,
    pub time: DateTime<Utc>,
    pub skymap: Option<String>,
}

impl From<&Event> for NewEvent {
    fn from(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            ivorn: event.ivorn.clone(),
            source: event.source.clone(),
            event_type: event.event_type,
            time: event.time,
            skymap: event.skymap_url.clone(),
        }
    }
}

/// A stored tiling definition. Read-only from the pipeline's perspective.
#[derive(Debug, Clone)]
pub struct GridRecord {
    pub id: i64,
    pub name: String,
    pub ra_fov: f64,
    pub dec_fov: f64,
    pub ra_overlap: f64,
    pub dec_overlap: f64,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a grid row (deployment seeding).
#[derive(Debug, Clone)]
pub struct NewGrid {
    pub name: String,
    pub ra_fov: f64,
    pub dec_fov: f64,
    pub ra_overlap: f64,
    pub dec_overlap: f64,
    pub algorithm: String,
}

/// One named cell of a grid.
#[derive(Debug, Clone)]
pub struct GridTileRecord {
    pub id: i64,
    pub grid_id: i64,
    pub name: String,
    pub ra: f64,
    pub dec: f64,
}

/// Insert shape for a grid tile (deployment seeding).
#[derive(Debug, Clone)]
pub struct NewGridTile {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
}

/// Links one event to the grid it was scheduled on.
#[derive(Debug, Clone)]
pub struct SurveyRecord {
    pub id: i64,
    pub name: String,
    pub grid_id: i64,
    pub event_id: i64,
}

/// Per-tile contained-probability weight for one survey.
#[derive(Debug, Clone)]
pub struct SurveyTileRecord {
    pub id: i64,
    pub survey_id: i64,
    pub grid_tile_id: i64,
    pub weight: f64,
}

/// The automation user that owns alert-generated requests.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub full_name: String,
}

/// Scheduling parameters shared by every meta-pointing built from one event.
///
/// Derived once from the strategy by [`crate::services::derive_plan`] and
/// immutable from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct MpointingParams {
    /// Target of opportunity: alert follow-up always preempts the normal queue
    pub too: bool,
    /// Minimum useful visit duration in seconds (exposures plus readout)
    pub min_time: f64,
    /// Pointing validity in days; -1 means no expiry
    pub valid_time: f64,
    pub start_time: String,
    pub stop_time: String,
    pub start_rank: i32,
    pub num_todo: i32,
    pub wait_time: WaitTime,
    pub max_sunalt: f64,
    pub min_alt: f64,
    pub min_moonsep: f64,
    pub max_moon: String,
}

/// A persisted meta-pointing: one recurring observation request.
#[derive(Debug, Clone)]
pub struct MpointingRecord {
    pub id: i64,
    pub object_name: String,
    /// Explicit coordinates; null when the request targets a grid tile
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub user_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub status: MpointingStatus,
    pub params: MpointingParams,
}

/// A persisted exposure set, owned by exactly one meta-pointing.
#[derive(Debug, Clone)]
pub struct ExposureSetRecord {
    pub id: i64,
    pub mpointing_id: i64,
    pub num_exp: i32,
    pub exptime: f64,
    pub filt: String,
    pub binning: i32,
    pub imgtype: String,
}

/// A single concrete scheduled visit.
#[derive(Debug, Clone)]
pub struct PointingRecord {
    pub id: i64,
    pub mpointing_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub object_name: String,
    pub status: PointingStatus,
    pub rank: i32,
}

// ==================== Plan aggregate ====================

/// Exposure-set parameters ready for insertion. Each meta-pointing gets its
/// own rows instantiated from these; they are never shared between requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSetParams {
    pub num_exp: i32,
    pub exptime: f64,
    pub filt: String,
    pub binning: i32,
    pub imgtype: String,
}

/// Tile attachment for one planned meta-pointing.
#[derive(Debug, Clone)]
pub struct PlannedTile {
    pub grid_tile_id: i64,
    pub tile_name: String,
    /// Contained probability, stored as the survey-tile weight
    pub weight: f64,
}

/// One meta-pointing ready for insertion, with its owned exposure sets.
/// The storage layer synthesizes the first pending pointing on insert.
#[derive(Debug, Clone)]
pub struct PlannedMpointing {
    pub object_name: String,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub tile: Option<PlannedTile>,
    pub params: MpointingParams,
    pub exposure_sets: Vec<ExposureSetParams>,
}

/// Survey row to create alongside a tiled plan.
#[derive(Debug, Clone)]
pub struct NewSurvey {
    pub name: String,
    pub grid_id: i64,
}

/// Everything one ingested notice persists, in one transaction.
///
/// A retraction (or a plan whose tiles were all filtered out) carries only
/// the event row; `survey` and `mpointings` are then empty.
#[derive(Debug, Clone)]
pub struct ObservationPlan {
    pub event: NewEvent,
    pub user_id: i64,
    pub survey: Option<NewSurvey>,
    pub mpointings: Vec<PlannedMpointing>,
}

/// Identifiers assigned when an [`ObservationPlan`] is stored.
#[derive(Debug, Clone)]
pub struct StoredPlan {
    pub event_id: i64,
    pub survey_id: Option<i64>,
    pub mpointing_ids: Vec<i64>,
}

/// Counts of records soft-deleted when a prior event is superseded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetiredCounts {
    pub mpointings: usize,
    pub pointings: usize,
}

impl RetiredCounts {
    pub fn is_empty(&self) -> bool {
        self.mpointings == 0 && self.pointings == 0
    }
}

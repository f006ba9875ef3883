//! Repository trait for abstracting observation-database operations.
//!
//! The pipeline talks to storage through coarse operations that are each
//! internally transactional: a failed [`AlertRepository::store_plan`] leaves
//! no partial rows, and each [`AlertRepository::retire_event_requests`] call
//! commits on its own so progress over several prior events survives a later
//! failure. Implementations can use different backends (Postgres with Diesel,
//! in-memory storage for tests).

use async_trait::async_trait;

use crate::models::{
    EventRecord, ExposureSetRecord, GridRecord, GridTileRecord, MpointingRecord, NewEvent,
    NewGrid, NewGridTile,
    ObservationPlan, PointingRecord, PointingStatus, RetiredCounts, StoredPlan, SurveyRecord,
    SurveyTileRecord, UserRecord,
};

mod error;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Repository trait for the observation database.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust and allow
/// sharing across threads.
///
/// # Atomicity
/// Every mutating operation is a single transaction; on error nothing it
/// would have written persists.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    // ==================== Health ====================

    /// Check if the database connection is healthy.
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Events ====================

    /// All stored events matching an identity `(name, source)` pair, oldest
    /// first. Several rows mean the event has been updated by later notices.
    async fn find_events(&self, name: &str, source: &str) -> RepositoryResult<Vec<EventRecord>>;

    /// Look up a single event by its globally-unique notice identifier.
    async fn event_by_ivorn(&self, ivorn: &str) -> RepositoryResult<Option<EventRecord>>;

    /// Insert a bare event row outside of a plan. Retractions and tile-less
    /// outcomes go through [`AlertRepository::store_plan`] instead; this
    /// exists for tooling and tests.
    async fn insert_event(&self, event: &NewEvent) -> RepositoryResult<EventRecord>;

    // ==================== Deduplication ====================

    /// Soft-delete the still-pending work of one prior event: meta-pointings
    /// with status `scheduled` or `unscheduled` and pointings with status
    /// `pending` all move to `deleted`. Running and finished pointings are
    /// never touched. Commits independently of any other call.
    async fn retire_event_requests(&self, event_id: i64) -> RepositoryResult<RetiredCounts>;

    // ==================== Grids ====================

    /// Number of grid definitions stored.
    async fn grid_count(&self) -> RepositoryResult<usize>;

    /// The most recently created grid, if any exists.
    async fn latest_grid(&self) -> RepositoryResult<Option<GridRecord>>;

    /// Look up a grid by name.
    async fn grid_by_name(&self, name: &str) -> RepositoryResult<Option<GridRecord>>;

    /// Look up one tile of a grid by name.
    async fn find_grid_tile(
        &self,
        grid_id: i64,
        name: &str,
    ) -> RepositoryResult<Option<GridTileRecord>>;

    /// Install a grid definition (deployment seeding).
    async fn insert_grid(&self, grid: &NewGrid) -> RepositoryResult<GridRecord>;

    /// Install the tiles of a grid in one batch (deployment seeding).
    /// Returns the number of tiles inserted.
    async fn insert_grid_tiles(
        &self,
        grid_id: i64,
        tiles: &[NewGridTile],
    ) -> RepositoryResult<usize>;

    // ==================== Users ====================

    /// Idempotent upsert of a user by username. Creates the row on first use
    /// and returns the existing one afterwards.
    async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> RepositoryResult<UserRecord>;

    // ==================== Plan storage ====================

    /// Persist a complete observation plan in one transaction: the event row,
    /// the optional survey with its survey tiles, and every meta-pointing
    /// with its owned exposure sets plus a synthesized first `pending`
    /// pointing. A duplicate ivorn fails with
    /// [`RepositoryError::UniqueViolation`] and, like any other failure,
    /// rolls back the whole plan.
    async fn store_plan(&self, plan: &ObservationPlan) -> RepositoryResult<StoredPlan>;

    // ==================== Read-backs ====================

    /// All meta-pointings belonging to an event.
    async fn mpointings_for_event(&self, event_id: i64)
        -> RepositoryResult<Vec<MpointingRecord>>;

    /// All pointings belonging to an event.
    async fn pointings_for_event(&self, event_id: i64) -> RepositoryResult<Vec<PointingRecord>>;

    /// The exposure sets owned by one meta-pointing, in insertion order.
    async fn exposure_sets_for_mpointing(
        &self,
        mpointing_id: i64,
    ) -> RepositoryResult<Vec<ExposureSetRecord>>;

    /// All surveys belonging to an event.
    async fn surveys_for_event(&self, event_id: i64) -> RepositoryResult<Vec<SurveyRecord>>;

    /// All survey tiles belonging to a survey, heaviest weight first.
    async fn survey_tiles_for_survey(
        &self,
        survey_id: i64,
    ) -> RepositoryResult<Vec<SurveyTileRecord>>;

    // ==================== Scheduler hooks ====================

    /// Update the status of a single pointing (used by the scheduler when a
    /// visit starts or finishes; used by tests to fabricate prior state).
    async fn update_pointing_status(
        &self,
        pointing_id: i64,
        status: PointingStatus,
    ) -> RepositoryResult<()>;
}

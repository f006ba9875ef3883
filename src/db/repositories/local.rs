//! In-memory local repository implementation.
//!
//! A local implementation of [`AlertRepository`] suitable for unit testing
//! and local development. All data lives in `HashMap`s behind one lock, which
//! also gives `store_plan` its transactional behavior for free: new rows are
//! staged while the write lock is held and only merged into the maps once
//! every insert has validated, so a failure leaves no partial state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::db::repository::{
    AlertRepository, ErrorContext, RepositoryError, RepositoryResult,
};
use crate::models::{
    EventRecord, ExposureSetRecord, GridRecord, GridTileRecord, MpointingRecord, MpointingStatus,
    NewEvent, NewGrid, NewGridTile, ObservationPlan, PointingRecord, PointingStatus,
    RetiredCounts, StoredPlan, SurveyRecord, SurveyTileRecord, UserRecord,
};

/// In-memory alert repository.
///
/// # Example
/// ```
/// use obsalert::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// assert_eq!(repo.event_count(), 0);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Default)]
struct LocalData {
    events: HashMap<i64, EventRecord>,
    grids: HashMap<i64, GridRecord>,
    grid_tiles: HashMap<i64, GridTileRecord>,
    surveys: HashMap<i64, SurveyRecord>,
    survey_tiles: HashMap<i64, SurveyTileRecord>,
    users: HashMap<i64, UserRecord>,
    mpointings: HashMap<i64, MpointingRecord>,
    exposure_sets: HashMap<i64, ExposureSetRecord>,
    pointings: HashMap<i64, PointingRecord>,

    next_id: i64,

    // Failure injection for error-path tests
    is_healthy: bool,
    fail_next_store: bool,
}

impl LocalData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData {
                is_healthy: true,
                ..Default::default()
            })),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        let mut data = self.data.write().unwrap();
        data.is_healthy = healthy;
    }

    /// Make the next `store_plan` call fail after staging but before commit,
    /// to exercise rollback paths.
    pub fn fail_next_store(&self) {
        let mut data = self.data.write().unwrap();
        data.fail_next_store = true;
    }

    /// Number of events stored.
    pub fn event_count(&self) -> usize {
        self.data.read().unwrap().events.len()
    }

    /// Number of surveys stored.
    pub fn survey_count(&self) -> usize {
        self.data.read().unwrap().surveys.len()
    }

    /// Number of meta-pointings stored (any status).
    pub fn mpointing_count(&self) -> usize {
        self.data.read().unwrap().mpointings.len()
    }

    fn check_health(data: &LocalData) -> RepositoryResult<()> {
        if !data.is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        let data = self.data.read().unwrap();
        Ok(data.is_healthy)
    }

    async fn find_events(&self, name: &str, source: &str) -> RepositoryResult<Vec<EventRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut events: Vec<EventRecord> = data
            .events
            .values()
            .filter(|e| e.name == name && e.source == source)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn event_by_ivorn(&self, ivorn: &str) -> RepositoryResult<Option<EventRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        Ok(data.events.values().find(|e| e.ivorn == ivorn).cloned())
    }

    async fn insert_event(&self, event: &NewEvent) -> RepositoryResult<EventRecord> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        if data.events.values().any(|e| e.ivorn == event.ivorn) {
            return Err(RepositoryError::unique_violation(
                format!("ivorn {} already exists", event.ivorn),
                ErrorContext::new("insert_event").with_entity("event"),
            ));
        }

        let id = data.next_id();
        let record = EventRecord {
            id,
            name: event.name.clone(),
            ivorn: event.ivorn.clone(),
            source: event.source.clone(),
            event_type: event.event_type,
            time: event.time,
            skymap: event.skymap.clone(),
        };
        data.events.insert(id, record.clone());
        Ok(record)
    }

    async fn retire_event_requests(&self, event_id: i64) -> RepositoryResult<RetiredCounts> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        if !data.events.contains_key(&event_id) {
            return Err(RepositoryError::not_found_with_context(
                format!("Event {} not found", event_id),
                ErrorContext::new("retire_event_requests").with_entity_id(event_id),
            ));
        }

        let mut counts = RetiredCounts::default();
        for mpointing in data.mpointings.values_mut() {
            if mpointing.event_id == event_id && mpointing.status.is_retirable() {
                mpointing.status = MpointingStatus::Deleted;
                counts.mpointings += 1;
            }
        }
        for pointing in data.pointings.values_mut() {
            if pointing.event_id == event_id && pointing.status == PointingStatus::Pending {
                pointing.status = PointingStatus::Deleted;
                counts.pointings += 1;
            }
        }
        Ok(counts)
    }

    async fn grid_count(&self) -> RepositoryResult<usize> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;
        Ok(data.grids.len())
    }

    async fn latest_grid(&self) -> RepositoryResult<Option<GridRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        Ok(data
            .grids
            .values()
            .max_by_key(|g| (g.created_at, g.id))
            .cloned())
    }

    async fn grid_by_name(&self, name: &str) -> RepositoryResult<Option<GridRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        Ok(data.grids.values().find(|g| g.name == name).cloned())
    }

    async fn find_grid_tile(
        &self,
        grid_id: i64,
        name: &str,
    ) -> RepositoryResult<Option<GridTileRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        Ok(data
            .grid_tiles
            .values()
            .find(|t| t.grid_id == grid_id && t.name == name)
            .cloned())
    }

    async fn insert_grid(&self, grid: &NewGrid) -> RepositoryResult<GridRecord> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        let id = data.next_id();
        let record = GridRecord {
            id,
            name: grid.name.clone(),
            ra_fov: grid.ra_fov,
            dec_fov: grid.dec_fov,
            ra_overlap: grid.ra_overlap,
            dec_overlap: grid.dec_overlap,
            algorithm: grid.algorithm.clone(),
            created_at: chrono::Utc::now(),
        };
        data.grids.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_grid_tiles(
        &self,
        grid_id: i64,
        tiles: &[NewGridTile],
    ) -> RepositoryResult<usize> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        if !data.grids.contains_key(&grid_id) {
            return Err(RepositoryError::not_found_with_context(
                format!("Grid {} not found", grid_id),
                ErrorContext::new("insert_grid_tiles").with_entity("grid"),
            ));
        }

        for tile in tiles {
            let id = data.next_id();
            data.grid_tiles.insert(
                id,
                GridTileRecord {
                    id,
                    grid_id,
                    name: tile.name.clone(),
                    ra: tile.ra,
                    dec: tile.dec,
                },
            );
        }
        Ok(tiles.len())
    }

    async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> RepositoryResult<UserRecord> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        if let Some(user) = data.users.values().find(|u| u.username == username) {
            return Ok(user.clone());
        }

        let id = data.next_id();
        let user = UserRecord {
            id,
            username: username.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        };
        data.users.insert(id, user.clone());
        Ok(user)
    }

    async fn store_plan(&self, plan: &ObservationPlan) -> RepositoryResult<StoredPlan> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        if data.events.values().any(|e| e.ivorn == plan.event.ivorn) {
            return Err(RepositoryError::unique_violation(
                format!("ivorn {} already exists", plan.event.ivorn),
                ErrorContext::new("store_plan").with_entity("event"),
            ));
        }
        if !plan.mpointings.is_empty() && !data.users.contains_key(&plan.user_id) {
            return Err(RepositoryError::validation_with_context(
                format!("User {} does not exist", plan.user_id),
                ErrorContext::new("store_plan").with_entity("user"),
            ));
        }

        // Stage everything first; merge only after all rows validated.
        let mut staged_events: Vec<EventRecord> = Vec::new();
        let mut staged_surveys: Vec<SurveyRecord> = Vec::new();
        let mut staged_survey_tiles: Vec<SurveyTileRecord> = Vec::new();
        let mut staged_mpointings: Vec<MpointingRecord> = Vec::new();
        let mut staged_exposure_sets: Vec<ExposureSetRecord> = Vec::new();
        let mut staged_pointings: Vec<PointingRecord> = Vec::new();

        let event_id = data.next_id();
        staged_events.push(EventRecord {
            id: event_id,
            name: plan.event.name.clone(),
            ivorn: plan.event.ivorn.clone(),
            source: plan.event.source.clone(),
            event_type: plan.event.event_type,
            time: plan.event.time,
            skymap: plan.event.skymap.clone(),
        });

        let survey_id = match &plan.survey {
            Some(survey) => {
                if !data.grids.contains_key(&survey.grid_id) {
                    return Err(RepositoryError::not_found_with_context(
                        format!("Grid {} not found", survey.grid_id),
                        ErrorContext::new("store_plan").with_entity("survey"),
                    ));
                }
                let id = data.next_id();
                staged_surveys.push(SurveyRecord {
                    id,
                    name: survey.name.clone(),
                    grid_id: survey.grid_id,
                    event_id,
                });
                Some(id)
            }
            None => None,
        };

        if data.fail_next_store {
            data.fail_next_store = false;
            return Err(RepositoryError::query_with_context(
                "Injected store failure",
                ErrorContext::new("store_plan").with_details("fail_next_store"),
            ));
        }

        let mut mpointing_ids = Vec::with_capacity(plan.mpointings.len());
        for planned in &plan.mpointings {
            let survey_tile_id = match &planned.tile {
                Some(tile) => {
                    if !data.grid_tiles.contains_key(&tile.grid_tile_id) {
                        return Err(RepositoryError::not_found_with_context(
                            format!("GridTile {} not found", tile.grid_tile_id),
                            ErrorContext::new("store_plan").with_entity("grid_tile"),
                        ));
                    }
                    let survey_id = survey_id.ok_or_else(|| {
                        RepositoryError::validation_with_context(
                            "Tiled mpointing requires a survey",
                            ErrorContext::new("store_plan").with_entity("survey_tile"),
                        )
                    })?;
                    let id = data.next_id();
                    staged_survey_tiles.push(SurveyTileRecord {
                        id,
                        survey_id,
                        grid_tile_id: tile.grid_tile_id,
                        weight: tile.weight,
                    });
                    Some(id)
                }
                None => None,
            };

            let mpointing_id = data.next_id();
            let grid_tile_id = planned.tile.as_ref().map(|t| t.grid_tile_id);
            staged_mpointings.push(MpointingRecord {
                id: mpointing_id,
                object_name: planned.object_name.clone(),
                ra: planned.ra,
                dec: planned.dec,
                user_id: plan.user_id,
                event_id,
                grid_tile_id,
                survey_tile_id,
                status: MpointingStatus::Scheduled,
                params: planned.params.clone(),
            });
            mpointing_ids.push(mpointing_id);

            for exp in &planned.exposure_sets {
                let id = data.next_id();
                staged_exposure_sets.push(ExposureSetRecord {
                    id,
                    mpointing_id,
                    num_exp: exp.num_exp,
                    exptime: exp.exptime,
                    filt: exp.filt.clone(),
                    binning: exp.binning,
                    imgtype: exp.imgtype.clone(),
                });
            }

            // First pointing: queued immediately, ahead of the scheduler
            let pointing_id = data.next_id();
            staged_pointings.push(PointingRecord {
                id: pointing_id,
                mpointing_id,
                event_id,
                grid_tile_id,
                survey_tile_id,
                object_name: planned.object_name.clone(),
                status: PointingStatus::Pending,
                rank: planned.params.start_rank,
            });
        }

        // Commit point: merge staged rows into the maps.
        for record in staged_events {
            data.events.insert(record.id, record);
        }
        for record in staged_surveys {
            data.surveys.insert(record.id, record);
        }
        for record in staged_survey_tiles {
            data.survey_tiles.insert(record.id, record);
        }
        for record in staged_mpointings {
            data.mpointings.insert(record.id, record);
        }
        for record in staged_exposure_sets {
            data.exposure_sets.insert(record.id, record);
        }
        for record in staged_pointings {
            data.pointings.insert(record.id, record);
        }

        Ok(StoredPlan {
            event_id,
            survey_id,
            mpointing_ids,
        })
    }

    async fn mpointings_for_event(
        &self,
        event_id: i64,
    ) -> RepositoryResult<Vec<MpointingRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut records: Vec<MpointingRecord> = data
            .mpointings
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by_key(|m| m.id);
        Ok(records)
    }

    async fn pointings_for_event(&self, event_id: i64) -> RepositoryResult<Vec<PointingRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut records: Vec<PointingRecord> = data
            .pointings
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by_key(|p| p.id);
        Ok(records)
    }

    async fn exposure_sets_for_mpointing(
        &self,
        mpointing_id: i64,
    ) -> RepositoryResult<Vec<ExposureSetRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut records: Vec<ExposureSetRecord> = data
            .exposure_sets
            .values()
            .filter(|e| e.mpointing_id == mpointing_id)
            .cloned()
            .collect();
        records.sort_by_key(|e| e.id);
        Ok(records)
    }

    async fn surveys_for_event(&self, event_id: i64) -> RepositoryResult<Vec<SurveyRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut records: Vec<SurveyRecord> = data
            .surveys
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by_key(|s| s.id);
        Ok(records)
    }

    async fn survey_tiles_for_survey(
        &self,
        survey_id: i64,
    ) -> RepositoryResult<Vec<SurveyTileRecord>> {
        let data = self.data.read().unwrap();
        Self::check_health(&data)?;

        let mut records: Vec<SurveyTileRecord> = data
            .survey_tiles
            .values()
            .filter(|t| t.survey_id == survey_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(records)
    }

    async fn update_pointing_status(
        &self,
        pointing_id: i64,
        status: PointingStatus,
    ) -> RepositoryResult<()> {
        let mut data = self.data.write().unwrap();
        Self::check_health(&data)?;

        match data.pointings.get_mut(&pointing_id) {
            Some(pointing) => {
                pointing.status = status;
                Ok(())
            }
            None => Err(RepositoryError::not_found_with_context(
                format!("Pointing {} not found", pointing_id),
                ErrorContext::new("update_pointing_status").with_entity("pointing"),
            )),
        }
    }
}

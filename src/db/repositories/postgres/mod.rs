//! Postgres repository implementation using Diesel.
//!
//! Queries run on the blocking thread pool via `spawn_blocking`; each
//! repository operation that writes more than one row wraps its work in a
//! single database transaction, so callers never observe a half-stored plan.

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{FileBasedMigrations, MigrationHarness};
use tokio::task;

use crate::db::repository::{
    AlertRepository, ErrorContext, RepositoryError, RepositoryResult,
};
use crate::models::{
    EventRecord, ExposureSetRecord, GridRecord, GridTileRecord, MpointingRecord, MpointingStatus,
    NewEvent, NewGrid, NewGridTile, ObservationPlan, PointingRecord, PointingStatus,
    RetiredCounts, StoredPlan, SurveyRecord, SurveyTileRecord, UserRecord,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_pool_size: u32,
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            max_pool_size,
        })
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(config.database_url);
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .build(manager)
            .map_err(|e| RepositoryError::connection(e.to_string()))?;

        // Run migrations once during initialization.
        {
            let mut conn = pool
                .get()
                .map_err(|e| RepositoryError::connection(e.to_string()))?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self { pool })
    }

    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        let migrations =
            FileBasedMigrations::from_path(format!("{}/migrations", env!("CARGO_MANIFEST_DIR")))
                .map_err(|e| RepositoryError::internal(format!("Migrations not found: {e}")))?;

        conn.run_pending_migrations(migrations)
            .map_err(|e| RepositoryError::internal(format!("Migration error: {e}")))?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| RepositoryError::connection(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::internal(e.to_string()))?
    }
}

fn retirable_mpointing_statuses() -> Vec<&'static str> {
    vec![
        MpointingStatus::Scheduled.as_str(),
        MpointingStatus::Unscheduled.as_str(),
    ]
}

#[async_trait]
impl AlertRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn find_events(&self, name: &str, source: &str) -> RepositoryResult<Vec<EventRecord>> {
        let name = name.to_string();
        let source = source.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<EventRow> = events::table
                .filter(events::name.eq(&name))
                .filter(events::source.eq(&source))
                .order(events::id.asc())
                .select(EventRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(EventRecord::from).collect())
        })
        .await
    }

    async fn event_by_ivorn(&self, ivorn: &str) -> RepositoryResult<Option<EventRecord>> {
        let ivorn = ivorn.to_string();
        self.with_conn(move |conn| {
            let row: Option<EventRow> = events::table
                .filter(events::ivorn.eq(&ivorn))
                .select(EventRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(EventRecord::from))
        })
        .await
    }

    async fn insert_event(&self, event: &NewEvent) -> RepositoryResult<EventRecord> {
        let new_row = NewEventRow {
            name: event.name.clone(),
            ivorn: event.ivorn.clone(),
            source: event.source.clone(),
            event_type: event.event_type.as_str().to_string(),
            time: event.time,
            skymap: event.skymap.clone(),
        };
        self.with_conn(move |conn| {
            let row: EventRow = diesel::insert_into(events::table)
                .values(&new_row)
                .returning(EventRow::as_returning())
                .get_result(conn)?;
            Ok(EventRecord::from(row))
        })
        .await
    }

    async fn retire_event_requests(&self, event_id: i64) -> RepositoryResult<RetiredCounts> {
        self.with_conn(move |conn| {
            conn.transaction::<RetiredCounts, RepositoryError, _>(|conn| {
                let exists: Option<i64> = events::table
                    .filter(events::id.eq(event_id))
                    .select(events::id)
                    .first(conn)
                    .optional()?;
                if exists.is_none() {
                    return Err(RepositoryError::not_found_with_context(
                        format!("Event {} not found", event_id),
                        ErrorContext::new("retire_event_requests").with_entity_id(event_id),
                    ));
                }

                let mpointings_retired = diesel::update(
                    mpointings::table
                        .filter(mpointings::event_id.eq(event_id))
                        .filter(mpointings::status.eq_any(retirable_mpointing_statuses())),
                )
                .set(mpointings::status.eq(MpointingStatus::Deleted.as_str()))
                .execute(conn)?;

                let pointings_retired = diesel::update(
                    pointings::table
                        .filter(pointings::event_id.eq(event_id))
                        .filter(pointings::status.eq(PointingStatus::Pending.as_str())),
                )
                .set(pointings::status.eq(PointingStatus::Deleted.as_str()))
                .execute(conn)?;

                Ok(RetiredCounts {
                    mpointings: mpointings_retired,
                    pointings: pointings_retired,
                })
            })
        })
        .await
    }

    async fn grid_count(&self) -> RepositoryResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = grids::table.count().get_result(conn)?;
            Ok(count as usize)
        })
        .await
    }

    async fn latest_grid(&self) -> RepositoryResult<Option<GridRecord>> {
        self.with_conn(|conn| {
            let row: Option<GridRow> = grids::table
                .order((grids::created_at.desc(), grids::id.desc()))
                .select(GridRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(GridRecord::from))
        })
        .await
    }

    async fn grid_by_name(&self, name: &str) -> RepositoryResult<Option<GridRecord>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let row: Option<GridRow> = grids::table
                .filter(grids::name.eq(&name))
                .select(GridRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(GridRecord::from))
        })
        .await
    }

    async fn find_grid_tile(
        &self,
        grid_id: i64,
        name: &str,
    ) -> RepositoryResult<Option<GridTileRecord>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let row: Option<GridTileRow> = grid_tiles::table
                .filter(grid_tiles::grid_id.eq(grid_id))
                .filter(grid_tiles::name.eq(&name))
                .select(GridTileRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(GridTileRecord::from))
        })
        .await
    }

    async fn insert_grid(&self, grid: &NewGrid) -> RepositoryResult<GridRecord> {
        let new_row = NewGridRow {
            name: grid.name.clone(),
            ra_fov: grid.ra_fov,
            dec_fov: grid.dec_fov,
            ra_overlap: grid.ra_overlap,
            dec_overlap: grid.dec_overlap,
            algorithm: grid.algorithm.clone(),
        };
        self.with_conn(move |conn| {
            let row: GridRow = diesel::insert_into(grids::table)
                .values(&new_row)
                .returning(GridRow::as_returning())
                .get_result(conn)?;
            Ok(GridRecord::from(row))
        })
        .await
    }

    async fn insert_grid_tiles(
        &self,
        grid_id: i64,
        tiles: &[NewGridTile],
    ) -> RepositoryResult<usize> {
        let rows: Vec<NewGridTileRow> = tiles
            .iter()
            .map(|t| NewGridTileRow {
                grid_id,
                name: t.name.clone(),
                ra: t.ra,
                dec: t.dec,
            })
            .collect();
        self.with_conn(move |conn| {
            conn.transaction::<usize, RepositoryError, _>(|conn| {
                let inserted = diesel::insert_into(grid_tiles::table)
                    .values(&rows)
                    .execute(conn)?;
                Ok(inserted)
            })
        })
        .await
    }

    async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> RepositoryResult<UserRecord> {
        let new_row = NewUserRow {
            username: username.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        };
        self.with_conn(move |conn| {
            conn.transaction::<UserRecord, RepositoryError, _>(|conn| {
                diesel::insert_into(users::table)
                    .values(&new_row)
                    .on_conflict(users::username)
                    .do_nothing()
                    .execute(conn)?;

                let row: UserRow = users::table
                    .filter(users::username.eq(&new_row.username))
                    .select(UserRow::as_select())
                    .first(conn)?;
                Ok(UserRecord::from(row))
            })
        })
        .await
    }

    async fn store_plan(&self, plan: &ObservationPlan) -> RepositoryResult<StoredPlan> {
        let plan = plan.clone();
        self.with_conn(move |conn| {
            conn.transaction::<StoredPlan, RepositoryError, _>(|conn| {
                let event_row = NewEventRow {
                    name: plan.event.name.clone(),
                    ivorn: plan.event.ivorn.clone(),
                    source: plan.event.source.clone(),
                    event_type: plan.event.event_type.as_str().to_string(),
                    time: plan.event.time,
                    skymap: plan.event.skymap.clone(),
                };
                let event_id: i64 = diesel::insert_into(events::table)
                    .values(&event_row)
                    .returning(events::id)
                    .get_result(conn)?;

                let survey_id = match &plan.survey {
                    Some(survey) => {
                        let id: i64 = diesel::insert_into(surveys::table)
                            .values(&NewSurveyRow {
                                name: survey.name.clone(),
                                grid_id: survey.grid_id,
                                event_id,
                            })
                            .returning(surveys::id)
                            .get_result(conn)?;
                        Some(id)
                    }
                    None => None,
                };

                let mut mpointing_ids = Vec::with_capacity(plan.mpointings.len());
                for planned in &plan.mpointings {
                    let survey_tile_id = match &planned.tile {
                        Some(tile) => {
                            let survey_id = survey_id.ok_or_else(|| {
                                RepositoryError::validation_with_context(
                                    "Tiled mpointing requires a survey",
                                    ErrorContext::new("store_plan").with_entity("survey_tile"),
                                )
                            })?;
                            let id: i64 = diesel::insert_into(survey_tiles::table)
                                .values(&NewSurveyTileRow {
                                    survey_id,
                                    grid_tile_id: tile.grid_tile_id,
                                    weight: tile.weight,
                                })
                                .returning(survey_tiles::id)
                                .get_result(conn)?;
                            Some(id)
                        }
                        None => None,
                    };

                    let wait_time = serde_json::to_value(&planned.params.wait_time)
                        .map_err(|e| {
                            RepositoryError::internal(format!(
                                "Failed to serialize wait_time: {e}"
                            ))
                        })?;
                    let grid_tile_id = planned.tile.as_ref().map(|t| t.grid_tile_id);

                    let mpointing_id: i64 = diesel::insert_into(mpointings::table)
                        .values(&NewMpointingRow {
                            object_name: planned.object_name.clone(),
                            ra: planned.ra,
                            dec: planned.dec,
                            user_id: plan.user_id,
                            event_id,
                            grid_tile_id,
                            survey_tile_id,
                            status: MpointingStatus::Scheduled.as_str().to_string(),
                            too: planned.params.too,
                            min_time: planned.params.min_time,
                            valid_time: planned.params.valid_time,
                            start_time: planned.params.start_time.clone(),
                            stop_time: planned.params.stop_time.clone(),
                            start_rank: planned.params.start_rank,
                            num_todo: planned.params.num_todo,
                            wait_time,
                            max_sunalt: planned.params.max_sunalt,
                            min_alt: planned.params.min_alt,
                            min_moonsep: planned.params.min_moonsep,
                            max_moon: planned.params.max_moon.clone(),
                        })
                        .returning(mpointings::id)
                        .get_result(conn)?;
                    mpointing_ids.push(mpointing_id);

                    let exposure_rows: Vec<NewExposureSetRow> = planned
                        .exposure_sets
                        .iter()
                        .map(|exp| NewExposureSetRow {
                            mpointing_id,
                            num_exp: exp.num_exp,
                            exptime: exp.exptime,
                            filt: exp.filt.clone(),
                            binning: exp.binning,
                            imgtype: exp.imgtype.clone(),
                        })
                        .collect();
                    diesel::insert_into(exposure_sets::table)
                        .values(&exposure_rows)
                        .execute(conn)?;

                    // First pointing: queued immediately, ahead of the scheduler
                    diesel::insert_into(pointings::table)
                        .values(&NewPointingRow {
                            mpointing_id,
                            event_id,
                            grid_tile_id,
                            survey_tile_id,
                            object_name: planned.object_name.clone(),
                            status: PointingStatus::Pending.as_str().to_string(),
                            rank: planned.params.start_rank,
                        })
                        .execute(conn)?;
                }

                Ok(StoredPlan {
                    event_id,
                    survey_id,
                    mpointing_ids,
                })
            })
        })
        .await
    }

    async fn mpointings_for_event(
        &self,
        event_id: i64,
    ) -> RepositoryResult<Vec<MpointingRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<MpointingRow> = mpointings::table
                .filter(mpointings::event_id.eq(event_id))
                .order(mpointings::id.asc())
                .select(MpointingRow::as_select())
                .load(conn)?;
            rows.into_iter().map(row_to_mpointing).collect()
        })
        .await
    }

    async fn pointings_for_event(&self, event_id: i64) -> RepositoryResult<Vec<PointingRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<PointingRow> = pointings::table
                .filter(pointings::event_id.eq(event_id))
                .order(pointings::id.asc())
                .select(PointingRow::as_select())
                .load(conn)?;
            rows.into_iter().map(row_to_pointing).collect()
        })
        .await
    }

    async fn exposure_sets_for_mpointing(
        &self,
        mpointing_id: i64,
    ) -> RepositoryResult<Vec<ExposureSetRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<ExposureSetRow> = exposure_sets::table
                .filter(exposure_sets::mpointing_id.eq(mpointing_id))
                .order(exposure_sets::id.asc())
                .select(ExposureSetRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(ExposureSetRecord::from).collect())
        })
        .await
    }

    async fn surveys_for_event(&self, event_id: i64) -> RepositoryResult<Vec<SurveyRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<SurveyRow> = surveys::table
                .filter(surveys::event_id.eq(event_id))
                .order(surveys::id.asc())
                .select(SurveyRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(SurveyRecord::from).collect())
        })
        .await
    }

    async fn survey_tiles_for_survey(
        &self,
        survey_id: i64,
    ) -> RepositoryResult<Vec<SurveyTileRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<SurveyTileRow> = survey_tiles::table
                .filter(survey_tiles::survey_id.eq(survey_id))
                .order(survey_tiles::weight.desc())
                .select(SurveyTileRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(SurveyTileRecord::from).collect())
        })
        .await
    }

    async fn update_pointing_status(
        &self,
        pointing_id: i64,
        status: PointingStatus,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let updated = diesel::update(pointings::table.filter(pointings::id.eq(pointing_id)))
                .set(pointings::status.eq(status.as_str()))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::not_found_with_context(
                    format!("Pointing {} not found", pointing_id),
                    ErrorContext::new("update_pointing_status").with_entity("pointing"),
                ));
            }
            Ok(())
        })
        .await
    }
}

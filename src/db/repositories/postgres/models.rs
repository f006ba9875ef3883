use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::schema::{
    events, exposure_sets, grid_tiles, grids, mpointings, pointings, survey_tiles, surveys, users,
};
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{
    EventRecord, EventType, ExposureSetRecord, GridRecord, GridTileRecord, MpointingParams,
    MpointingRecord, MpointingStatus, PointingRecord, PointingStatus, SurveyRecord,
    SurveyTileRecord, UserRecord, WaitTime,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // Some fields used only for database operations
pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub ivorn: String,
    pub source: String,
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub skymap: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            ivorn: row.ivorn,
            source: row.source,
            event_type: EventType::parse(&row.event_type),
            time: row.time,
            skymap: row.skymap,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    pub name: String,
    pub ivorn: String,
    pub source: String,
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub skymap: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = grids)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GridRow {
    pub id: i64,
    pub name: String,
    pub ra_fov: f64,
    pub dec_fov: f64,
    pub ra_overlap: f64,
    pub dec_overlap: f64,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

impl From<GridRow> for GridRecord {
    fn from(row: GridRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            ra_fov: row.ra_fov,
            dec_fov: row.dec_fov,
            ra_overlap: row.ra_overlap,
            dec_overlap: row.dec_overlap,
            algorithm: row.algorithm,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = grids)]
pub struct NewGridRow {
    pub name: String,
    pub ra_fov: f64,
    pub dec_fov: f64,
    pub ra_overlap: f64,
    pub dec_overlap: f64,
    pub algorithm: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = grid_tiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GridTileRow {
    pub id: i64,
    pub grid_id: i64,
    pub name: String,
    pub ra: f64,
    pub dec: f64,
}

impl From<GridTileRow> for GridTileRecord {
    fn from(row: GridTileRow) -> Self {
        Self {
            id: row.id,
            grid_id: row.grid_id,
            name: row.name,
            ra: row.ra,
            dec: row.dec,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = grid_tiles)]
pub struct NewGridTileRow {
    pub grid_id: i64,
    pub name: String,
    pub ra: f64,
    pub dec: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = surveys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SurveyRow {
    pub id: i64,
    pub name: String,
    pub grid_id: i64,
    pub event_id: i64,
}

impl From<SurveyRow> for SurveyRecord {
    fn from(row: SurveyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            grid_id: row.grid_id,
            event_id: row.event_id,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = surveys)]
pub struct NewSurveyRow {
    pub name: String,
    pub grid_id: i64,
    pub event_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = survey_tiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SurveyTileRow {
    pub id: i64,
    pub survey_id: i64,
    pub grid_tile_id: i64,
    pub weight: f64,
}

impl From<SurveyTileRow> for SurveyTileRecord {
    fn from(row: SurveyTileRow) -> Self {
        Self {
            id: row.id,
            survey_id: row.survey_id,
            grid_tile_id: row.grid_tile_id,
            weight: row.weight,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = survey_tiles)]
pub struct NewSurveyTileRow {
    pub survey_id: i64,
    pub grid_tile_id: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password: row.password,
            full_name: row.full_name,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = mpointings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // Some fields used only for database operations
pub struct MpointingRow {
    pub id: i64,
    pub object_name: String,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub user_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub status: String,
    pub too: bool,
    pub min_time: f64,
    pub valid_time: f64,
    pub start_time: String,
    pub stop_time: String,
    pub start_rank: i32,
    pub num_todo: i32,
    pub wait_time: Value,
    pub max_sunalt: f64,
    pub min_alt: f64,
    pub min_moonsep: f64,
    pub max_moon: String,
    pub created_at: DateTime<Utc>,
}

pub fn row_to_mpointing(row: MpointingRow) -> RepositoryResult<MpointingRecord> {
    let status = MpointingStatus::parse(&row.status).ok_or_else(|| {
        RepositoryError::internal(format!("Unknown mpointing status '{}'", row.status))
    })?;
    let wait_time: WaitTime = serde_json::from_value(row.wait_time)
        .map_err(|e| RepositoryError::internal(format!("Failed to parse wait_time JSON: {e}")))?;

    Ok(MpointingRecord {
        id: row.id,
        object_name: row.object_name,
        ra: row.ra,
        dec: row.dec,
        user_id: row.user_id,
        event_id: row.event_id,
        grid_tile_id: row.grid_tile_id,
        survey_tile_id: row.survey_tile_id,
        status,
        params: MpointingParams {
            too: row.too,
            min_time: row.min_time,
            valid_time: row.valid_time,
            start_time: row.start_time,
            stop_time: row.stop_time,
            start_rank: row.start_rank,
            num_todo: row.num_todo,
            wait_time,
            max_sunalt: row.max_sunalt,
            min_alt: row.min_alt,
            min_moonsep: row.min_moonsep,
            max_moon: row.max_moon,
        },
    })
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mpointings)]
pub struct NewMpointingRow {
    pub object_name: String,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub user_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub status: String,
    pub too: bool,
    pub min_time: f64,
    pub valid_time: f64,
    pub start_time: String,
    pub stop_time: String,
    pub start_rank: i32,
    pub num_todo: i32,
    pub wait_time: Value,
    pub max_sunalt: f64,
    pub min_alt: f64,
    pub min_moonsep: f64,
    pub max_moon: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = exposure_sets)]
pub struct NewExposureSetRow {
    pub mpointing_id: i64,
    pub num_exp: i32,
    pub exptime: f64,
    pub filt: String,
    pub binning: i32,
    pub imgtype: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = exposure_sets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)]
pub struct ExposureSetRow {
    pub id: i64,
    pub mpointing_id: i64,
    pub num_exp: i32,
    pub exptime: f64,
    pub filt: String,
    pub binning: i32,
    pub imgtype: String,
}

impl From<ExposureSetRow> for ExposureSetRecord {
    fn from(row: ExposureSetRow) -> Self {
        Self {
            id: row.id,
            mpointing_id: row.mpointing_id,
            num_exp: row.num_exp,
            exptime: row.exptime,
            filt: row.filt,
            binning: row.binning,
            imgtype: row.imgtype,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pointings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // Some fields used only for database operations
pub struct PointingRow {
    pub id: i64,
    pub mpointing_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub object_name: String,
    pub status: String,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
}

pub fn row_to_pointing(row: PointingRow) -> RepositoryResult<PointingRecord> {
    let status = PointingStatus::parse(&row.status).ok_or_else(|| {
        RepositoryError::internal(format!("Unknown pointing status '{}'", row.status))
    })?;

    Ok(PointingRecord {
        id: row.id,
        mpointing_id: row.mpointing_id,
        event_id: row.event_id,
        grid_tile_id: row.grid_tile_id,
        survey_tile_id: row.survey_tile_id,
        object_name: row.object_name,
        status,
        rank: row.rank,
    })
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pointings)]
pub struct NewPointingRow {
    pub mpointing_id: i64,
    pub event_id: i64,
    pub grid_tile_id: Option<i64>,
    pub survey_tile_id: Option<i64>,
    pub object_name: String,
    pub status: String,
    pub rank: i32,
}

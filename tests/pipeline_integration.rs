//! End-to-end pipeline tests over the in-memory repository and a canned
//! grid engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use obsalert::config::PipelineConfig;
use obsalert::db::repositories::LocalRepository;
use obsalert::db::AlertRepository;
use obsalert::grid::{GridError, SkyGrid, SkyGridEngine, SkyMap, SkymapStore, TileRow, TileTable};
use obsalert::grid::GridSpec;
use obsalert::models::{
    Event, EventType, MpointingStatus, NewEvent, NewGrid, NewGridTile, PointingStatus,
};
use obsalert::services::{AlertPipeline, PipelineError, PlanOutcome};

// ==================== Fakes ====================

#[derive(Clone)]
struct CannedEngine {
    /// (tile name, contained probability, contour values)
    tiles: Vec<(String, f64, Vec<f64>)>,
}

struct CannedGrid {
    rows: Vec<TileRow>,
    contours: HashMap<String, Vec<f64>>,
}

impl SkyGridEngine for CannedEngine {
    fn build_grid(&self, _spec: &GridSpec) -> Result<Box<dyn SkyGrid>, GridError> {
        let rows = self
            .tiles
            .iter()
            .enumerate()
            .map(|(i, (name, prob, _))| TileRow {
                name: name.clone(),
                ra: i as f64 * 10.0,
                dec: 0.0,
                prob: *prob,
            })
            .collect();
        let contours = self
            .tiles
            .iter()
            .map(|(name, _, contours)| (name.clone(), contours.clone()))
            .collect();
        Ok(Box::new(CannedGrid { rows, contours }))
    }
}

impl SkyGrid for CannedGrid {
    fn apply_skymap(&mut self, _skymap: &SkyMap) -> Result<(), GridError> {
        Ok(())
    }

    fn tile_table(&self) -> TileTable {
        TileTable::new(self.rows.clone())
    }

    fn tile_contours(&self, tile_name: &str) -> Result<Vec<f64>, GridError> {
        self.contours
            .get(tile_name)
            .cloned()
            .ok_or_else(|| GridError::UnknownTile(tile_name.to_string()))
    }

    fn tile_names(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.name.clone()).collect()
    }
}

/// Skymap store that must never be hit: test events carry their map inline.
struct NoFetchStore;

#[async_trait]
impl SkymapStore for NoFetchStore {
    async fn fetch(&self, url: &str) -> Result<SkyMap, GridError> {
        Err(GridError::FetchFailed {
            url: url.to_string(),
            message: "fetching disabled in tests".to_string(),
        })
    }
}

// ==================== Builders ====================

fn default_tiles() -> Vec<(String, f64, Vec<f64>)> {
    vec![
        ("T0001".to_string(), 0.45, vec![0.1, 0.2]),
        ("T0002".to_string(), 0.30, vec![0.3]),
        ("T0003".to_string(), 0.15, vec![0.95, 0.99]), // outside credible region
        ("T0004".to_string(), 0.02, vec![0.4]),
    ]
}

fn pipeline(repo: &LocalRepository, tiles: Vec<(String, f64, Vec<f64>)>) -> AlertPipeline {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    AlertPipeline::new(
        Arc::new(repo.clone()),
        Arc::new(CannedEngine { tiles }),
        Arc::new(NoFetchStore),
        PipelineConfig::default(),
    )
}

async fn seed_grid(repo: &LocalRepository) -> i64 {
    let grid = repo
        .insert_grid(&NewGrid {
            name: "GOTO-4".to_string(),
            ra_fov: 3.7,
            dec_fov: 4.9,
            ra_overlap: 0.1,
            dec_overlap: 0.1,
            algorithm: "minverlap".to_string(),
        })
        .await
        .unwrap();
    let tiles: Vec<NewGridTile> = (1..=4)
        .map(|i| NewGridTile {
            name: format!("T{:04}", i),
            ra: i as f64 * 10.0,
            dec: 0.0,
        })
        .collect();
    repo.insert_grid_tiles(grid.id, &tiles).await.unwrap();
    grid.id
}

fn grid_strategy(tile_limit: usize, prob_limit: f64) -> serde_json::Value {
    json!({
        "on_grid": true,
        "tile_limit": tile_limit,
        "prob_limit": prob_limit,
        "exposure_sets": [
            {"num_exp": 2, "exptime": 60.0, "filt": "L"},
            {"num_exp": 1, "exptime": 10.0, "filt": "R"}
        ],
        "cadence": {"num_todo": 99, "wait_time": 60.0},
        "constraints": {
            "max_sunalt": -12.0,
            "min_alt": 30.0,
            "min_moonsep": 10.0,
            "max_moon": "BRIGHT"
        },
        "start_time": "2019-05-10T02:59:39",
        "stop_time": "2019-05-13T02:59:39",
        "rank": 2
    })
}

fn gw_event(name: &str, ivorn: &str, strategy: serde_json::Value) -> Event {
    Event {
        name: name.to_string(),
        ivorn: ivorn.to_string(),
        source: "LVC".to_string(),
        event_type: EventType::Gw,
        time: Utc.with_ymd_and_hms(2019, 5, 10, 2, 59, 39).unwrap(),
        coord: None,
        skymap_url: None,
        skymap: Some(SkyMap {
            object: name.to_string(),
            url: None,
            nside: 64,
            pixels: vec![],
        }),
        strategy,
    }
}

fn retraction(name: &str, ivorn: &str) -> Event {
    Event {
        event_type: EventType::GwRetraction,
        skymap: None,
        strategy: serde_json::Value::Null,
        ..gw_event(name, ivorn, serde_json::Value::Null)
    }
}

// ==================== Tiled scheduling ====================

#[tokio::test]
async fn test_tiled_event_creates_full_plan() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let outcome = pipeline.handle_event(&event).await.unwrap();

    let (event_id, survey_id, mpointing_ids) = match outcome {
        PlanOutcome::Scheduled {
            event_id,
            survey_id,
            mpointing_ids,
        } => (event_id, survey_id.unwrap(), mpointing_ids),
        other => panic!("expected Scheduled, got {:?}", other),
    };

    // T0003 fails the containment mask; the rest schedule, best tile first.
    let mpointings = repo.mpointings_for_event(event_id).await.unwrap();
    assert_eq!(mpointings.len(), 3);
    assert_eq!(mpointings.len(), mpointing_ids.len());
    assert_eq!(mpointings[0].object_name, "LVC_S190510g_T0001");
    assert_eq!(mpointings[1].object_name, "LVC_S190510g_T0002");
    assert_eq!(mpointings[2].object_name, "LVC_S190510g_T0004");

    for mp in &mpointings {
        assert_eq!(mp.status, MpointingStatus::Scheduled);
        assert!(mp.ra.is_none());
        assert!(mp.grid_tile_id.is_some());
        assert!(mp.survey_tile_id.is_some());
        assert!(mp.params.too);
        assert_eq!(mp.params.min_time, 220.0);
        assert_eq!(mp.params.valid_time, -1.0);

        // Each request owns its own exposure sets and exactly one first
        // pointing, queued immediately.
        let exposures = repo.exposure_sets_for_mpointing(mp.id).await.unwrap();
        assert_eq!(exposures.len(), 2);
        assert_eq!(exposures[0].filt, "L");
        assert_eq!(exposures[0].binning, 1);
        assert_eq!(exposures[0].imgtype, "SCIENCE");
    }

    let pointings = repo.pointings_for_event(event_id).await.unwrap();
    assert_eq!(pointings.len(), 3);
    for p in &pointings {
        assert_eq!(p.status, PointingStatus::Pending);
        assert_eq!(p.rank, 2);
    }

    // Survey chain: one survey on the grid, one weighted tile per request.
    let surveys = repo.surveys_for_event(event_id).await.unwrap();
    assert_eq!(surveys.len(), 1);
    assert_eq!(surveys[0].id, survey_id);
    let survey_tiles = repo.survey_tiles_for_survey(survey_id).await.unwrap();
    assert_eq!(survey_tiles.len(), 3);
    assert_eq!(survey_tiles[0].weight, 0.45);
}

#[tokio::test]
async fn test_tile_limit_truncates_to_best_tiles() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(1, 0.0));
    let outcome = pipeline.handle_event(&event).await.unwrap();

    match outcome {
        PlanOutcome::Scheduled {
            event_id,
            mpointing_ids,
            ..
        } => {
            assert_eq!(mpointing_ids.len(), 1);
            let mpointings = repo.mpointings_for_event(event_id).await.unwrap();
            assert_eq!(mpointings[0].object_name, "LVC_S190510g_T0001");
        }
        other => panic!("expected Scheduled, got {:?}", other),
    }
}

#[tokio::test]
async fn test_prob_limit_can_exhaust_all_tiles() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    // Floor above the best tile's 0.45: everything drops, event still lands.
    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.5));
    let outcome = pipeline.handle_event(&event).await.unwrap();

    match outcome {
        PlanOutcome::NoActionableTiles {
            event_id,
            best_missed_prob,
        } => {
            assert_eq!(best_missed_prob, Some(0.45));
            assert!(repo.event_by_ivorn(&event.ivorn).await.unwrap().is_some());
            assert!(repo.mpointings_for_event(event_id).await.unwrap().is_empty());
            assert!(repo.surveys_for_event(event_id).await.unwrap().is_empty());
        }
        other => panic!("expected NoActionableTiles, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_grid_defined_is_an_error() {
    let repo = LocalRepository::new();
    let pipeline = pipeline(&repo, default_tiles());

    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let err = pipeline.handle_event(&event).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoGridDefined));
    assert_eq!(repo.event_count(), 0);
}

// ==================== Coordinate scheduling ====================

#[tokio::test]
async fn test_off_grid_event_schedules_at_its_coordinates() {
    let repo = LocalRepository::new();
    let pipeline = pipeline(&repo, default_tiles());

    let mut strategy = grid_strategy(50, 0.0);
    strategy["on_grid"] = json!(false);
    let mut event = gw_event("Swift_123456", "ivo://nasa.gsfc/SWIFT#BAT_123456", strategy);
    event.event_type = EventType::Grb;
    event.source = "Swift".to_string();
    event.coord = Some(obsalert::models::EquatorialCoord {
        ra_deg: 150.1,
        dec_deg: -21.5,
    });

    let outcome = pipeline.handle_event(&event).await.unwrap();
    let event_id = match outcome {
        PlanOutcome::Scheduled {
            event_id,
            survey_id,
            mpointing_ids,
        } => {
            assert!(survey_id.is_none());
            assert_eq!(mpointing_ids.len(), 1);
            event_id
        }
        other => panic!("expected Scheduled, got {:?}", other),
    };

    let mpointings = repo.mpointings_for_event(event_id).await.unwrap();
    assert_eq!(mpointings[0].object_name, "Swift_123456");
    assert_eq!(mpointings[0].ra, Some(150.1));
    assert_eq!(mpointings[0].dec, Some(-21.5));
    assert!(mpointings[0].grid_tile_id.is_none());
    assert!(repo.surveys_for_event(event_id).await.unwrap().is_empty());
}

// ==================== Deduplication ====================

#[tokio::test]
async fn test_update_notice_retires_previous_requests() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let first = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let first_id = match pipeline.handle_event(&first).await.unwrap() {
        PlanOutcome::Scheduled { event_id, .. } => event_id,
        other => panic!("expected Scheduled, got {:?}", other),
    };

    let update = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-2", grid_strategy(50, 0.0));
    let second_id = match pipeline.handle_event(&update).await.unwrap() {
        PlanOutcome::Scheduled { event_id, .. } => event_id,
        other => panic!("expected Scheduled, got {:?}", other),
    };

    // First notice's work is soft-deleted, rows still present.
    for mp in repo.mpointings_for_event(first_id).await.unwrap() {
        assert_eq!(mp.status, MpointingStatus::Deleted);
    }
    for p in repo.pointings_for_event(first_id).await.unwrap() {
        assert_eq!(p.status, PointingStatus::Deleted);
    }

    // Second notice's work is live.
    for mp in repo.mpointings_for_event(second_id).await.unwrap() {
        assert_eq!(mp.status, MpointingStatus::Scheduled);
    }
}

#[tokio::test]
async fn test_running_pointing_survives_dedup() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let first = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let first_id = match pipeline.handle_event(&first).await.unwrap() {
        PlanOutcome::Scheduled { event_id, .. } => event_id,
        other => panic!("expected Scheduled, got {:?}", other),
    };

    // One visit is on sky when the update arrives.
    let pointings = repo.pointings_for_event(first_id).await.unwrap();
    repo.update_pointing_status(pointings[0].id, PointingStatus::Running)
        .await
        .unwrap();

    let update = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-2", grid_strategy(50, 0.0));
    pipeline.handle_event(&update).await.unwrap();

    let after = repo.pointings_for_event(first_id).await.unwrap();
    assert_eq!(after[0].status, PointingStatus::Running);
    for p in &after[1..] {
        assert_eq!(p.status, PointingStatus::Deleted);
    }
}

#[tokio::test]
async fn test_duplicate_ivorn_rejected_and_database_unchanged() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let first_id = match pipeline.handle_event(&event).await.unwrap() {
        PlanOutcome::Scheduled { event_id, .. } => event_id,
        other => panic!("expected Scheduled, got {:?}", other),
    };

    let events_before = repo.event_count();
    let mpointings_before = repo.mpointing_count();

    let err = pipeline.handle_event(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateIdentifier(_)));

    // Nothing changed, including the first notice's still-live requests.
    assert_eq!(repo.event_count(), events_before);
    assert_eq!(repo.mpointing_count(), mpointings_before);
    for mp in repo.mpointings_for_event(first_id).await.unwrap() {
        assert_eq!(mp.status, MpointingStatus::Scheduled);
    }
}

#[tokio::test]
async fn test_storage_enforces_ivorn_uniqueness() {
    // The application-level duplicate check races; the storage constraint is
    // the real guard.
    let repo = LocalRepository::new();
    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));

    repo.insert_event(&NewEvent::from(&event)).await.unwrap();
    let err = repo.insert_event(&NewEvent::from(&event)).await.unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(repo.event_count(), 1);
}

// ==================== Retractions ====================

#[tokio::test]
async fn test_retraction_retires_and_records_event_only() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let first = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let first_id = match pipeline.handle_event(&first).await.unwrap() {
        PlanOutcome::Scheduled { event_id, .. } => event_id,
        other => panic!("expected Scheduled, got {:?}", other),
    };

    let outcome = pipeline
        .handle_event(&retraction("LVC_S190510g", "ivo://gwnet/LVC#S190510g-3"))
        .await
        .unwrap();

    let retraction_id = match outcome {
        PlanOutcome::Retraction { event_id } => event_id,
        other => panic!("expected Retraction, got {:?}", other),
    };

    for mp in repo.mpointings_for_event(first_id).await.unwrap() {
        assert_eq!(mp.status, MpointingStatus::Deleted);
    }
    assert!(repo.mpointings_for_event(retraction_id).await.unwrap().is_empty());
    assert!(repo.surveys_for_event(retraction_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_retraction_is_harmless() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let first = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    pipeline.handle_event(&first).await.unwrap();

    pipeline
        .handle_event(&retraction("LVC_S190510g", "ivo://gwnet/LVC#S190510g-3"))
        .await
        .unwrap();
    let mpointings_after_first = repo.mpointing_count();

    // A second retraction notice finds nothing left to retire.
    pipeline
        .handle_event(&retraction("LVC_S190510g", "ivo://gwnet/LVC#S190510g-4"))
        .await
        .unwrap();

    assert_eq!(repo.mpointing_count(), mpointings_after_first);
    assert_eq!(repo.event_count(), 3);
}

// ==================== Atomicity ====================

#[tokio::test]
async fn test_storage_failure_leaves_no_partial_plan() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    repo.fail_next_store();
    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let err = pipeline.handle_event(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::Repository(_)));

    assert_eq!(repo.event_count(), 0);
    assert_eq!(repo.survey_count(), 0);
    assert_eq!(repo.mpointing_count(), 0);

    // The same notice ingests cleanly afterwards.
    let outcome = pipeline.handle_event(&event).await.unwrap();
    assert!(matches!(outcome, PlanOutcome::Scheduled { .. }));
}

#[tokio::test]
async fn test_malformed_strategy_fails_before_any_write() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let mut strategy = grid_strategy(50, 0.0);
    strategy.as_object_mut().unwrap().remove("constraints");
    let event = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", strategy);

    let err = pipeline.handle_event(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedStrategy(_)));
    assert_eq!(repo.event_count(), 0);
}

// ==================== User handling ====================

#[tokio::test]
async fn test_automation_user_created_once() {
    let repo = LocalRepository::new();
    seed_grid(&repo).await;
    let pipeline = pipeline(&repo, default_tiles());

    let first = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-1", grid_strategy(50, 0.0));
    let second = gw_event("LVC_S190510g", "ivo://gwnet/LVC#S190510g-2", grid_strategy(50, 0.0));
    pipeline.handle_event(&first).await.unwrap();
    pipeline.handle_event(&second).await.unwrap();

    let user = repo.ensure_user("autoalert", "autoalert", "Automated alerts").await.unwrap();
    let first_id = repo
        .event_by_ivorn(&first.ivorn)
        .await
        .unwrap()
        .unwrap()
        .id;
    for mp in repo.mpointings_for_event(first_id).await.unwrap() {
        assert_eq!(mp.user_id, user.id);
    }
}

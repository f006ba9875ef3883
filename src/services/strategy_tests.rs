#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::models::{Event, EventType, WaitTime};
    use crate::services::strategy::derive_plan;
    use crate::services::PipelineError;

    fn event_with_strategy(strategy: serde_json::Value) -> Event {
        Event {
            name: "LVC_S190510g".to_string(),
            ivorn: "ivo://gwnet/LVC#S190510g-1-Initial".to_string(),
            source: "LVC".to_string(),
            event_type: EventType::Gw,
            time: Utc.with_ymd_and_hms(2019, 5, 10, 2, 59, 39).unwrap(),
            coord: None,
            skymap_url: None,
            skymap: None,
            strategy,
        }
    }

    fn grid_strategy() -> serde_json::Value {
        json!({
            "on_grid": true,
            "tile_limit": 50,
            "prob_limit": 0.0,
            "exposure_sets": [
                {"num_exp": 2, "exptime": 60.0, "filt": "L"},
                {"num_exp": 1, "exptime": 10.0, "filt": "R"}
            ],
            "cadence": {"num_todo": 99, "wait_time": [60.0, 120.0]},
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

    #[test]
    fn test_min_time_sums_exposures_with_readout() {
        let event = event_with_strategy(grid_strategy());
        let spec = derive_plan(&event, 30.0).unwrap();

        // 2 * (60 + 30) + 1 * (10 + 30)
        assert_eq!(spec.params.min_time, 220.0);
    }

    #[test]
    fn test_fixed_fields() {
        let event = event_with_strategy(grid_strategy());
        let spec = derive_plan(&event, 30.0).unwrap();

        assert!(spec.params.too);
        assert_eq!(spec.params.valid_time, -1.0);
        assert_eq!(spec.params.start_rank, 2);
        assert_eq!(spec.params.num_todo, 99);
        for exp in &spec.exposure_sets {
            assert_eq!(exp.binning, 1);
            assert_eq!(exp.imgtype, "SCIENCE");
        }
    }

    #[test]
    fn test_wait_time_sequence_preserved() {
        let event = event_with_strategy(grid_strategy());
        let spec = derive_plan(&event, 30.0).unwrap();

        assert_eq!(
            spec.params.wait_time,
            WaitTime::Sequence(vec![60.0, 120.0])
        );
    }

    #[test]
    fn test_missing_cadence_is_malformed() {
        let mut strategy = grid_strategy();
        strategy.as_object_mut().unwrap().remove("cadence");
        let event = event_with_strategy(strategy);

        let err = derive_plan(&event, 30.0).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedStrategy(_)));
    }

    #[test]
    fn test_on_grid_requires_tile_limit() {
        let mut strategy = grid_strategy();
        strategy.as_object_mut().unwrap().remove("tile_limit");
        let event = event_with_strategy(strategy);

        let err = derive_plan(&event, 30.0).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedStrategy(_)));
    }

    #[test]
    fn test_negative_num_exp_is_malformed() {
        let mut strategy = grid_strategy();
        strategy["exposure_sets"][0]["num_exp"] = json!(-1);
        let event = event_with_strategy(strategy);

        let err = derive_plan(&event, 30.0).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedStrategy(_)));
    }

    #[test]
    fn test_zero_overhead() {
        let event = event_with_strategy(grid_strategy());
        let spec = derive_plan(&event, 0.0).unwrap();

        assert_eq!(spec.params.min_time, 130.0);
    }
}

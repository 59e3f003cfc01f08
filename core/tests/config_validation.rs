//! Configuration loading and validation.

use fraudwatch_core::{
    config::{EngineConfig, MAX_MERGE_WINDOW_HOURS, MAX_VELOCITY_WINDOW_MINUTES},
    engine::FraudEngine,
    error::EngineError,
    rules::{HourWindow, RuleKind, RuleSet},
};

fn data_dir() -> String {
    format!("{}/../data", env!("CARGO_MANIFEST_DIR"))
}

fn assert_invalid(config: &EngineConfig) {
    match config.validate() {
        Err(EngineError::InvalidConfiguration { .. }) => {}
        other => panic!("expected InvalidConfiguration, got {other:?}"),
    }
    assert!(FraudEngine::new(config).is_err());
}

#[test]
fn default_test_config_is_valid() {
    EngineConfig::default_test().validate().expect("default config validates");
}

#[test]
fn shipped_config_loads() {
    let config = EngineConfig::load(&data_dir()).expect("data/ config loads");
    assert_eq!(config.thresholds.flag_threshold, 50.0);
    assert_eq!(config.thresholds.block_threshold, 80.0);

    let rules = RuleSet::from_configs(&config.rules).expect("rules compile");
    assert_eq!(rules.len(), 6);
    assert_eq!(rules.enabled_count(), 5);
    assert_eq!(
        rules.get("R004").map(|r| r.kind.clone()),
        Some(RuleKind::Temporal {
            off_hours: Some(HourWindow { start: 23, end: 6 }),
            weekend: true,
        })
    );
}

#[test]
fn missing_data_dir_is_an_error() {
    let err = EngineConfig::load("/nonexistent/fraud-data").unwrap_err();
    assert!(err.to_string().contains("Cannot read"), "got {err}");
}

#[test]
fn block_threshold_must_exceed_flag_threshold() {
    let mut config = EngineConfig::default_test();
    config.thresholds.block_threshold = 50.0;
    assert_invalid(&config);

    config.thresholds.block_threshold = 30.0;
    assert_invalid(&config);
}

#[test]
fn thresholds_must_lie_in_score_range() {
    let mut config = EngineConfig::default_test();
    config.thresholds.flag_threshold = 0.0;
    assert_invalid(&config);

    let mut config = EngineConfig::default_test();
    config.thresholds.block_threshold = 120.0;
    config.thresholds.critical_cutoff = 120.0;
    assert_invalid(&config);
}

#[test]
fn severity_cutoffs_must_be_ordered() {
    let mut config = EngineConfig::default_test();
    config.thresholds.medium_cutoff = 90.0;
    assert_invalid(&config);

    let mut config = EngineConfig::default_test();
    config.thresholds.critical_cutoff = 70.0;
    assert_invalid(&config);
}

#[test]
fn negative_weight_is_rejected() {
    let mut config = EngineConfig::default_test();
    config.rules[2].weight = -1.0;
    assert_invalid(&config);
}

#[test]
fn malformed_rules_are_rejected() {
    let mut unknown_category = EngineConfig::default_test();
    unknown_category.rules[0].category = "ml_model".into();
    assert_invalid(&unknown_category);

    let mut missing_threshold = EngineConfig::default_test();
    missing_threshold.rules[1].threshold = None;
    assert_invalid(&missing_threshold);

    let mut geo_out_of_range = EngineConfig::default_test();
    geo_out_of_range.rules[2].threshold = Some(1.5);
    assert_invalid(&geo_out_of_range);

    let mut bad_hours = EngineConfig::default_test();
    bad_hours.rules[3].off_hours = Some(HourWindow { start: 22, end: 25 });
    assert_invalid(&bad_hours);

    let mut bad_measure = EngineConfig::default_test();
    bad_measure.rules[0].measure = Some("percent".into());
    assert_invalid(&bad_measure);

    let mut score_too_high = EngineConfig::default_test();
    score_too_high.rules[4].score = 150.0;
    assert_invalid(&score_too_high);
}

#[test]
fn feature_settings_are_validated() {
    let mut config = EngineConfig::default_test();
    config.features.velocity_window_minutes = 0;
    assert_invalid(&config);

    let mut config = EngineConfig::default_test();
    config.features.amount_floor = 0.0;
    assert_invalid(&config);

    let mut config = EngineConfig::default_test();
    config.features.history_window = 0;
    assert_invalid(&config);
}

#[test]
fn oversized_velocity_window_is_rejected_at_load() {
    let mut config = EngineConfig::default_test();
    config.features.velocity_window_minutes = 1_000_000_000_000;
    assert_invalid(&config);

    config.features.velocity_window_minutes = MAX_VELOCITY_WINDOW_MINUTES + 1;
    assert_invalid(&config);

    config.features.velocity_window_minutes = MAX_VELOCITY_WINDOW_MINUTES;
    config.validate().expect("longest window is accepted");
}

#[test]
fn merge_window_is_bounded() {
    let mut config = EngineConfig::default_test();
    config.cases.merge_window_hours = i64::MAX;
    assert_invalid(&config);
    assert!(config.merge_window().is_err());

    config.cases.merge_window_hours = -1;
    assert_invalid(&config);

    config.cases.merge_window_hours = MAX_MERGE_WINDOW_HOURS;
    assert_eq!(
        config.merge_window().expect("longest window is accepted"),
        chrono::Duration::hours(MAX_MERGE_WINDOW_HOURS)
    );
}

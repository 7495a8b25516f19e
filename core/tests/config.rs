//! Configuration loading and fail-fast validation.

use amlsynth_core::{
    config::{ConfigSources, GeneratorConfig, Span},
    engine::GenerationEngine,
    error::SimError,
};

const SEGMENTS: &str = include_str!("../../data/segments.json");
const REGIONS: &str = include_str!("../../data/regions.json");
const TYPOLOGIES: &str = include_str!("../../data/typologies.json");
const RULES: &str = include_str!("../../data/rules.json");
const GENERATION: &str = include_str!("../../data/generation.json");

fn parse_with(rules: &str, generation: &str) -> Result<GeneratorConfig, SimError> {
    parse_all(SEGMENTS, rules, generation)
}

fn parse_all(segments: &str, rules: &str, generation: &str) -> Result<GeneratorConfig, SimError> {
    GeneratorConfig::parse(&ConfigSources {
        segments,
        regions: REGIONS,
        typologies: TYPOLOGIES,
        rules,
        generation,
    })
}

fn expect_config_error(result: Result<GeneratorConfig, SimError>, needle: &str) {
    match result {
        Err(err) => {
            assert!(err.is_configuration(), "expected a configuration error, got {err}");
            let message = err.to_string();
            assert!(message.contains(needle), "error '{message}' does not mention '{needle}'");
        }
        Ok(_) => panic!("configuration containing '{needle}' problem was accepted"),
    }
}

#[test]
fn embedded_tables_load() {
    let config = GeneratorConfig::embedded().expect("embedded config");
    assert!(!config.segments.is_empty());
    assert!(!config.injections.is_empty());
    assert_eq!(config.compile_rules().expect("rules").len(), config.rules.len());
    assert_eq!(config.reporting_threshold("USD"), 10_000.0);
    assert_eq!(
        config.reporting_threshold("XYZ"),
        config.typologies.structuring.threshold,
        "unknown currencies fall back to the structuring threshold"
    );
}

#[test]
fn unknown_signal_in_a_rule_is_rejected() {
    let rules = RULES.replacen("\"structuring_score\"", "\"structuring_scroe\"", 1);
    expect_config_error(parse_with(&rules, GENERATION), "STRUCT_001");
}

#[test]
fn missing_field_is_rejected() {
    let generation = GENERATION.replacen("\"tolerance\": 0.05,", "", 1);
    expect_config_error(parse_with(RULES, &generation), "tolerance");
}

#[test]
fn segment_missing_a_field_is_rejected() {
    let segments = SEGMENTS.replacen("\"risk_weight\": 1.0,", "", 1);
    expect_config_error(parse_all(&segments, RULES, GENERATION), "segments.json");
}

#[test]
fn retention_above_one_is_rejected() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.typologies.rapid_movement.retention = Span { min: 0.95, max: 1.2 };
    let err = config.validate().expect_err("retention 1.2 accepted");
    assert!(err.is_configuration());
    assert!(err.to_string().contains("retention"), "unexpected message: {err}");
}

#[test]
fn mule_window_shorter_than_three_days_is_rejected() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.typologies.mule.window_days = 2;
    let err = config.validate().expect_err("two-day mule window accepted");
    assert!(err.is_configuration());
    assert!(err.to_string().contains("mule.window_days"), "unexpected message: {err}");

    config.typologies.mule.window_days = 3;
    config.validate().expect("three-day mule window");
}

#[test]
fn tier_targets_must_sum_to_one() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.calibration.targets.low = 0.5;
    let err = config.validate().expect_err("targets summing to 0.8 accepted");
    assert!(err.to_string().contains("calibration.targets"), "unexpected message: {err}");
}

#[test]
fn inverted_window_is_rejected_before_any_draw() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config.run.end_date = config.run.start_date - chrono::Duration::days(1);
    match GenerationEngine::build("bad-window".into(), config) {
        Err(err) => assert!(err.is_configuration(), "unexpected error {err}"),
        Ok(_) => panic!("engine built over an inverted window"),
    }
}

#[test]
fn missing_disposition_tier_is_rejected() {
    let mut config = GeneratorConfig::default_test().expect("config");
    config
        .cases
        .dispositions
        .false_positive
        .remove(&amlsynth_core::types::RiskTier::High);
    let err = config.validate().expect_err("missing tier accepted");
    assert!(err.to_string().contains("false_positive"), "unexpected message: {err}");
}

#[test]
fn load_reads_the_data_directory() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");
    let config = GeneratorConfig::load(dir).expect("load data dir");
    let embedded = GeneratorConfig::embedded().expect("embedded");
    assert_eq!(config.rules.len(), embedded.rules.len());
    assert_eq!(config.run.seed, embedded.run.seed);

    let missing = GeneratorConfig::load("/definitely/not/here");
    assert!(missing.is_err(), "loading a missing directory succeeded");
}

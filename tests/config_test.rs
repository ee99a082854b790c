// ABOUTME: Tests for engine configuration, verify rule files and environment loading
// ABOUTME: Threshold validation, JSON rule tables, env overrides and planner settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{dish, lunch_day_2, Fixture};
use nutriplan::config::environment::{Environment, LogLevel, PlannerConfig, ACTOR_ID_ENV};
use nutriplan::engine::config::{
    ConfigError, DietSelector, EngineConfig, VerifyCondition, VerifyRule, RULES_PATH_ENV,
};
use nutriplan::engine::propagation::{self, Classification};
use nutriplan::logging::{LogFormat, LoggingConfig};
use nutriplan::models::NutrientField;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const ENGINE_ENV_VARS: [&str; 7] = [
    "NUTRIPLAN_ADHERENCE_ON_TARGET",
    "NUTRIPLAN_ADHERENCE_BORDERLINE",
    "NUTRIPLAN_KCAL_SUM_TOLERANCE",
    "NUTRIPLAN_PROTEIN_KCAL_PER_G",
    "NUTRIPLAN_FAT_KCAL_PER_G",
    "NUTRIPLAN_CARBS_KCAL_PER_G",
    RULES_PATH_ENV,
];

fn clear_env() {
    for var in ENGINE_ENV_VARS {
        env::remove_var(var);
    }
    for var in ["ENVIRONMENT", "RUST_LOG", "LOG_FORMAT", ACTOR_ID_ENV] {
        env::remove_var(var);
    }
}

fn rules_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const BREAD_RULE: &str = r#"[
    {
        "name": "bread-review",
        "applies_to": { "type": "codes", "codes": ["diabetic"] },
        "condition": { "type": "dish_category", "categories": ["Bread"] },
        "note": "bread portions are reviewed for diabetic diets"
    }
]"#;

// ============================================================================
// Engine defaults and validation
// ============================================================================

#[test]
fn test_default_engine_config_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert!((config.adherence.on_target - 0.10).abs() < f64::EPSILON);
    assert!((config.adherence.borderline - 0.15).abs() < f64::EPSILON);
    assert_eq!(config.verify_rules.len(), 2);
    assert_eq!(config.verify_rules[0].name, "sodium-sensitive");
}

#[test]
fn test_inverted_adherence_bands_are_rejected() {
    let mut config = EngineConfig::default();
    config.adherence.on_target = 0.2;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidRange(_))));
}

#[test]
fn test_non_positive_energy_factor_is_rejected() {
    let mut config = EngineConfig::default();
    config.macro_energy.fat_kcal_per_g = 0.0;
    assert!(matches!(config.validate(), Err(ConfigError::ValueOutOfRange(_))));
}

#[test]
fn test_invalid_rules_are_rejected() {
    let mut config = EngineConfig::default();
    config.verify_rules.push(VerifyRule {
        name: "shrinking".into(),
        applies_to: DietSelector::All,
        condition: VerifyCondition::NutrientIncrease {
            field: NutrientField::Sugars,
            ratio: 0.5,
        },
        note: String::new(),
    });
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidRule { name, .. }) if name == "shrinking"
    ));

    let empty_codes = VerifyRule {
        name: "nobody".into(),
        applies_to: DietSelector::Codes { codes: Vec::new() },
        condition: VerifyCondition::MissingNutrition {
            field: NutrientField::Kcal,
        },
        note: String::new(),
    };
    assert!(empty_codes.validate().is_err());
}

#[test]
fn test_missing_nutrition_condition() {
    let condition = VerifyCondition::MissingNutrition {
        field: NutrientField::Salt,
    };
    let mystery = nutriplan::models::DishAssignment::new("mystery", "Mystery stew", 250.0);
    assert!(condition.holds(&[mystery], &[]));
    assert!(!condition.holds(&[dish("soup-a")], &[]));
}

// ============================================================================
// Rule files
// ============================================================================

#[test]
fn test_load_rules_file() {
    let file = rules_file(BREAD_RULE);
    let rules = EngineConfig::load_rules_file(file.path()).unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].applies_to,
        DietSelector::Codes {
            codes: vec!["diabetic".to_owned()]
        }
    );
}

#[test]
fn test_rule_file_errors() {
    let malformed = rules_file("{ not json");
    assert!(matches!(
        EngineConfig::load_rules_file(malformed.path()),
        Err(ConfigError::Json(_))
    ));

    let unnamed = rules_file(
        r#"[{ "name": " ", "applies_to": { "type": "all" }, "condition": { "type": "missing_nutrition", "field": "kcal" } }]"#,
    );
    assert!(matches!(
        EngineConfig::load_rules_file(unnamed.path()),
        Err(ConfigError::InvalidRule { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        EngineConfig::load_rules_file(dir.path().join("absent.json")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_custom_rule_table_drives_check_classification() {
    let file = rules_file(BREAD_RULE);
    let config = EngineConfig {
        verify_rules: EngineConfig::load_rules_file(file.path()).unwrap(),
        ..EngineConfig::default()
    };
    let fixture = Fixture::new();

    let proposal = propagation::propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-a"), dish("wheat-bread")],
        &config,
    )
    .unwrap();
    let classification = |code: &str| {
        proposal
            .records
            .iter()
            .find(|record| record.diet_code == code)
            .unwrap()
    };

    let diabetic = classification("DIABETIC");
    assert_eq!(diabetic.classification, Classification::Check);
    assert!(diabetic.note.contains("bread-review"));
    assert_eq!(classification("GF").classification, Classification::Conflict);
}

// ============================================================================
// Environment
// ============================================================================

#[test]
#[serial]
fn test_engine_env_overrides() {
    clear_env();
    env::set_var("NUTRIPLAN_ADHERENCE_ON_TARGET", "0.05");
    env::set_var("NUTRIPLAN_ADHERENCE_BORDERLINE", "0.2");
    env::set_var("NUTRIPLAN_PROTEIN_KCAL_PER_G", "4.1");

    let config = EngineConfig::load().unwrap();
    assert!((config.adherence.on_target - 0.05).abs() < f64::EPSILON);
    assert!((config.adherence.borderline - 0.2).abs() < f64::EPSILON);
    assert!((config.macro_energy.protein_kcal_per_g - 4.1).abs() < f64::EPSILON);
    clear_env();
}

#[test]
#[serial]
fn test_engine_env_parse_errors() {
    clear_env();
    env::set_var("NUTRIPLAN_KCAL_SUM_TOLERANCE", "loose");
    assert!(matches!(EngineConfig::load(), Err(ConfigError::Parse(_))));

    clear_env();
    env::set_var("NUTRIPLAN_ADHERENCE_ON_TARGET", "0.3");
    assert!(matches!(EngineConfig::load(), Err(ConfigError::InvalidRange(_))));
    clear_env();
}

#[test]
#[serial]
fn test_engine_env_rule_path() {
    clear_env();
    let file = rules_file(BREAD_RULE);
    env::set_var(RULES_PATH_ENV, file.path());

    let config = EngineConfig::load().unwrap();
    assert_eq!(config.verify_rules.len(), 1);
    assert_eq!(config.verify_rules[0].name, "bread-review");
    clear_env();
}

#[test]
#[serial]
fn test_global_config_is_loaded_once() {
    clear_env();
    let config = EngineConfig::global();
    assert!(config.validate().is_ok());

    env::set_var("NUTRIPLAN_ADHERENCE_ON_TARGET", "0.01");
    assert!(std::ptr::eq(config, EngineConfig::global()));
    clear_env();
}

#[test]
#[serial]
fn test_planner_config_from_env() {
    clear_env();
    env::set_var("ENVIRONMENT", "prod");
    env::set_var("RUST_LOG", "DEBUG");
    env::set_var(ACTOR_ID_ENV, "kitchen-lead");

    let config = PlannerConfig::from_env().unwrap();
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.actor_id, "kitchen-lead");
    assert!(config.rules_path.is_none());
    assert!(config.summary().contains("built-in"));
    assert_eq!(config.engine_config().unwrap(), EngineConfig::default());
    clear_env();
}

#[test]
#[serial]
fn test_planner_config_rejects_missing_rule_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    env::set_var(RULES_PATH_ENV, dir.path().join("rules.json"));
    assert!(PlannerConfig::from_env().is_err());

    clear_env();
    env::set_var(ACTOR_ID_ENV, "  ");
    assert!(PlannerConfig::from_env().is_err());
    clear_env();
}

#[test]
#[serial]
fn test_planner_config_loads_rule_file() {
    clear_env();
    let file = rules_file(BREAD_RULE);
    env::set_var(RULES_PATH_ENV, file.path());

    let config = PlannerConfig::from_env().unwrap();
    assert_eq!(config.rules_path.as_deref(), Some(file.path()));
    let engine = config.engine_config().unwrap();
    assert_eq!(engine.verify_rules[0].name, "bread-review");
    clear_env();
}

#[test]
#[serial]
fn test_logging_config_from_env() {
    clear_env();
    env::set_var("LOG_FORMAT", "json");
    env::set_var("ENVIRONMENT", "production");

    let config = LoggingConfig::from_env();
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.include_location);
    assert_eq!(config.environment, "production");
    assert_eq!(LogFormat::from_str_or_default("anything"), LogFormat::Pretty);
    clear_env();
}

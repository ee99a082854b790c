// ABOUTME: Engine configuration for adherence bands, macro energy factors and verify rules
// ABOUTME: Provides defaults, environment overrides, JSON rule loading and validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Engine Configuration Module
//!
//! Product decisions that must not be hard-coded: the adherence band
//! thresholds, macronutrient energy factors, the tolerance for the meal-slot
//! kcal sum, and the verify rule table used by propagation.

/// Configuration error types
pub mod error;
/// Verify rule table for propagation `check` classification
pub mod verify;

pub use error::ConfigError;
pub use verify::{default_rules, DietSelector, VerifyCondition, VerifyRule};

use nutriplan_core::constants::energy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Global configuration singleton
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Environment variable naming a JSON verify rule file
pub const RULES_PATH_ENV: &str = "NUTRIPLAN_VERIFY_RULES_PATH";

/// Relative deviation thresholds for target adherence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdherenceConfig {
    /// Deviation at or below this is on-target
    pub on_target: f64,
    /// Deviation at or below this (and above `on_target`) is borderline
    pub borderline: f64,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            on_target: 0.10,
            borderline: 0.15,
        }
    }
}

/// Energy content of macronutrients used for the macro split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroEnergyConfig {
    /// kcal per gram of protein
    pub protein_kcal_per_g: f64,
    /// kcal per gram of fat
    pub fat_kcal_per_g: f64,
    /// kcal per gram of carbohydrates
    pub carbs_kcal_per_g: f64,
}

impl Default for MacroEnergyConfig {
    fn default() -> Self {
        Self {
            protein_kcal_per_g: energy::PROTEIN_KCAL_PER_G,
            fat_kcal_per_g: energy::FAT_KCAL_PER_G,
            carbs_kcal_per_g: energy::CARBS_KCAL_PER_G,
        }
    }
}

/// Meal structure validation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Allowed distance of the kcal percentage sum from 100
    pub kcal_sum_tolerance: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            kcal_sum_tolerance: 0.5,
        }
    }
}

/// Main engine configuration container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target adherence bands
    pub adherence: AdherenceConfig,
    /// Macro split energy factors
    pub macro_energy: MacroEnergyConfig,
    /// Meal structure validation
    pub structure: StructureConfig,
    /// Verify rules for propagation
    pub verify_rules: Vec<VerifyRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adherence: AdherenceConfig::default(),
            macro_energy: MacroEnergyConfig::default(),
            structure: StructureConfig::default(),
            verify_rules: default_rules(),
        }
    }
}

impl EngineConfig {
    /// Get the global configuration instance
    pub fn global() -> &'static Self {
        ENGINE_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                warn!("Failed to load engine config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Load configuration from environment and the optional rule file
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values, the
    /// rule file cannot be read, or validation fails
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config = config.apply_env_overrides()?;

        if let Ok(path) = env::var(RULES_PATH_ENV) {
            config.verify_rules = Self::load_rules_file(&path)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Read a JSON array of verify rules
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a rule is invalid
    pub fn load_rules_file(path: impl AsRef<Path>) -> Result<Vec<VerifyRule>, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let rules: Vec<VerifyRule> = serde_json::from_str(&content)?;
        for rule in &rules {
            rule.validate()?;
        }
        info!(path = %path.display(), count = rules.len(), "Loaded verify rules");
        Ok(rules)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error when thresholds are out of order or out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bands = &self.adherence;
        if !(bands.on_target.is_finite() && bands.borderline.is_finite()) || bands.on_target < 0.0 {
            return Err(ConfigError::ValueOutOfRange(
                "adherence thresholds must be non-negative numbers",
            ));
        }
        if bands.on_target >= bands.borderline {
            return Err(ConfigError::InvalidRange(
                "on-target threshold must be < borderline threshold",
            ));
        }

        let factors = &self.macro_energy;
        if factors.protein_kcal_per_g <= 0.0
            || factors.fat_kcal_per_g <= 0.0
            || factors.carbs_kcal_per_g <= 0.0
        {
            return Err(ConfigError::ValueOutOfRange(
                "macro energy factors must be positive",
            ));
        }

        if !self.structure.kcal_sum_tolerance.is_finite() || self.structure.kcal_sum_tolerance < 0.0 {
            return Err(ConfigError::ValueOutOfRange(
                "kcal sum tolerance must be non-negative",
            ));
        }

        for rule in &self.verify_rules {
            rule.validate()?;
        }

        Ok(())
    }

    /// Apply a single environment variable override if it exists
    fn apply_env_var<T: FromStr>(env_var_name: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Ok(val) = env::var(env_var_name) {
            *target = val
                .parse()
                .map_err(|_| ConfigError::Parse(format!("Invalid {env_var_name}")))?;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        Self::apply_env_var(
            "NUTRIPLAN_ADHERENCE_ON_TARGET",
            &mut self.adherence.on_target,
        )?;
        Self::apply_env_var(
            "NUTRIPLAN_ADHERENCE_BORDERLINE",
            &mut self.adherence.borderline,
        )?;
        Self::apply_env_var(
            "NUTRIPLAN_KCAL_SUM_TOLERANCE",
            &mut self.structure.kcal_sum_tolerance,
        )?;
        Self::apply_env_var(
            "NUTRIPLAN_PROTEIN_KCAL_PER_G",
            &mut self.macro_energy.protein_kcal_per_g,
        )?;
        Self::apply_env_var(
            "NUTRIPLAN_FAT_KCAL_PER_G",
            &mut self.macro_energy.fat_kcal_per_g,
        )?;
        Self::apply_env_var(
            "NUTRIPLAN_CARBS_KCAL_PER_G",
            &mut self.macro_energy.carbs_kcal_per_g,
        )?;
        Ok(self)
    }
}

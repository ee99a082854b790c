// ABOUTME: Environment configuration for the planning service and CLI
// ABOUTME: Parses deployment mode, log settings, verify-rule path and default actor from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Environment-based configuration for the planning service

use anyhow::{Context, Result};
use nutriplan_engine::config::{EngineConfig, RULES_PATH_ENV};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable naming the actor recorded in audit records
pub const ACTOR_ID_ENV: &str = "NUTRIPLAN_ACTOR_ID";

/// Actor recorded when no actor id is configured
pub const DEFAULT_ACTOR_ID: &str = "system";

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational events (default)
    #[default]
    Info,
    /// Debug events
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (default)
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Test runs
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Verify rule file replacing the built-in rules
    pub rules_path: Option<PathBuf>,
    /// Actor id written into audit records
    pub actor_id: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_level: LogLevel::default(),
            rules_path: None,
            actor_id: DEFAULT_ACTOR_ID.to_owned(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when the configured rule file does not exist or the
    /// configuration is invalid
    pub fn from_env() -> Result<Self> {
        info!("Loading planner configuration from environment variables");

        let rules_path = env::var(RULES_PATH_ENV).ok().map(PathBuf::from);
        if let Some(path) = &rules_path {
            path.try_exists()
                .with_context(|| format!("Cannot access verify rule file {}", path.display()))?
                .then_some(())
                .with_context(|| format!("Verify rule file {} does not exist", path.display()))?;
        }

        let config = Self {
            environment: Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development")),
            log_level: LogLevel::from_str_or_default(&env_var_or("RUST_LOG", "info")),
            rules_path,
            actor_id: env_var_or(ACTOR_ID_ENV, DEFAULT_ACTOR_ID),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error for an empty actor id
    pub fn validate(&self) -> Result<()> {
        if self.actor_id.trim().is_empty() {
            return Err(anyhow::anyhow!("{ACTOR_ID_ENV} cannot be empty"));
        }
        if self.environment.is_production() && self.actor_id == DEFAULT_ACTOR_ID {
            warn!("Production environment without {ACTOR_ID_ENV}; audit records use '{DEFAULT_ACTOR_ID}'");
        }
        Ok(())
    }

    /// Build the engine configuration, using this config's rule file when set
    ///
    /// # Errors
    ///
    /// Returns an error when engine environment overrides, the rule file, or
    /// validation fail
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load().context("Failed to load engine configuration")?;
        if let Some(path) = &self.rules_path {
            config.verify_rules = EngineConfig::load_rules_file(path)
                .with_context(|| format!("Failed to load verify rules from {}", path.display()))?;
        }
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    /// Get a summary of the configuration for logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Nutriplan Configuration:\n\
             - Environment: {}\n\
             - Log Level: {}\n\
             - Verify Rules: {}\n\
             - Actor: {}",
            self.environment,
            self.log_level,
            self.rules_path
                .as_ref()
                .map_or_else(|| "built-in".to_owned(), |path| path.display().to_string()),
            self.actor_id,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

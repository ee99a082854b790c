// ABOUTME: Configuration error types for engine threshold and rule validation
// ABOUTME: Defines error variants for invalid ranges, parse failures, and rule file loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Configuration error types for engine validation.

use std::io;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Thresholds not in the required order (e.g., on-target above borderline)
    #[error("Invalid range: {0}")]
    InvalidRange(&'static str),

    /// Failed to parse configuration value
    #[error("Parse error: {0}")]
    Parse(String),

    /// Numeric value outside valid range for parameter
    #[error("Value out of range: {0}")]
    ValueOutOfRange(&'static str),

    /// Verify rule is malformed
    #[error("Invalid verify rule '{name}': {reason}")]
    InvalidRule {
        /// Rule name
        name: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Rule file could not be read
    #[error("Failed to read rule file: {0}")]
    Io(#[from] io::Error),

    /// Rule file is not valid JSON for the rule schema
    #[error("Failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),
}

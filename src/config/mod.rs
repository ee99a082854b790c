// ABOUTME: Configuration module for the planning service and binaries
// ABOUTME: Re-exports environment-driven planner settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Configuration module for Nutriplan
//!
//! Engine thresholds and verify rules live in
//! [`nutriplan_engine::config`]; this module covers process-level settings.

/// Environment and deployment configuration
pub mod environment;

pub use environment::{Environment, LogLevel, PlannerConfig};

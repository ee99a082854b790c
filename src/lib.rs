// ABOUTME: Main library entry point for the Nutriplan planning service
// ABOUTME: Re-exports core types and engine, plus configuration, logging and services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

#![deny(unsafe_code)]

//! # Nutriplan
//!
//! Diet plan inheritance and menu composition for institutional catering.
//! A derived diet (gluten-free, diabetic, ...) inherits nutrition goals,
//! meal structure, exclusion rules and menu content from a base diet,
//! overrides any of them selectively, and receives base edits through an
//! explicit, confirmed propagation step.
//!
//! ## Architecture
//!
//! - **`nutriplan-core`**: errors, catalog constants, data models
//! - **`nutriplan-engine`**: resolver, grid, aggregator, propagation, diff
//! - **this crate**: environment configuration, logging, `PlanningService`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nutriplan::engine::audit::TracingAuditSink;
//! use nutriplan::engine::catalog::InMemoryCatalog;
//! use nutriplan::engine::EngineConfig;
//! use nutriplan::services::PlanningService;
//! use std::sync::Arc;
//!
//! let service = PlanningService::new(
//!     Arc::new(InMemoryCatalog::new()),
//!     Arc::new(TracingAuditSink),
//!     EngineConfig::default(),
//!     "dietitian-1",
//! );
//! let standard = service.create_base_plan("STANDARD", "Standard diet")?;
//! let gluten_free = service.create_derived_plan("GF", "Gluten-free", standard.id)?;
//! # Ok::<(), nutriplan::errors::AppError>(())
//! ```

/// Configuration management
pub mod config;

/// Structured logging setup
pub mod logging;

/// Domain services
pub mod services;

pub use nutriplan_core::{constants, errors, models};

/// Planning engine
pub use nutriplan_engine as engine;

// ABOUTME: Diet plan inheritance and menu composition engine for Nutriplan
// ABOUTME: Resolver, grid, aggregator, propagation and diff over in-memory plan snapshots
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

#![deny(unsafe_code)]

//! # Nutriplan Engine
//!
//! Synchronous, persistence-ignorant algorithms over loaded plan and menu
//! snapshots. Resolver and aggregator functions are pure and can run in
//! parallel; mutations must be serialized per plan by the caller.
//!
//! ## Modules
//!
//! - **config**: Adherence thresholds, macro energy factors and verify rules
//! - **plan_model**: `PlanBook` with kind switching, goal toggling and unlocks
//! - **resolver**: Effective goals, exclusions and meal slots of a plan
//! - **grid**: Inheritance-aware cell reads and writes
//! - **aggregator**: Cell, day and period totals; adherence bands; macro split
//! - **propagation**: Classification and confirmed application of base edits
//! - **diff**: Derived-versus-base differences
//! - **catalog** / **audit**: Collaborator interfaces

/// Engine configuration (thresholds, energy factors, verify rules)
pub mod config;

/// Diet plan model operations over a snapshot of plans
pub mod plan_model;

/// Inheritance resolver
pub mod resolver;

/// Menu composition grid
pub mod grid;

/// Nutrition aggregator
pub mod aggregator;

/// Propagation of base-diet edits to derived diets
pub mod propagation;

/// Derived-versus-base diff
pub mod diff;

/// Read-only dish catalog collaborator
pub mod catalog;

/// Audit collaborator
pub mod audit;

pub use aggregator::{AdherenceBand, Aggregate, MacroSplit, NutritionTotals};
pub use config::EngineConfig;
pub use grid::{CellChange, CellOrigin, DietGrid, ResolvedCell};
pub use plan_model::{KindChange, PlanBook};
pub use propagation::{Classification, PropagationRecord};
pub use resolver::Resolver;

// ABOUTME: Core types and constants for the Nutriplan diet planning engine
// ABOUTME: Foundation crate with error handling, catalog constants, and diet/menu models
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

#![deny(unsafe_code)]

//! # Nutriplan Core
//!
//! Foundation crate providing shared types and constants for the Nutriplan
//! engine. This crate is designed to change infrequently, enabling
//! incremental compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError`, `ErrorCode`, and the typed `PlanError`
//! - **constants**: Static reference catalog (nutrients, EU allergens, units) and engine constants
//! - **models**: Diet plans, menu packages, cells and dish assignments

/// Unified error handling system with standard error codes
pub mod errors;

/// Application constants and reference data organized by domain
pub mod constants;

/// Core data models (`DietPlan`, `MenuPackage`, `DishAssignment`, ids)
pub mod models;

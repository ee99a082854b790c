// ABOUTME: Domain service layer over the planning engine
// ABOUTME: Versioned plan and package storage with audit forwarding, reusable by any front end
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Domain service layer
//!
//! Protocol-agnostic orchestration of engine operations. Front ends (CLI,
//! HTTP handlers, batch jobs) call the service; the service owns version
//! checks and audit forwarding so every entry point enforces the same rules.

/// Planning service: plans, packages, cells and propagation
pub mod planning;

pub use planning::{PlanningService, PlanningSnapshot};

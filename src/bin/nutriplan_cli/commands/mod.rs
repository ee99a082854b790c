// ABOUTME: Re-exports command modules for nutriplan-cli
// ABOUTME: Plan inspection, menu cells and totals, and propagation commands
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

pub mod menu;
pub mod plans;
pub mod propagate;

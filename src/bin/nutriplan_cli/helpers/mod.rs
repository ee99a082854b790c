// ABOUTME: Re-exports helper modules for nutriplan-cli
// ABOUTME: Snapshot loading and saving, id lookup, and output formatting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

pub mod display;
pub mod snapshot;

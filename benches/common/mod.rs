// ABOUTME: Common benchmark utilities and fixtures for engine performance tests
// ABOUTME: Provides deterministic plan books, packages and catalogs for Criterion benchmarks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Common benchmark utilities and fixtures.

pub mod fixtures;

// ABOUTME: Unified error handling with standard error codes for the Nutriplan engine
// ABOUTME: Defines ErrorCode, AppError, ErrorContext and the AppResult alias
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Unified Error Handling System
//!
//! Centralized error handling for the engine and its collaborators. Engine
//! operations return the typed [`PlanError`]; service and binary layers lift
//! it into [`AppError`], which carries a stable [`ErrorCode`] plus context
//! suitable for audit trails and presentation layers.

/// Typed engine errors (inheritance, grid addressing, locking, concurrency)
pub mod plan;

pub use plan::{PlanError, PlanResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Inheritance & structure (1000-1999)
    /// Base reference points to a missing, derived or self plan
    #[serde(rename = "INVALID_BASE_REFERENCE")]
    InvalidBaseReference = 1000,
    /// Operation only applies to derived plans
    #[serde(rename = "NOT_INHERITABLE")]
    NotInheritable = 1001,
    /// Facet still mirrors the base plan and must be unlocked first
    #[serde(rename = "LOCKED_FACET")]
    LockedFacet = 1002,

    // Addressing & lookup (2000-2999)
    /// Plan, package, view, slot or nutrient is unknown
    #[serde(rename = "NOT_FOUND")]
    NotFound = 2000,
    /// Week/day index outside the package cycle
    #[serde(rename = "OUT_OF_RANGE")]
    OutOfRange = 2001,

    // Concurrency (3000-3999)
    /// Caller's version stamp no longer matches the stored aggregate
    #[serde(rename = "STALE_WRITE")]
    StaleWrite = 3000,

    // Validation (4000-4999)
    /// Input failed validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 4000,

    // Configuration (6000-6999)
    /// Configuration could not be loaded or is invalid
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 6000,

    // Internal Errors (9000-9999)
    /// Unexpected internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Snapshot (de)serialization failed
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidBaseReference => "The base diet reference is invalid",
            Self::NotInheritable => "The operation only applies to derived diets",
            Self::LockedFacet => "The facet is inherited from the base diet and locked",
            Self::NotFound => "The requested resource was not found",
            Self::OutOfRange => "The menu address is outside the package cycle",
            Self::StaleWrite => "The record was modified since it was loaded",
            Self::InvalidInput => "The provided input is invalid",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal error occurred",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether the caller can recover by retrying with a fresh snapshot
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleWrite)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Actor that issued the failing operation
    pub actor_id: Option<String>,
    /// Resource ID if applicable (plan id, package id)
    pub resource_id: Option<String>,
    /// Additional key-value context
    pub details: serde_json::Value,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            actor_id: None,
            resource_id: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add an actor ID to the error context
    #[must_use]
    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.context.actor_id = Some(actor_id.into());
        self
    }

    /// Add a resource ID to the error context
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.context.resource_id = Some(resource_id.into());
        self
    }

    /// Add details to the error context
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Whether the caller should reload and retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl From<PlanError> for AppError {
    fn from(error: PlanError) -> Self {
        let code = error.code();
        let message = error.to_string();
        let app = Self::new(code, message);
        match error {
            PlanError::StaleWrite {
                resource_id,
                expected,
                actual,
            } => app
                .with_resource_id(resource_id)
                .with_details(serde_json::json!({
                    "expected_version": expected,
                    "actual_version": actual,
                })),
            _ => app,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Error response format handed to presentation collaborators
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Whether the caller may retry with a fresh snapshot
    pub retryable: bool,
    /// Structured details
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            code: error.code,
            retryable: error.code.is_retryable(),
            message: error.message,
            details: error.context.details,
        }
    }
}

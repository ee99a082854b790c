// ABOUTME: Typed error kinds returned by diet plan, grid and propagation operations
// ABOUTME: Each variant maps onto a stable ErrorCode for the unified AppError system
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Plan Error Types
//!
//! Every engine mutation or lookup returns these variants to the caller.
//! None of them is swallowed inside the engine; `StaleWrite` is the only
//! recoverable one (reload the snapshot and retry).

use super::ErrorCode;
use thiserror::Error;

/// Errors produced by engine operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Base reference is missing, points at a derived plan, or would form a chain
    #[error("invalid base reference for diet '{plan}': {reason}")]
    InvalidBaseReference {
        /// Code of the plan being modified
        plan: String,
        /// Why the reference was rejected
        reason: String,
    },
    /// A referenced entity does not exist
    #[error("{resource} '{id}' not found")]
    NotFound {
        /// Kind of entity (diet plan, menu package, meal slot, ...)
        resource: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },
    /// Week/day address outside `[0, cycle_length)`
    #[error("menu address week {week}, day {day} is outside a {cycle_length}-day cycle")]
    OutOfRange {
        /// Requested week index
        week: usize,
        /// Requested day index within the week
        day: usize,
        /// Package cycle length in days
        cycle_length: u32,
    },
    /// Inheritance-only operation attempted on a base plan
    #[error("diet '{plan}' is a base diet and has nothing to inherit")]
    NotInheritable {
        /// Code of the base plan
        plan: String,
    },
    /// Optimistic concurrency check failed
    #[error("stale write on '{resource_id}': expected version {expected}, found {actual}")]
    StaleWrite {
        /// Plan or package identifier
        resource_id: String,
        /// Version the caller loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },
    /// Attempt to edit a base-derived facet before unlocking it
    #[error("{facet} of diet '{plan}' is inherited from its base and locked")]
    LockedFacet {
        /// Code of the derived plan
        plan: String,
        /// Facet name (exclusions, meal structure)
        facet: &'static str,
    },
    /// Input failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PlanError {
    /// Create a "not found" error
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Create an "invalid base reference" error
    #[must_use]
    pub fn invalid_base(plan: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBaseReference {
            plan: plan.into(),
            reason: reason.into(),
        }
    }

    /// Create a "not inheritable" error
    #[must_use]
    pub fn not_inheritable(plan: impl Into<String>) -> Self {
        Self::NotInheritable { plan: plan.into() }
    }

    /// Create a "locked facet" error
    #[must_use]
    pub fn locked(plan: impl Into<String>, facet: &'static str) -> Self {
        Self::LockedFacet {
            plan: plan.into(),
            facet,
        }
    }

    /// Create an "invalid input" error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Stable error code for this variant
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidBaseReference { .. } => ErrorCode::InvalidBaseReference,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::OutOfRange { .. } => ErrorCode::OutOfRange,
            Self::NotInheritable { .. } => ErrorCode::NotInheritable,
            Self::StaleWrite { .. } => ErrorCode::StaleWrite,
            Self::LockedFacet { .. } => ErrorCode::LockedFacet,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }
}

/// Result alias for engine operations
pub type PlanResult<T> = Result<T, PlanError>;

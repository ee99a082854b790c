// ABOUTME: Audit collaborator receiving before/after records for plan, exclusion and cell mutations
// ABOUTME: AuditSink trait with a tracing-backed sink and an in-memory sink for inspection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Audit Records
//!
//! The engine supplies old/new value pairs; storing them is the sink's job.

use chrono::{DateTime, Utc};
use nutriplan_core::models::{CellAddress, DietPlanId, MenuPackageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// What a mutation touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditTarget {
    /// Plan-level fields (kind, goals, meal structure, status, ...)
    Plan {
        /// Operation name
        operation: String,
    },
    /// The plan's exclusion set
    Exclusions {
        /// Operation name
        operation: String,
    },
    /// One menu cell
    Cell {
        /// Package holding the cell
        package_id: MenuPackageId,
        /// Cell address
        address: CellAddress,
    },
}

/// One before/after record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Plan the mutation belongs to
    pub plan_id: DietPlanId,
    /// Who performed it
    pub actor_id: String,
    /// What was touched
    pub target: AuditTarget,
    /// Value before the mutation
    pub before: Value,
    /// Value after the mutation
    pub after: Value,
    /// When the record was produced
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a record stamped now
    #[must_use]
    pub fn new(plan_id: DietPlanId, actor_id: impl Into<String>, target: AuditTarget, before: Value, after: Value) -> Self {
        Self {
            plan_id,
            actor_id: actor_id.into(),
            target,
            before,
            after,
            recorded_at: Utc::now(),
        }
    }
}

/// Receiver of audit records
pub trait AuditSink: Send + Sync {
    /// Accept one record
    fn record(&self, record: AuditRecord);
}

/// Sink that emits each record as a structured log event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "nutriplan::audit",
            plan_id = %record.plan_id,
            actor_id = %record.actor_id,
            audit_target = ?record.target,
            before = %record.before,
            after = %record.after,
            "Audit record"
        );
    }
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records so far
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

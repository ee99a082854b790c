// ABOUTME: Output formatting helpers for nutriplan-cli
// ABOUTME: Pretty JSON on stdout plus a readable propagation summary on stderr
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use nutriplan::engine::propagation::{ApplyOutcome, PropagationRecord};
use nutriplan::errors::AppResult;
use serde::Serialize;

/// Print a value as pretty JSON on stdout
pub fn print_json(value: &impl Serialize) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print one line per derived diet with its classification
pub fn display_records(records: &[PropagationRecord]) {
    eprintln!("\nPropagation preview");
    eprintln!("{}", "=".repeat(60));
    if records.is_empty() {
        eprintln!("   No derived diets are affected");
    }
    for record in records {
        let label = serde_json::to_value(record.classification)
            .ok()
            .and_then(|value| value.as_str().map(str::to_owned))
            .unwrap_or_default();
        eprintln!("   {:<12} {:<10} {}", record.diet_code, label, record.note);
    }
    eprintln!("{}", "=".repeat(60));
}

/// Summarize an applied batch
pub fn display_outcome(outcome: &ApplyOutcome) {
    eprintln!(
        "\nApplied: {}   Pinned: {}   Skipped (own version): {}   Cells written: {}",
        outcome.applied.len(),
        outcome.pinned.len(),
        outcome.skipped_overrides.len(),
        outcome.cell_changes.len()
    );
}

// ABOUTME: Menu commands for nutriplan-cli
// ABOUTME: Resolved cell content with its origin, day totals and week goal adherence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::helpers::display::print_json;
use crate::helpers::snapshot::Workspace;
use nutriplan::errors::AppResult;
use nutriplan::models::CellAddress;
use serde_json::json;

type Result<T> = AppResult<T>;

/// Print one resolved cell
pub fn resolve_cell(workspace: &Workspace, package: Option<&str>, code: &str, week: usize, day: usize, slot: &str) -> Result<()> {
    let plan = workspace.plan_by_code(code)?;
    let package_id = workspace.package_id(package)?;
    let address = CellAddress::new(week, day, slot);
    let state = workspace.service.cell(package_id, plan.id, &address)?;

    print_json(&json!({
        "plan": plan.code,
        "address": address.to_string(),
        "cell": state,
    }))
}

/// Print the totals of one day, or the goal adherence of a week's daily average
pub fn totals(workspace: &Workspace, package: Option<&str>, code: &str, week: usize, day: Option<usize>) -> Result<()> {
    let plan = workspace.plan_by_code(code)?;
    let package_id = workspace.package_id(package)?;
    let service = &workspace.service;

    match day {
        Some(day) => print_json(&json!({
            "plan": plan.code,
            "week": week,
            "day": day,
            "aggregate": service.day_totals(package_id, plan.id, week, day)?,
        })),
        None => print_json(&json!({
            "plan": plan.code,
            "week": week,
            "adherence": service.week_adherence(package_id, plan.id, week)?,
        })),
    }
}

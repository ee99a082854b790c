// ABOUTME: Plan inspection commands for nutriplan-cli
// ABOUTME: Effective facets of a diet, derived-versus-base diff, and validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::helpers::display::print_json;
use crate::helpers::snapshot::Workspace;
use nutriplan::errors::AppResult;
use serde_json::json;
use tracing::warn;

type Result<T> = AppResult<T>;

/// Print a diet's effective goals, exclusions and meal slots
pub fn resolve(workspace: &Workspace, code: &str) -> Result<()> {
    let plan = workspace.plan_by_code(code)?;
    let service = &workspace.service;

    print_json(&json!({
        "id": plan.id,
        "code": plan.code,
        "kind": plan.kind(),
        "version": plan.version,
        "goals": service.effective_goals(plan.id)?,
        "exclusions": service.effective_exclusions(plan.id)?,
        "meal_slots": service.effective_meal_slots(plan.id)?,
        "meal_structure_locked": plan.meal_structure.is_inherited(),
        "exclusions_unlocked": plan.exclusions_unlocked,
    }))
}

/// Print how a derived diet differs from its base
///
/// Menu cells are included when a package can be selected.
pub fn diff(workspace: &Workspace, package: Option<&str>, code: &str) -> Result<()> {
    let plan = workspace.plan_by_code(code)?;
    let package_id = workspace.package_id(package).ok();
    print_json(&workspace.service.diff(plan.id, package_id)?)
}

/// Print violations of one diet or of every diet
pub fn validate(workspace: &Workspace, code: Option<&str>) -> Result<()> {
    let plans = match code {
        Some(code) => vec![workspace.plan_by_code(code)?],
        None => workspace.service.plans(),
    };

    let mut report = serde_json::Map::new();
    for plan in plans {
        let violations = workspace.service.validate_plan(plan.id)?;
        if !violations.is_empty() {
            warn!(plan = %plan.code, count = violations.len(), "Diet has violations");
        }
        report.insert(plan.code, serde_json::to_value(violations)?);
    }
    print_json(&report)
}

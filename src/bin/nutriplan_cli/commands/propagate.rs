// ABOUTME: Propagation commands for nutriplan-cli
// ABOUTME: Preview base cell and goal changes per derived diet, then apply for confirmed diets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::helpers::display::{display_outcome, display_records, print_json};
use crate::helpers::snapshot::Workspace;
use nutriplan::errors::{AppError, AppResult};
use nutriplan::models::{CellAddress, GoalRange};
use std::collections::BTreeSet;
use tracing::info;

type Result<T> = AppResult<T>;

/// Propose new content for a base cell; apply it when `apply` is set
pub fn cell(
    workspace: &Workspace,
    package: Option<&str>,
    base_code: &str,
    (week, day, slot): (usize, usize, String),
    dish_refs: &[String],
    confirm: &[String],
    apply: bool,
) -> Result<()> {
    let base = workspace.plan_by_code(base_code)?;
    let package_id = workspace.package_id(package)?;
    let address = CellAddress::new(week, day, slot);
    let dishes = workspace.dishes(dish_refs)?;

    let proposal = workspace
        .service
        .propose_cell_change(package_id, base.id, &address, dishes)?;
    display_records(&proposal.records);

    if !apply {
        return print_json(&proposal);
    }

    let confirmed: BTreeSet<_> = workspace.plan_ids(confirm)?.into_iter().collect();
    let outcome = workspace.service.apply_cell_change(&proposal, &confirmed)?;
    display_outcome(&outcome);
    workspace.save()?;
    info!(base = %base.code, cell = %address, "Cell change applied");
    print_json(&outcome)
}

/// Propose a new base goal range; apply it when `apply` is set
pub fn goal(
    workspace: &Workspace,
    base_code: &str,
    nutrient: &str,
    (min, max): (Option<f64>, Option<f64>),
    confirm: &[String],
    apply: bool,
) -> Result<()> {
    if min.is_none() && max.is_none() {
        return Err(AppError::invalid_input("pass --min, --max or both"));
    }
    let base = workspace.plan_by_code(base_code)?;
    let range = GoalRange {
        min,
        max,
        percent_of_kcal: None,
    };

    let proposal = workspace
        .service
        .propose_goal_change(base.id, nutrient, range)?;
    display_records(&proposal.records);

    if !apply {
        return print_json(&proposal);
    }

    let confirmed: BTreeSet<_> = workspace.plan_ids(confirm)?.into_iter().collect();
    let outcome = workspace
        .service
        .apply_goal_change(&proposal, base.version, &confirmed)?;
    display_outcome(&outcome);
    workspace.save()?;
    info!(base = %base.code, nutrient, "Goal change applied");
    print_json(&outcome)
}

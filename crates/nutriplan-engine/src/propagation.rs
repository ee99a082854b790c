// ABOUTME: Propagation engine classifying base-diet edits for every derived diet
// ABOUTME: Proposals (override, conflict, check, compatible) and confirmed batch application
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Propagation Engine
//!
//! When a base diet's cell, goal or exclusion changes, each derived diet is
//! classified in this order:
//!
//! 1. `override`: the derived diet has its own version at the key; never touched
//! 2. `conflict`: the new content hits one of its active exclusions
//! 3. `check`: a verify rule selects the diet and its condition holds
//! 4. `compatible`: nothing stands in the way
//!
//! Nothing is merged automatically. Applying a batch only lets confirmed
//! diets take the change; unconfirmed diets that would otherwise follow the
//! base are pinned to the previous content with the same [`write_cell`]
//! an operator would use. Diets with their own version are always skipped
//! and reported.
//!
//! Application walks the derived diets as they are when the batch is
//! applied, not the proposal's records: archived diets and diets derived
//! after the proposal still inherit, so they are pinned like any other
//! unconfirmed diet. Only diets the proposal classified can be confirmed.

use crate::config::EngineConfig;
use crate::grid::{write_cell, CellChange, DietGrid};
use crate::plan_model::PlanBook;
use crate::resolver::Resolver;
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{
    CellAddress, DietPlan, DietPlanId, DishAssignment, Exclusion, GoalRange, GoalSource,
    MenuPackage, MenuPackageId, NutritionGoal, PlanStatus,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{info, warn};

/// Verdict for one derived diet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Safe to apply
    Compatible,
    /// A verify rule asks for manual review
    Check,
    /// New content hits an active exclusion
    Conflict,
    /// Diet has its own version; skipped
    Override,
}

/// Classification of one derived diet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationRecord {
    /// Derived diet
    pub diet_id: DietPlanId,
    /// Its code
    pub diet_code: String,
    /// Verdict
    pub classification: Classification,
    /// Operator-facing explanation
    pub note: String,
}

/// A proposed change to one base cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellProposal {
    /// Package holding the cell
    pub package_id: MenuPackageId,
    /// Package version the proposal was computed on
    pub package_version: u64,
    /// Base diet
    pub base_diet_id: DietPlanId,
    /// Changed cell
    pub address: CellAddress,
    /// Base content before the change
    pub previous: Vec<DishAssignment>,
    /// Base content after the change
    pub proposed: Vec<DishAssignment>,
    /// One record per derived diet in the package, ordered by code
    pub records: Vec<PropagationRecord>,
}

/// A proposed change to one base goal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProposal {
    /// Base diet
    pub base_diet_id: DietPlanId,
    /// Canonical nutrient name
    pub nutrient: String,
    /// Base goal before the change
    pub previous: Option<GoalRange>,
    /// Base goal after the change
    pub proposed: GoalRange,
    /// One record per derived diet, ordered by code
    pub records: Vec<PropagationRecord>,
}

/// A proposed new base exclusion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExclusionProposal {
    /// Base diet
    pub base_diet_id: DietPlanId,
    /// Rule to add
    pub exclusion: Exclusion,
    /// One record per derived diet, ordered by code
    pub records: Vec<PropagationRecord>,
}

/// Result of applying a batch
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ApplyOutcome {
    /// Diets that now follow the new base content
    pub applied: Vec<DietPlanId>,
    /// Unconfirmed diets pinned to the previous content
    pub pinned: Vec<DietPlanId>,
    /// Diets skipped because they have their own version
    pub skipped_overrides: Vec<DietPlanId>,
    /// Cell writes performed, base write last
    pub cell_changes: Vec<CellChange>,
}

/// Derived diets of a base that propagation considers (archived ones are left out)
fn targets(book: &PlanBook, base_diet_id: DietPlanId) -> PlanResult<Vec<&DietPlan>> {
    let base = book.require(base_diet_id)?;
    if base.is_derived() {
        return Err(PlanError::invalid_base(
            &base.code,
            "propagation starts from a base diet",
        ));
    }
    Ok(book
        .derived_of(base_diet_id)
        .into_iter()
        .filter(|plan| plan.status != PlanStatus::Archived)
        .collect())
}

/// Every diet inheriting from the base at apply time, archived or not
fn inheriting(book: &PlanBook, base_diet_id: DietPlanId) -> Vec<DietPlanId> {
    book.derived_of(base_diet_id)
        .into_iter()
        .map(|plan| plan.id)
        .collect()
}

/// A diet takes the change only when it was classified and then confirmed
fn takes_change(records: &[PropagationRecord], confirmed: &BTreeSet<DietPlanId>, diet_id: DietPlanId) -> bool {
    confirmed.contains(&diet_id) && records.iter().any(|record| record.diet_id == diet_id)
}

fn record(plan: &DietPlan, classification: Classification, note: String) -> PropagationRecord {
    PropagationRecord {
        diet_id: plan.id,
        diet_code: plan.code.clone(),
        classification,
        note,
    }
}

/// Exclusions of `diet` hit by any of `dishes`, as `name (dish)` strings
fn exclusion_hits(diet: &Resolver<'_>, dishes: &[DishAssignment]) -> Vec<String> {
    let mut hits = Vec::new();
    for exclusion in diet.active_exclusions() {
        for dish in dishes.iter().filter(|dish| exclusion.matches(dish)) {
            hits.push(format!("{} ({})", exclusion.name, dish.name));
        }
    }
    hits
}

/// Classify a base cell change for one derived diet
///
/// # Errors
///
/// Returns `OutOfRange` or `NotFound` for an address the diet cannot hold.
pub fn classify_cell(grid: &DietGrid<'_>, diet: &Resolver<'_>, address: &CellAddress, previous: &[DishAssignment], proposed: &[DishAssignment], config: &EngineConfig) -> PlanResult<PropagationRecord> {
    let plan = diet.plan();
    if grid.has_local(address) {
        return Ok(record(
            plan,
            Classification::Override,
            format!("has its own version of {address}; skipped"),
        ));
    }
    grid.check(address)?;

    let hits = exclusion_hits(diet, proposed);
    if !hits.is_empty() {
        return Ok(record(
            plan,
            Classification::Conflict,
            format!("new content hits exclusions: {}", hits.join(", ")),
        ));
    }

    let triggered: Vec<&str> = config
        .verify_rules
        .iter()
        .filter(|rule| rule.applies_to.selects(diet) && rule.condition.holds(proposed, previous))
        .map(|rule| rule.name.as_str())
        .collect();
    if !triggered.is_empty() {
        let mut note = format!("review required: {}", triggered.join(", "));
        for rule in config.verify_rules.iter().filter(|rule| triggered.contains(&rule.name.as_str())) {
            if !rule.note.is_empty() {
                let _ = write!(note, "; {}", rule.note);
            }
        }
        return Ok(record(plan, Classification::Check, note));
    }

    Ok(record(plan, Classification::Compatible, String::from("inherits the change")))
}

/// Classify a base cell change for every derived diet in the package
///
/// Derived diets whose meal structure lacks the slot are not part of the
/// batch. Classification runs in parallel; records are ordered by code.
///
/// # Errors
///
/// Returns `NotFound` for an unknown base or a base without a view,
/// `InvalidBaseReference` for a derived "base", and address errors.
pub fn propose_cell_change(book: &PlanBook, package: &MenuPackage, base_diet_id: DietPlanId, address: &CellAddress, proposed: Vec<DishAssignment>, config: &EngineConfig) -> PlanResult<CellProposal> {
    let targets = targets(book, base_diet_id)?;
    let base_grid = DietGrid::new(package, book.resolver(base_diet_id)?)?;
    let previous = base_grid.get_cell(address)?.dishes.to_vec();

    let mut records = targets
        .par_iter()
        .map(|plan| -> PlanResult<Option<PropagationRecord>> {
            let diet = book.resolver(plan.id)?;
            if !diet.has_slot(&address.slot) {
                return Ok(None);
            }
            let grid = DietGrid::new(package, diet)?;
            classify_cell(&grid, &diet, address, &previous, &proposed, config).map(Some)
        })
        .collect::<PlanResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    records.sort_by(|a, b| a.diet_code.cmp(&b.diet_code));

    info!(
        base = %base_grid.plan().code,
        cell = %address,
        targets = records.len(),
        conflicts = records.iter().filter(|r| r.classification == Classification::Conflict).count(),
        "Cell propagation proposed"
    );

    Ok(CellProposal {
        package_id: package.id,
        package_version: package.version,
        base_diet_id,
        address: address.clone(),
        previous,
        proposed,
        records,
    })
}

/// Apply a cell proposal
///
/// Diets in `confirmed` that still read the base cell take the new content
/// as a view. Every other diet reading the base cell is pinned to the
/// previous content, including archived diets and diets derived after the
/// proposal. Diets with their own cell are skipped whether confirmed or
/// not, and diets without the slot are left alone. The base cell is
/// written last.
///
/// # Errors
///
/// Returns `StaleWrite` when the package changed since the proposal, and
/// any error of [`write_cell`].
pub fn apply_cell_change(book: &PlanBook, package: &mut MenuPackage, proposal: &CellProposal, confirmed: &BTreeSet<DietPlanId>) -> PlanResult<ApplyOutcome> {
    if package.id != proposal.package_id || package.version != proposal.package_version {
        return Err(PlanError::StaleWrite {
            resource_id: package.id.to_string(),
            expected: proposal.package_version,
            actual: package.version,
        });
    }

    let mut outcome = ApplyOutcome::default();
    for diet_id in inheriting(book, proposal.base_diet_id) {
        let diet = book.resolver(diet_id)?;
        if !diet.has_slot(&proposal.address.slot) {
            continue;
        }
        let has_local = DietGrid::new(package, diet)?.has_local(&proposal.address);
        let takes_change = takes_change(&proposal.records, confirmed, diet_id);
        if has_local {
            if takes_change {
                warn!(diet = %diet.plan().code, cell = %proposal.address, "Confirmed diet has its own version; skipped");
            }
            outcome.skipped_overrides.push(diet_id);
        } else if takes_change {
            outcome.applied.push(diet_id);
        } else {
            let change = write_cell(package, diet, &proposal.address, proposal.previous.clone())?;
            outcome.cell_changes.push(change);
            outcome.pinned.push(diet_id);
        }
    }

    let base = book.resolver(proposal.base_diet_id)?;
    let change = write_cell(package, base, &proposal.address, proposal.proposed.clone())?;
    outcome.cell_changes.push(change);

    info!(
        cell = %proposal.address,
        applied = outcome.applied.len(),
        pinned = outcome.pinned.len(),
        skipped = outcome.skipped_overrides.len(),
        "Cell propagation applied"
    );
    Ok(outcome)
}

/// Classify a base goal change for every derived diet
///
/// # Errors
///
/// Returns `NotFound` for an unknown base, `InvalidBaseReference` for a
/// derived "base", and `InvalidInput` for `min > max`.
pub fn propose_goal_change(book: &PlanBook, base_diet_id: DietPlanId, nutrient: &str, proposed: GoalRange) -> PlanResult<GoalProposal> {
    if !proposed.is_ordered() {
        return Err(PlanError::invalid_input(format!(
            "goal range for {nutrient} has min above max"
        )));
    }
    let targets = targets(book, base_diet_id)?;
    let base = book.resolver(base_diet_id)?.effective_goal(nutrient);

    let mut records: Vec<PropagationRecord> = targets
        .par_iter()
        .map(|plan| {
            let overridden = plan
                .goal(nutrient)
                .is_some_and(|goal| goal.source == GoalSource::Overridden);
            if overridden {
                record(
                    plan,
                    Classification::Override,
                    format!("has its own {} goal; skipped", base.nutrient),
                )
            } else {
                record(plan, Classification::Compatible, String::from("inherits the change"))
            }
        })
        .collect();
    records.sort_by(|a, b| a.diet_code.cmp(&b.diet_code));

    Ok(GoalProposal {
        base_diet_id,
        nutrient: base.nutrient,
        previous: base.range,
        proposed,
        records,
    })
}

/// Apply a goal proposal
///
/// Every unconfirmed inheriting diet, archived or derived after the
/// proposal included, gets the previous base value as an overridden goal;
/// with no previous value it stays unresolved-inherited.
///
/// # Errors
///
/// Returns `NotFound` for an unknown base.
pub fn apply_goal_change(book: &mut PlanBook, proposal: &GoalProposal, confirmed: &BTreeSet<DietPlanId>) -> PlanResult<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();
    for diet_id in inheriting(book, proposal.base_diet_id) {
        let plan = book.require(diet_id)?;
        let overridden = plan
            .goal(&proposal.nutrient)
            .is_some_and(|goal| goal.source == GoalSource::Overridden);
        if overridden {
            outcome.skipped_overrides.push(diet_id);
        } else if takes_change(&proposal.records, confirmed, diet_id) {
            outcome.applied.push(diet_id);
        } else if let Some(previous) = proposal.previous {
            let mut plan = plan.clone();
            let pinned = NutritionGoal::overridden(&proposal.nutrient, previous);
            match plan.goal_mut(&proposal.nutrient) {
                Some(goal) => *goal = pinned,
                None => plan.nutrition_goals.push(pinned),
            }
            book.put(plan);
            outcome.pinned.push(diet_id);
        }
    }
    book.set_goal(proposal.base_diet_id, &proposal.nutrient, proposal.proposed)?;
    info!(
        nutrient = %proposal.nutrient,
        applied = outcome.applied.len(),
        pinned = outcome.pinned.len(),
        skipped = outcome.skipped_overrides.len(),
        "Goal propagation applied"
    );
    Ok(outcome)
}

/// Classify a new base exclusion for every derived diet
///
/// A derived diet whose own cells in `packages` serve dishes hit by the
/// rule is a conflict; one that already carries a deactivated copy of the
/// rule is an override.
///
/// # Errors
///
/// Returns `NotFound` for an unknown base, `InvalidBaseReference` for a
/// derived "base", and `InvalidInput` when the base already has the rule.
pub fn propose_exclusion_change(book: &PlanBook, packages: &[&MenuPackage], base_diet_id: DietPlanId, exclusion: Exclusion) -> PlanResult<ExclusionProposal> {
    let targets = targets(book, base_diet_id)?;
    let base = book.require(base_diet_id)?;
    if base.exclusions.iter().any(|existing| existing.same_rule(&exclusion)) {
        return Err(PlanError::invalid_input(format!(
            "'{}' already excludes {}",
            base.code, exclusion.name
        )));
    }

    let mut records: Vec<PropagationRecord> = targets
        .par_iter()
        .map(|plan| classify_exclusion(plan, packages, &exclusion))
        .collect();
    records.sort_by(|a, b| a.diet_code.cmp(&b.diet_code));

    Ok(ExclusionProposal {
        base_diet_id,
        exclusion,
        records,
    })
}

fn classify_exclusion(plan: &DietPlan, packages: &[&MenuPackage], exclusion: &Exclusion) -> PropagationRecord {
    let deactivated = plan
        .exclusions
        .iter()
        .any(|local| local.same_rule(exclusion) && !local.active);
    if deactivated {
        return record(
            plan,
            Classification::Override,
            format!("keeps {} deactivated; skipped", exclusion.name),
        );
    }

    let hits: Vec<String> = packages
        .iter()
        .filter_map(|package| package.view(plan.id))
        .flat_map(|view| {
            view.stored_addresses().into_iter().filter(move |address| {
                view.stored(address)
                    .is_some_and(|cell| cell.dishes.iter().any(|dish| exclusion.matches(dish)))
            })
        })
        .map(|address| address.to_string())
        .collect();
    if hits.is_empty() {
        record(plan, Classification::Compatible, String::from("inherits the rule"))
    } else {
        record(
            plan,
            Classification::Conflict,
            format!("own cells serve excluded content at {}", hits.join(", ")),
        )
    }
}

/// Apply an exclusion proposal
///
/// The rule is added to the base. Confirmed diets take it by inheritance.
/// Every other diet keeps its previous state for the rule: the diet's
/// exclusions are unlocked and a deactivated shadow of the rule is stored,
/// unless the rule was already enforced locally. Diets keeping a
/// deactivated copy of the rule are pinned the same way and reported as
/// skipped.
///
/// # Errors
///
/// Returns `NotFound` for an unknown base and `InvalidInput` when the base
/// already has the rule.
pub fn apply_exclusion_change(book: &mut PlanBook, proposal: &ExclusionProposal, confirmed: &BTreeSet<DietPlanId>) -> PlanResult<ApplyOutcome> {
    let exclusion = &proposal.exclusion;
    let base = book.require(proposal.base_diet_id)?;
    if base.exclusions.iter().any(|existing| existing.same_rule(exclusion)) {
        return Err(PlanError::invalid_input(format!(
            "'{}' already excludes {}",
            base.code, exclusion.name
        )));
    }

    let mut outcome = ApplyOutcome::default();
    for diet_id in inheriting(book, proposal.base_diet_id) {
        let deactivated = book
            .require(diet_id)?
            .exclusions
            .iter()
            .any(|local| local.same_rule(exclusion) && !local.active);
        if deactivated {
            pin_exclusion(book, diet_id, exclusion)?;
            outcome.skipped_overrides.push(diet_id);
        } else if takes_change(&proposal.records, confirmed, diet_id) {
            let mut plan = book.require(diet_id)?.clone();
            plan.exclusions
                .retain(|local| !(local.from_base && local.same_rule(exclusion)));
            book.put(plan);
            outcome.applied.push(diet_id);
        } else {
            pin_exclusion(book, diet_id, exclusion)?;
            outcome.pinned.push(diet_id);
        }
    }

    let mut base = book.require(proposal.base_diet_id)?.clone();
    base.exclusions.push(exclusion.clone());
    book.put(base);
    info!(
        exclusion = %exclusion.name,
        applied = outcome.applied.len(),
        pinned = outcome.pinned.len(),
        skipped = outcome.skipped_overrides.len(),
        "Exclusion propagation applied"
    );
    Ok(outcome)
}

/// Keep a diet's current state for a rule its base is about to gain
///
/// Must run before the rule is added to the base.
fn pin_exclusion(book: &mut PlanBook, diet_id: DietPlanId, exclusion: &Exclusion) -> PlanResult<()> {
    let enforced = book
        .resolver(diet_id)?
        .active_exclusions()
        .iter()
        .any(|active| active.same_rule(exclusion));
    if enforced {
        return Ok(());
    }

    book.unlock_exclusions(diet_id)?;
    let mut plan = book.require(diet_id)?.clone();
    let mut shadow = exclusion.clone();
    if let Some(index) = plan.exclusions.iter().position(|local| local.same_rule(exclusion)) {
        shadow.id = plan.exclusions.remove(index).id;
    }
    plan.exclusions.retain(|local| !local.same_rule(exclusion));
    shadow.from_base = true;
    shadow.active = false;
    plan.exclusions.push(shadow);
    book.put(plan);
    Ok(())
}

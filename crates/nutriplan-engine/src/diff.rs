// ABOUTME: Structured diff between a derived diet and its base for display and audit
// ABOUTME: Changed goals, added or deactivated exclusions, overridden cells, substitutions, meal slots
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::grid::DietGrid;
use crate::resolver::Resolver;
use nutriplan_core::constants::FLOAT_EPSILON;
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{
    CellAddress, DietPlan, DietPlanId, DishAssignment, Exclusion, GoalRange, GoalSource,
    MealSlotId, MenuPackage, Substitution,
};
use serde::Serialize;

/// An overridden goal whose value differs from the base
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalDiff {
    /// Nutrient name
    pub nutrient: String,
    /// Derived plan's value
    pub local: GoalRange,
    /// Base value, `None` when the base defines no such goal
    pub base: Option<GoalRange>,
}

/// An overridden cell next to what the base currently holds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDiff {
    /// Cell address
    pub address: CellAddress,
    /// Derived diet's content
    pub derived: Vec<DishAssignment>,
    /// Base diet's current content
    pub base: Vec<DishAssignment>,
}

/// Meal structure divergence once unlocked
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MealStructureDiff {
    /// Slots only on the derived plan
    pub added: Vec<MealSlotId>,
    /// Base slots the derived plan dropped
    pub removed: Vec<MealSlotId>,
    /// Slots on both with different settings
    pub changed: Vec<MealSlotId>,
}

impl MealStructureDiff {
    /// Check for no divergence
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Differences between a derived diet and its base
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDiff {
    /// Derived diet
    pub derived_id: DietPlanId,
    /// Base diet
    pub base_id: DietPlanId,
    /// Overridden goals that differ numerically from the base
    pub goals_changed: Vec<GoalDiff>,
    /// Exclusions present on the derived diet but not on the base
    pub exclusions_added: Vec<Exclusion>,
    /// Base exclusions the derived diet deactivated after unlocking
    pub exclusions_deactivated: Vec<Exclusion>,
    /// Overridden cells, empty when no package was given
    pub cells: Vec<CellDiff>,
    /// Recorded substitutions
    pub substitutions: Vec<Substitution>,
    /// Meal structure divergence, `None` while inherited
    pub meal_structure: Option<MealStructureDiff>,
}

impl PlanDiff {
    /// Check if the derived diet has not diverged at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.goals_changed.is_empty()
            && self.exclusions_added.is_empty()
            && self.exclusions_deactivated.is_empty()
            && self.cells.is_empty()
            && self.substitutions.is_empty()
            && self.meal_structure.as_ref().is_none_or(MealStructureDiff::is_empty)
    }
}

fn differs(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() > FLOAT_EPSILON,
        (None, None) => false,
        _ => true,
    }
}

fn ranges_differ(local: &GoalRange, base: Option<&GoalRange>) -> bool {
    base.is_none_or(|base| {
        differs(local.min, base.min)
            || differs(local.max, base.max)
            || differs(local.percent_of_kcal, base.percent_of_kcal)
    })
}

/// Compute the diff of a derived diet against its base
///
/// Menu cells are compared only when a package is given.
///
/// # Errors
///
/// Returns `NotInheritable` when `derived` is a base diet,
/// `InvalidBaseReference` when `base` is not its base, and `NotFound` when
/// the package has no view for the base.
pub fn diff(derived: &DietPlan, base: &DietPlan, package: Option<&MenuPackage>) -> PlanResult<PlanDiff> {
    if !derived.is_derived() {
        return Err(PlanError::not_inheritable(&derived.code));
    }
    let resolver = Resolver::new(derived, Some(base))?;

    let goals_changed = derived
        .nutrition_goals
        .iter()
        .filter(|goal| goal.source == GoalSource::Overridden)
        .filter_map(|goal| {
            let base_range = base.goal(&goal.nutrient).map(|g| g.range);
            ranges_differ(&goal.range, base_range.as_ref()).then(|| GoalDiff {
                nutrient: goal.nutrient.clone(),
                local: goal.range,
                base: base_range,
            })
        })
        .collect();

    let effective = resolver.effective_exclusions();
    let exclusions_added = effective
        .iter()
        .filter(|e| !e.exclusion.from_base)
        .map(|e| e.exclusion.clone())
        .collect();
    let exclusions_deactivated = effective
        .iter()
        .filter(|e| e.exclusion.from_base && !e.exclusion.active)
        .map(|e| e.exclusion.clone())
        .collect();

    let cells = match package {
        Some(package) => overridden_cells(package, resolver)?,
        None => Vec::new(),
    };

    let meal_structure = derived.owned_meal_slots().map(|local| {
        let base_slots = base.owned_meal_slots().unwrap_or_default();
        let mut structure = MealStructureDiff::default();
        for slot in local {
            match base_slots.iter().find(|b| b.id == slot.id) {
                None => structure.added.push(slot.id.clone()),
                Some(b) if b != slot => structure.changed.push(slot.id.clone()),
                Some(_) => {}
            }
        }
        structure.removed = base_slots
            .iter()
            .filter(|b| !local.iter().any(|slot| slot.id == b.id))
            .map(|b| b.id.clone())
            .collect();
        structure
    });

    Ok(PlanDiff {
        derived_id: derived.id,
        base_id: base.id,
        goals_changed,
        exclusions_added,
        exclusions_deactivated,
        cells,
        substitutions: derived.substitutions.clone(),
        meal_structure,
    })
}

fn overridden_cells(package: &MenuPackage, resolver: Resolver<'_>) -> PlanResult<Vec<CellDiff>> {
    let Some(view) = package.view(resolver.plan().id) else {
        return Ok(Vec::new());
    };
    let base = resolver
        .base()
        .ok_or_else(|| PlanError::not_inheritable(&resolver.plan().code))?;
    let base_grid = DietGrid::new(package, Resolver::new(base, None)?)?;

    Ok(view
        .stored_addresses()
        .into_iter()
        .filter_map(|address| {
            let derived = view.stored(&address)?.dishes.clone();
            let base = base_grid
                .get_cell(&address)
                .map(|cell| cell.dishes.to_vec())
                .unwrap_or_default();
            Some(CellDiff {
                address,
                derived,
                base,
            })
        })
        .collect())
}

// ABOUTME: Diet plan model operations over an in-memory snapshot of plans
// ABOUTME: Kind switching, goal source toggling, one-way unlocks and facet edits with lock checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Diet Plan Model
//!
//! [`PlanBook`] holds the loaded plans a caller works on. Structural
//! operations need to see more than one plan (a derived plan's base, or
//! the plans that derive from a base), so they live here rather than on
//! [`DietPlan`] itself.
//!
//! Operations mutate the snapshot only when they succeed. Version stamps are
//! checked and bumped by the caller that owns persistence.

use crate::config::EngineConfig;
use crate::resolver::{ResolutionWarning, Resolver};
use nutriplan_core::constants::menu::KCAL_PERCENT_TOTAL;
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{
    ClientAssignment, DietKind, DietPlan, DietPlanId, Exclusion, ExclusionCategory, Facet,
    GoalRange, GoalSource, Lineage, MealSlot, MealSlotId, NutritionGoal, PlanStatus,
    Substitution,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Facet names used in `LockedFacet` errors
const EXCLUSIONS_FACET: &str = "exclusions";
const MEAL_STRUCTURE_FACET: &str = "meal structure";
const GOAL_FACET: &str = "nutrition goal";

/// Requested lineage for [`PlanBook::set_kind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindChange {
    /// Become a base plan, freezing everything inherited
    Base,
    /// Become derived from `base_diet_id`
    Derived {
        /// New base plan
        base_diet_id: DietPlanId,
    },
}

/// Meal structure and goal problems reported for a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanViolation {
    /// Active plan whose slot percentages do not sum to 100
    KcalSumMismatch {
        /// Actual sum
        sum: f64,
    },
    /// Two slots share an id
    DuplicateMealSlot {
        /// Repeated id
        slot: MealSlotId,
    },
    /// Goal with `min > max`
    InvertedGoalRange {
        /// Nutrient name
        nutrient: String,
    },
    /// Resolution gap (missing base goal, empty goal)
    Resolution(ResolutionWarning),
}

/// In-memory snapshot of diet plans
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanBook {
    plans: BTreeMap<DietPlanId, DietPlan>,
}

impl FromIterator<DietPlan> for PlanBook {
    fn from_iter<I: IntoIterator<Item = DietPlan>>(iter: I) -> Self {
        Self {
            plans: iter.into_iter().map(|plan| (plan.id, plan)).collect(),
        }
    }
}

impl PlanBook {
    /// Empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plan, checking its lineage against the plans already loaded
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a duplicate code and `InvalidBaseReference`
    /// when a derived plan's base is missing or itself derived.
    pub fn insert(&mut self, plan: DietPlan) -> PlanResult<()> {
        if self.by_code(&plan.code).is_some_and(|other| other.id != plan.id) {
            return Err(PlanError::invalid_input(format!(
                "diet code '{}' is already used",
                plan.code
            )));
        }
        if let Some(base_id) = plan.base_diet_id() {
            self.check_base_candidate(&plan, base_id)?;
        }
        debug!(plan = %plan.code, kind = %plan.kind(), "Plan loaded");
        self.plans.insert(plan.id, plan);
        Ok(())
    }

    /// Replace a plan with a new snapshot of itself
    pub fn put(&mut self, plan: DietPlan) {
        self.plans.insert(plan.id, plan);
    }

    /// Look up a plan
    #[must_use]
    pub fn get(&self, id: DietPlanId) -> Option<&DietPlan> {
        self.plans.get(&id)
    }

    /// Look up a plan or fail with `NotFound`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub fn require(&self, id: DietPlanId) -> PlanResult<&DietPlan> {
        self.plans
            .get(&id)
            .ok_or_else(|| PlanError::not_found("diet plan", id))
    }

    fn require_mut(&mut self, id: DietPlanId) -> PlanResult<&mut DietPlan> {
        self.plans
            .get_mut(&id)
            .ok_or_else(|| PlanError::not_found("diet plan", id))
    }

    /// Look up a plan by code (case-insensitive)
    #[must_use]
    pub fn by_code(&self, code: &str) -> Option<&DietPlan> {
        self.plans
            .values()
            .find(|plan| plan.code.eq_ignore_ascii_case(code))
    }

    /// All plans in id order
    pub fn plans(&self) -> impl Iterator<Item = &DietPlan> {
        self.plans.values()
    }

    /// Number of plans
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Check if the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plans derived from `base_id`, ordered by code
    #[must_use]
    pub fn derived_of(&self, base_id: DietPlanId) -> Vec<&DietPlan> {
        let mut derived: Vec<&DietPlan> = self
            .plans
            .values()
            .filter(|plan| plan.base_diet_id() == Some(base_id))
            .collect();
        derived.sort_by(|a, b| a.code.cmp(&b.code));
        derived
    }

    /// Resolver for a plan and its base
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan and `InvalidBaseReference` when
    /// the base is missing or derived.
    pub fn resolver(&self, id: DietPlanId) -> PlanResult<Resolver<'_>> {
        let plan = self.require(id)?;
        let base = plan.base_diet_id().and_then(|base_id| self.plans.get(&base_id));
        Resolver::new(plan, base)
    }

    fn check_base_candidate(&self, plan: &DietPlan, base_id: DietPlanId) -> PlanResult<()> {
        if base_id == plan.id {
            return Err(PlanError::invalid_base(&plan.code, "a plan cannot be its own base"));
        }
        let base = self.plans.get(&base_id).ok_or_else(|| {
            PlanError::invalid_base(&plan.code, format!("base diet {base_id} does not exist"))
        })?;
        if base.is_derived() {
            return Err(PlanError::invalid_base(
                &plan.code,
                format!("'{}' is a derived diet and cannot be a base", base.code),
            ));
        }
        Ok(())
    }

    /// Switch a plan between base and derived
    ///
    /// Becoming derived requires an existing base plan other than itself and
    /// that no plan derives from this one. Becoming base freezes every
    /// inherited goal, the meal structure and the exclusion set into owned
    /// values. Cells are frozen separately with
    /// [`freeze_inherited_cells`](crate::grid::freeze_inherited_cells),
    /// which must run first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan and `InvalidBaseReference` for
    /// an unusable base.
    pub fn set_kind(&mut self, plan_id: DietPlanId, change: KindChange) -> PlanResult<()> {
        let plan = self.require(plan_id)?;
        match (plan.lineage, change) {
            (Lineage::Base, KindChange::Base) => Ok(()),
            (Lineage::Derived { base_diet_id }, KindChange::Derived { base_diet_id: target })
                if base_diet_id == target =>
            {
                Ok(())
            }
            (_, KindChange::Derived { base_diet_id }) => {
                self.check_base_candidate(plan, base_diet_id)?;
                if !self.derived_of(plan_id).is_empty() {
                    return Err(PlanError::invalid_base(
                        &plan.code,
                        "plan is the base of other diets and cannot become derived",
                    ));
                }
                let was_derived = plan.is_derived();
                let plan = self.require_mut(plan_id)?;
                plan.lineage = Lineage::Derived { base_diet_id };
                if !was_derived {
                    for goal in &mut plan.nutrition_goals {
                        goal.source = GoalSource::Overridden;
                    }
                }
                info!(plan = %plan.code, base = %base_diet_id, "Plan converted to derived");
                Ok(())
            }
            (Lineage::Derived { .. }, KindChange::Base) => {
                let resolver = self.resolver(plan_id)?;
                let goals = resolver.frozen_goals();
                let slots = resolver.effective_meal_slots().to_vec();
                let exclusions: Vec<Exclusion> = resolver
                    .effective_exclusions()
                    .into_iter()
                    .map(|effective| {
                        let mut exclusion = effective.exclusion;
                        exclusion.from_base = false;
                        exclusion
                    })
                    .collect();

                let plan = self.require_mut(plan_id)?;
                plan.lineage = Lineage::Base;
                plan.nutrition_goals = goals;
                plan.meal_structure = Facet::Owned(slots);
                plan.exclusions = exclusions;
                plan.exclusions_unlocked = false;
                info!(plan = %plan.code, "Plan converted to base; inherited facets frozen");
                Ok(())
            }
        }
    }

    /// Flip a derived plan's goal between inherited and overridden
    ///
    /// To inherited discards the local value; to overridden seeds it with
    /// the currently resolved value. Returns the new source.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan or a nutrient neither plan
    /// defines, and `NotInheritable` on a base plan.
    pub fn toggle_goal_source(&mut self, plan_id: DietPlanId, nutrient: &str) -> PlanResult<GoalSource> {
        let resolver = self.resolver(plan_id)?;
        let plan = resolver.plan();
        if !plan.is_derived() {
            return Err(PlanError::not_inheritable(&plan.code));
        }
        let known = plan.goal(nutrient).is_some()
            || resolver.base().is_some_and(|base| base.goal(nutrient).is_some());
        if !known {
            return Err(PlanError::not_found("nutrition goal", nutrient));
        }
        let resolved = resolver.effective_goal(nutrient);

        let plan = self.require_mut(plan_id)?;
        let next = if resolved.source == GoalSource::Overridden {
            GoalSource::Inherited
        } else {
            GoalSource::Overridden
        };
        let goal = match next {
            GoalSource::Overridden => NutritionGoal::overridden(&resolved.nutrient, resolved.range.unwrap_or_default()),
            _ => NutritionGoal::inherited(&resolved.nutrient),
        };
        match plan.goal_mut(&resolved.nutrient) {
            Some(existing) => *existing = goal,
            None => plan.nutrition_goals.push(goal),
        }
        info!(plan = %plan.code, nutrient = %resolved.nutrient, source = ?next, "Goal source toggled");
        Ok(next)
    }

    /// Set a goal's local value
    ///
    /// Base plans store owned goals. Derived plans may edit overridden goals
    /// and add goals the base does not define; inherited goals must be
    /// toggled to overridden first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidInput` for `min > max`, or `LockedFacet`
    /// for an inherited goal.
    pub fn set_goal(&mut self, plan_id: DietPlanId, nutrient: &str, range: GoalRange) -> PlanResult<()> {
        if !range.is_ordered() {
            return Err(PlanError::invalid_input(format!(
                "goal range for {nutrient} has min above max"
            )));
        }
        let resolver = self.resolver(plan_id)?;
        let resolved = resolver.effective_goal(nutrient);
        let base_defines = resolver
            .base()
            .is_some_and(|base| base.goal(nutrient).is_some());
        let derived = resolver.plan().is_derived();
        if derived && resolved.source == GoalSource::Inherited && base_defines {
            return Err(PlanError::locked(&resolver.plan().code, GOAL_FACET));
        }

        let plan = self.require_mut(plan_id)?;
        let goal = if derived {
            NutritionGoal::overridden(nutrient, range)
        } else {
            NutritionGoal::owned(nutrient, range)
        };
        match plan.goal_mut(nutrient) {
            Some(existing) => *existing = goal,
            None => plan.nutrition_goals.push(goal),
        }
        debug!(plan = %plan.code, nutrient, "Goal updated");
        Ok(())
    }

    /// Remove a goal stored on the plan
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the plan stores no goal for the nutrient.
    pub fn remove_goal(&mut self, plan_id: DietPlanId, nutrient: &str) -> PlanResult<NutritionGoal> {
        let plan = self.require_mut(plan_id)?;
        let index = plan
            .nutrition_goals
            .iter()
            .position(|goal| goal.is_for(nutrient))
            .ok_or_else(|| PlanError::not_found("nutrition goal", nutrient))?;
        Ok(plan.nutrition_goals.remove(index))
    }

    /// Make base-derived exclusions independently toggleable (one-way)
    ///
    /// Snapshots the base rules as active local shadows. Returns `false`
    /// when the plan was already unlocked.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NotInheritable` on a base plan.
    pub fn unlock_exclusions(&mut self, plan_id: DietPlanId) -> PlanResult<bool> {
        let resolver = self.resolver(plan_id)?;
        let plan = resolver.plan();
        if !plan.is_derived() {
            return Err(PlanError::not_inheritable(&plan.code));
        }
        if plan.exclusions_unlocked {
            return Ok(false);
        }
        let shadows: Vec<Exclusion> = resolver
            .effective_exclusions()
            .into_iter()
            .filter(|effective| effective.exclusion.from_base)
            .map(|effective| effective.exclusion)
            .collect();

        let plan = self.require_mut(plan_id)?;
        plan.exclusions.retain(|local| !local.from_base);
        plan.exclusions.extend(shadows);
        plan.exclusions_unlocked = true;
        info!(plan = %plan.code, "Exclusions unlocked");
        Ok(true)
    }

    /// Snapshot the base meal structure into the plan (one-way)
    ///
    /// Returns `false` when the structure was already owned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NotInheritable` on a base plan.
    pub fn unlock_meal_structure(&mut self, plan_id: DietPlanId) -> PlanResult<bool> {
        let resolver = self.resolver(plan_id)?;
        let plan = resolver.plan();
        if !plan.is_derived() {
            return Err(PlanError::not_inheritable(&plan.code));
        }
        if !plan.meal_structure.is_inherited() {
            return Ok(false);
        }
        let slots = resolver.effective_meal_slots().to_vec();

        let plan = self.require_mut(plan_id)?;
        plan.meal_structure = Facet::Owned(slots);
        info!(plan = %plan.code, "Meal structure unlocked");
        Ok(true)
    }

    /// Add a local exclusion
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidInput` when the rule is already in
    /// the effective set.
    pub fn add_exclusion(&mut self, plan_id: DietPlanId, category: ExclusionCategory, name: &str) -> PlanResult<Exclusion> {
        if name.trim().is_empty() {
            return Err(PlanError::invalid_input("exclusion name must not be empty"));
        }
        let exclusion = Exclusion::new(category, name);
        let resolver = self.resolver(plan_id)?;
        if resolver
            .effective_exclusions()
            .iter()
            .any(|effective| effective.exclusion.same_rule(&exclusion))
        {
            return Err(PlanError::invalid_input(format!(
                "exclusion '{}' already applies to '{}'",
                exclusion.name,
                resolver.plan().code
            )));
        }
        let plan = self.require_mut(plan_id)?;
        plan.exclusions.push(exclusion.clone());
        debug!(plan = %plan.code, exclusion = %exclusion.name, "Exclusion added");
        Ok(exclusion)
    }

    /// Activate or deactivate an exclusion
    ///
    /// Base-derived rules need [`unlock_exclusions`](Self::unlock_exclusions) first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown rule and `LockedFacet` for a locked
    /// base-derived rule.
    pub fn set_exclusion_active(&mut self, plan_id: DietPlanId, category: ExclusionCategory, name: &str, active: bool) -> PlanResult<()> {
        let rule = Exclusion::new(category, name);
        let resolver = self.resolver(plan_id)?;
        let effective = resolver
            .effective_exclusions()
            .into_iter()
            .find(|effective| effective.exclusion.same_rule(&rule))
            .ok_or_else(|| PlanError::not_found("exclusion", &rule.name))?;
        if effective.locked {
            return Err(PlanError::locked(&resolver.plan().code, EXCLUSIONS_FACET));
        }

        let plan = self.require_mut(plan_id)?;
        if let Some(local) = plan
            .exclusions
            .iter_mut()
            .find(|local| local.same_rule(&rule) && local.from_base == effective.exclusion.from_base)
        {
            local.active = active;
        } else {
            let mut shadow = effective.exclusion;
            shadow.active = active;
            plan.exclusions.push(shadow);
        }
        debug!(plan = %plan.code, exclusion = %rule.name, active, "Exclusion toggled");
        Ok(())
    }

    /// Remove a locally added exclusion
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `LockedFacet` for a rule
    /// received from the base, which can only be deactivated.
    pub fn remove_exclusion(&mut self, plan_id: DietPlanId, exclusion_id: Uuid) -> PlanResult<Exclusion> {
        let plan = self.require_mut(plan_id)?;
        let index = plan
            .exclusions
            .iter()
            .position(|exclusion| exclusion.id == exclusion_id)
            .ok_or_else(|| PlanError::not_found("exclusion", exclusion_id))?;
        if plan.exclusions[index].from_base {
            return Err(PlanError::locked(&plan.code, EXCLUSIONS_FACET));
        }
        Ok(plan.exclusions.remove(index))
    }

    /// Insert or replace a meal slot in an owned structure
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidInput` for a negative percentage, or
    /// `LockedFacet` while the structure is inherited.
    pub fn upsert_meal_slot(&mut self, plan_id: DietPlanId, slot: MealSlot) -> PlanResult<()> {
        if !slot.kcal_percentage.is_finite() || slot.kcal_percentage < 0.0 {
            return Err(PlanError::invalid_input(format!(
                "kcal percentage of slot '{}' must be non-negative",
                slot.id
            )));
        }
        let plan = self.require_mut(plan_id)?;
        let code = plan.code.clone();
        let slots = plan
            .meal_structure
            .as_owned_mut()
            .ok_or_else(|| PlanError::locked(code, MEAL_STRUCTURE_FACET))?;
        match slots.iter_mut().find(|existing| existing.id == slot.id) {
            Some(existing) => *existing = slot,
            None => slots.push(slot),
        }
        Ok(())
    }

    /// Remove a meal slot from an owned structure
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `LockedFacet` while the structure is inherited.
    pub fn remove_meal_slot(&mut self, plan_id: DietPlanId, slot_id: &MealSlotId) -> PlanResult<MealSlot> {
        let plan = self.require_mut(plan_id)?;
        let code = plan.code.clone();
        let slots = plan
            .meal_structure
            .as_owned_mut()
            .ok_or_else(|| PlanError::locked(code, MEAL_STRUCTURE_FACET))?;
        let index = slots
            .iter()
            .position(|slot| &slot.id == slot_id)
            .ok_or_else(|| PlanError::not_found("meal slot", slot_id))?;
        Ok(slots.remove(index))
    }

    /// Record a deviation from the inherited menu
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NotInheritable` on a base plan.
    pub fn add_substitution(&mut self, plan_id: DietPlanId, substitution: Substitution) -> PlanResult<()> {
        let plan = self.require_mut(plan_id)?;
        if !plan.is_derived() {
            return Err(PlanError::not_inheritable(&plan.code));
        }
        plan.substitutions.push(substitution);
        Ok(())
    }

    /// Remove a substitution
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan or substitution.
    pub fn remove_substitution(&mut self, plan_id: DietPlanId, substitution_id: Uuid) -> PlanResult<Substitution> {
        let plan = self.require_mut(plan_id)?;
        let index = plan
            .substitutions
            .iter()
            .position(|substitution| substitution.id == substitution_id)
            .ok_or_else(|| PlanError::not_found("substitution", substitution_id))?;
        Ok(plan.substitutions.remove(index))
    }

    /// Insert or replace a client assignment keyed by client id
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidInput` when the dates are reversed.
    pub fn assign_client(&mut self, plan_id: DietPlanId, assignment: ClientAssignment) -> PlanResult<()> {
        if let (Some(from), Some(to)) = (assignment.date_from, assignment.date_to) {
            if to < from {
                return Err(PlanError::invalid_input(format!(
                    "assignment of client '{}' ends before it starts",
                    assignment.client_id
                )));
            }
        }
        let plan = self.require_mut(plan_id)?;
        match plan
            .client_assignments
            .iter_mut()
            .find(|existing| existing.client_id == assignment.client_id)
        {
            Some(existing) => *existing = assignment,
            None => plan.client_assignments.push(assignment),
        }
        Ok(())
    }

    /// Rename a plan
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidInput` for an empty name.
    pub fn rename(&mut self, plan_id: DietPlanId, name: &str) -> PlanResult<()> {
        if name.trim().is_empty() {
            return Err(PlanError::invalid_input("plan name must not be empty"));
        }
        self.require_mut(plan_id)?.name = name.trim().to_owned();
        Ok(())
    }

    /// Change a plan's lifecycle status
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan.
    pub fn set_status(&mut self, plan_id: DietPlanId, status: PlanStatus) -> PlanResult<()> {
        self.require_mut(plan_id)?.status = status;
        Ok(())
    }

    /// Meal structure and goal problems for a plan
    ///
    /// The kcal sum is only checked for active plans.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidBaseReference` when the plan cannot be resolved.
    pub fn validate(&self, plan_id: DietPlanId, config: &EngineConfig) -> PlanResult<Vec<PlanViolation>> {
        let resolver = self.resolver(plan_id)?;
        let plan = resolver.plan();
        let slots = resolver.effective_meal_slots();
        let mut violations = Vec::new();

        if plan.status == PlanStatus::Active {
            let sum: f64 = slots.iter().map(|slot| slot.kcal_percentage).sum();
            if (sum - KCAL_PERCENT_TOTAL).abs() > config.structure.kcal_sum_tolerance {
                violations.push(PlanViolation::KcalSumMismatch { sum });
            }
        }

        let mut seen = BTreeSet::new();
        for slot in slots {
            if !seen.insert(&slot.id) {
                violations.push(PlanViolation::DuplicateMealSlot {
                    slot: slot.id.clone(),
                });
            }
        }

        for goal in resolver.effective_goals() {
            if goal.range.is_some_and(|range| !range.is_ordered()) {
                violations.push(PlanViolation::InvertedGoalRange {
                    nutrient: goal.nutrient,
                });
            }
        }

        violations.extend(resolver.warnings().into_iter().map(PlanViolation::Resolution));
        Ok(violations)
    }

    /// Kind of a plan
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan.
    pub fn kind(&self, plan_id: DietPlanId) -> PlanResult<DietKind> {
        Ok(self.require(plan_id)?.kind())
    }
}

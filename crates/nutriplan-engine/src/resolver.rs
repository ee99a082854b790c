// ABOUTME: Inheritance resolver computing effective goals, exclusions and meal slots
// ABOUTME: Pure and deterministic over a (plan, base) snapshot; never mutates either plan
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Inheritance Resolver
//!
//! Computes the effective value of every inheritable facet of a plan. For a
//! base plan every facet is its own. For a derived plan:
//!
//! - a goal is the local value when overridden, otherwise the base goal;
//!   a goal the base does not define is unresolved, never zero
//! - exclusions are the base exclusions (locked until the plan unlocks them)
//!   plus the plan's own additions
//! - meal slots mirror the base until the structure is unlocked
//!
//! Resolution reads only its two inputs, so repeated calls on the same
//! snapshot return identical results.

use nutriplan_core::constants::{NutrientInfo, NUTRIENTS};
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{
    DietPlan, Exclusion, GoalRange, GoalSource, MealSlot, MealSlotId, NutritionGoal,
};
use serde::Serialize;

/// Effective value of one nutrition goal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGoal {
    /// Canonical nutrient name
    pub nutrient: String,
    /// Effective range; `None` when the base defines no value
    pub range: Option<GoalRange>,
    /// Where the value came from
    pub source: GoalSource,
}

impl ResolvedGoal {
    /// Check if the goal has no value to compare against
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        self.range.is_none()
    }
}

/// Effective exclusion with its lock state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveExclusion {
    /// The rule as it applies to this plan
    #[serde(flatten)]
    pub exclusion: Exclusion,
    /// Base-derived rule that cannot be deactivated yet
    pub locked: bool,
}

/// Data-entry gaps found during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    /// Derived plan inherits a goal the base does not define
    MissingBaseGoal {
        /// Nutrient name
        nutrient: String,
    },
    /// Plan has a goal with no min, max or percentage
    EmptyGoal {
        /// Nutrient name
        nutrient: String,
    },
}

/// Resolver over one plan and, for derived plans, its base
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    plan: &'a DietPlan,
    base: Option<&'a DietPlan>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseReference` when a derived plan is given no base,
    /// the wrong base, or a base that is itself derived.
    pub fn new(plan: &'a DietPlan, base: Option<&'a DietPlan>) -> PlanResult<Self> {
        let Some(expected) = plan.base_diet_id() else {
            return Ok(Self { plan, base: None });
        };
        let base = base.ok_or_else(|| {
            PlanError::invalid_base(&plan.code, format!("base diet {expected} is not loaded"))
        })?;
        if base.id != expected {
            return Err(PlanError::invalid_base(
                &plan.code,
                format!("expected base {expected}, got {}", base.id),
            ));
        }
        if base.is_derived() {
            return Err(PlanError::invalid_base(
                &plan.code,
                format!("base '{}' is itself derived", base.code),
            ));
        }
        Ok(Self {
            plan,
            base: Some(base),
        })
    }

    /// The plan being resolved
    #[must_use]
    pub const fn plan(&self) -> &'a DietPlan {
        self.plan
    }

    /// Its base, when derived
    #[must_use]
    pub const fn base(&self) -> Option<&'a DietPlan> {
        self.base
    }

    /// Effective goal for a nutrient
    #[must_use]
    pub fn effective_goal(&self, nutrient: &str) -> ResolvedGoal {
        let name = NutrientInfo::canonical_name(nutrient);
        let local = self.plan.goal(&name);

        let Some(base) = self.base else {
            return ResolvedGoal {
                nutrient: name,
                range: local.map(|goal| goal.range),
                source: GoalSource::Owned,
            };
        };

        match local {
            Some(goal) if goal.source == GoalSource::Overridden => ResolvedGoal {
                nutrient: name,
                range: Some(goal.range),
                source: GoalSource::Overridden,
            },
            _ => ResolvedGoal {
                range: base.goal(&name).map(|goal| goal.range),
                nutrient: name,
                source: GoalSource::Inherited,
            },
        }
    }

    /// Effective goals for every nutrient known to the plan or its base
    ///
    /// Catalog nutrients come first in catalog order, custom ones follow by name.
    #[must_use]
    pub fn effective_goals(&self) -> Vec<ResolvedGoal> {
        let mut names: Vec<String> = Vec::new();
        let stored = self
            .plan
            .nutrition_goals
            .iter()
            .chain(self.base.iter().flat_map(|base| base.nutrition_goals.iter()));
        for goal in stored {
            if !names.iter().any(|name| goal.is_for(name)) {
                names.push(goal.nutrient.clone());
            }
        }
        names.sort_by_key(|name| {
            let rank = NUTRIENTS
                .iter()
                .position(|info| info.name.eq_ignore_ascii_case(name))
                .unwrap_or(NUTRIENTS.len());
            (rank, name.to_lowercase())
        });
        names
            .iter()
            .map(|name| self.effective_goal(name))
            .collect()
    }

    /// Gaps a caller should surface instead of silently zero-filling
    #[must_use]
    pub fn warnings(&self) -> Vec<ResolutionWarning> {
        self.effective_goals()
            .into_iter()
            .filter_map(|goal| match goal.range {
                None => Some(ResolutionWarning::MissingBaseGoal {
                    nutrient: goal.nutrient,
                }),
                Some(range) if range.min.is_none() && range.max.is_none() && range.percent_of_kcal.is_none() => {
                    Some(ResolutionWarning::EmptyGoal {
                        nutrient: goal.nutrient,
                    })
                }
                Some(_) => None,
            })
            .collect()
    }

    /// Effective exclusion set
    ///
    /// Base rules first (in base order), then local additions.
    #[must_use]
    pub fn effective_exclusions(&self) -> Vec<EffectiveExclusion> {
        let Some(base) = self.base else {
            return self
                .plan
                .exclusions
                .iter()
                .map(|exclusion| EffectiveExclusion {
                    exclusion: exclusion.clone(),
                    locked: false,
                })
                .collect();
        };

        let unlocked = self.plan.exclusions_unlocked;
        let mut effective: Vec<EffectiveExclusion> = base
            .exclusions
            .iter()
            .filter(|rule| rule.active)
            .map(|rule| {
                let shadow = self
                    .plan
                    .exclusions
                    .iter()
                    .find(|local| local.from_base && local.same_rule(rule));
                let mut exclusion = rule.clone();
                exclusion.from_base = true;
                exclusion.active = !unlocked || shadow.is_none_or(|local| local.active);
                EffectiveExclusion {
                    exclusion,
                    locked: !unlocked,
                }
            })
            .collect();

        let additions = self.plan.exclusions.iter().filter(|local| {
            !local.from_base && !effective.iter().any(|e| e.exclusion.same_rule(local))
        });
        let additions: Vec<EffectiveExclusion> = additions
            .map(|local| EffectiveExclusion {
                exclusion: local.clone(),
                locked: false,
            })
            .collect();
        effective.extend(additions);
        effective
    }

    /// Only the rules currently enforced
    #[must_use]
    pub fn active_exclusions(&self) -> Vec<Exclusion> {
        self.effective_exclusions()
            .into_iter()
            .filter(|effective| effective.exclusion.active)
            .map(|effective| effective.exclusion)
            .collect()
    }

    /// Effective meal slots: the base structure while inherited
    #[must_use]
    pub fn effective_meal_slots(&self) -> &'a [MealSlot] {
        match (self.plan.owned_meal_slots(), self.base) {
            (Some(slots), _) => slots,
            (None, Some(base)) => base.owned_meal_slots().unwrap_or_default(),
            (None, None) => &[],
        }
    }

    /// Check if a slot exists in the effective structure
    #[must_use]
    pub fn has_slot(&self, slot: &MealSlotId) -> bool {
        self.effective_meal_slots().iter().any(|s| &s.id == slot)
    }

    /// Check if the meal structure still mirrors the base
    #[must_use]
    pub const fn meal_structure_locked(&self) -> bool {
        self.base.is_some() && self.plan.meal_structure.is_inherited()
    }

    /// Goals frozen to owned values, as a base plan would store them
    ///
    /// Unresolved goals are kept with an empty range so the gap stays visible.
    #[must_use]
    pub fn frozen_goals(&self) -> Vec<NutritionGoal> {
        self.effective_goals()
            .into_iter()
            .map(|goal| NutritionGoal::owned(&goal.nutrient, goal.range.unwrap_or_default()))
            .collect()
    }
}

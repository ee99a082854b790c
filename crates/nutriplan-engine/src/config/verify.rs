// ABOUTME: Configurable verify rules that flag propagated content for manual review
// ABOUTME: A rule selects diets (by code, goal or exclusion) and a condition on the new content
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Verify Rules
//!
//! Propagation classifies a change as `check` when any rule selects the
//! target diet and its condition holds for the new cell content. Rules are
//! plain data so they can be loaded from a JSON file instead of being tied
//! to particular diet names.

use super::ConfigError;
use crate::aggregator::cell_totals;
use crate::resolver::Resolver;
use nutriplan_core::models::{DishAssignment, ExclusionCategory, GoalSource, NutrientField};
use serde::{Deserialize, Serialize};

/// Which diets a rule applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DietSelector {
    /// Every derived diet
    All,
    /// Diets with one of these codes (case-insensitive)
    Codes {
        /// Diet codes
        codes: Vec<String>,
    },
    /// Diets that set their own goal for this nutrient (inherited goals do not count)
    GoalNutrient {
        /// Nutrient name or alias
        nutrient: String,
    },
    /// Diets with this active exclusion
    Exclusion {
        /// Exclusion category
        category: ExclusionCategory,
        /// Exclusion name
        name: String,
    },
}

impl DietSelector {
    /// Check whether the diet behind `diet` is selected
    #[must_use]
    pub fn selects(&self, diet: &Resolver<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Codes { codes } => codes
                .iter()
                .any(|code| code.eq_ignore_ascii_case(&diet.plan().code)),
            Self::GoalNutrient { nutrient } => diet
                .plan()
                .goal(nutrient)
                .is_some_and(|goal| goal.source != GoalSource::Inherited),
            Self::Exclusion { category, name } => diet
                .active_exclusions()
                .iter()
                .any(|exclusion| exclusion.category == *category && exclusion.name.eq_ignore_ascii_case(name)),
        }
    }
}

/// Condition on the propagated content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerifyCondition {
    /// New cell total of `field` exceeds `threshold`
    NutrientAbove {
        /// Aggregated field
        field: NutrientField,
        /// Upper limit for the cell
        threshold: f64,
    },
    /// New cell total of `field` grows by more than `ratio` over the previous content
    NutrientIncrease {
        /// Aggregated field
        field: NutrientField,
        /// Allowed growth factor (1.2 = +20%)
        ratio: f64,
    },
    /// Any new dish belongs to one of these categories
    DishCategory {
        /// Dish categories (case-insensitive)
        categories: Vec<String>,
    },
    /// Any new dish lacks data for `field`
    MissingNutrition {
        /// Snapshot field
        field: NutrientField,
    },
}

impl VerifyCondition {
    /// Evaluate against the new and previous cell content
    #[must_use]
    pub fn holds(&self, new: &[DishAssignment], previous: &[DishAssignment]) -> bool {
        match self {
            Self::NutrientAbove { field, threshold } => cell_totals(new).get(*field) > *threshold,
            Self::NutrientIncrease { field, ratio } => {
                let before = cell_totals(previous).get(*field);
                let after = cell_totals(new).get(*field);
                if before <= 0.0 {
                    after > 0.0
                } else {
                    after > before * ratio
                }
            }
            Self::DishCategory { categories } => new.iter().any(|dish| {
                dish.category.as_deref().is_some_and(|category| {
                    categories
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(category))
                })
            }),
            Self::MissingNutrition { field } => new.iter().any(|dish| dish.nutrition.get(*field).is_none()),
        }
    }
}

/// A named verify rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRule {
    /// Rule name, reported in propagation notes
    pub name: String,
    /// Diets the rule applies to
    pub applies_to: DietSelector,
    /// Condition on the new content
    pub condition: VerifyCondition,
    /// Operator-facing explanation
    #[serde(default)]
    pub note: String,
}

impl VerifyRule {
    /// Validate rule parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidRule` for empty names, empty selectors or non-positive limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidRule {
            name: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        match &self.applies_to {
            DietSelector::Codes { codes } if codes.is_empty() => {
                return Err(invalid("code selector needs at least one code"));
            }
            DietSelector::GoalNutrient { nutrient } if nutrient.trim().is_empty() => {
                return Err(invalid("goal selector needs a nutrient"));
            }
            _ => {}
        }
        match &self.condition {
            VerifyCondition::NutrientAbove { threshold, .. } if !threshold.is_finite() || *threshold < 0.0 => {
                Err(invalid("threshold must be a non-negative number"))
            }
            VerifyCondition::NutrientIncrease { ratio, .. } if !ratio.is_finite() || *ratio < 1.0 => {
                Err(invalid("increase ratio must be at least 1.0"))
            }
            VerifyCondition::DishCategory { categories } if categories.is_empty() => {
                Err(invalid("category condition needs at least one category"))
            }
            _ => Ok(()),
        }
    }
}

/// Rules shipped by default
#[must_use]
pub fn default_rules() -> Vec<VerifyRule> {
    vec![
        VerifyRule {
            name: "sodium-sensitive".into(),
            applies_to: DietSelector::GoalNutrient {
                nutrient: "Sodium".into(),
            },
            condition: VerifyCondition::NutrientAbove {
                field: NutrientField::Salt,
                threshold: 2.0,
            },
            note: "high-salt content on a diet with its own sodium goal".into(),
        },
        VerifyRule {
            name: "sugar-sensitive".into(),
            applies_to: DietSelector::GoalNutrient {
                nutrient: "Sugars".into(),
            },
            condition: VerifyCondition::NutrientIncrease {
                field: NutrientField::Sugars,
                ratio: 1.25,
            },
            note: "sugar content rises on a diet with its own sugar goal".into(),
        },
    ]
}

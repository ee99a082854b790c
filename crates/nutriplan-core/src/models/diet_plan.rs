// ABOUTME: Diet plan aggregate with lineage, meal structure, goals, exclusions and substitutions
// ABOUTME: Lineage and Facet variants make the one-level base/derived relation explicit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use super::dish::DishAssignment;
use super::ids::{DietPlanId, MealSlotId};
use crate::constants::{Allergen, NutrientInfo};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a diet plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Being prepared, not yet served
    #[default]
    Draft,
    /// In use; meal-slot percentages are validated
    Active,
    /// Retired; skipped by propagation
    Archived,
}

/// Whether a plan owns its facets or inherits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietKind {
    /// Owns every facet outright
    Base,
    /// Inherits facets from exactly one base plan
    Derived,
}

impl fmt::Display for DietKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("base"),
            Self::Derived => f.write_str("derived"),
        }
    }
}

/// Relationship of a plan to its base
///
/// A base diet id exists exactly when the plan is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lineage {
    /// Plan owns all of its facets
    Base,
    /// Plan inherits from `base_diet_id`
    Derived {
        /// The base plan
        base_diet_id: DietPlanId,
    },
}

impl Lineage {
    /// Kind of this lineage
    #[must_use]
    pub const fn kind(&self) -> DietKind {
        match self {
            Self::Base => DietKind::Base,
            Self::Derived { .. } => DietKind::Derived,
        }
    }

    /// Base plan id for derived lineages
    #[must_use]
    pub const fn base_diet_id(&self) -> Option<DietPlanId> {
        match self {
            Self::Base => None,
            Self::Derived { base_diet_id } => Some(*base_diet_id),
        }
    }
}

/// An inheritable unit that is either read from the base or owned locally
///
/// The transition from `Inherited` to `Owned` is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Facet<T> {
    /// Resolved from the base plan at read time
    Inherited,
    /// Stored on this plan
    Owned(T),
}

impl<T> Facet<T> {
    /// Check if the facet still mirrors the base
    #[must_use]
    pub const fn is_inherited(&self) -> bool {
        matches!(self, Self::Inherited)
    }

    /// Borrow the local value if owned
    #[must_use]
    pub const fn as_owned(&self) -> Option<&T> {
        match self {
            Self::Inherited => None,
            Self::Owned(value) => Some(value),
        }
    }

    /// Mutably borrow the local value if owned
    pub fn as_owned_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Inherited => None,
            Self::Owned(value) => Some(value),
        }
    }
}

impl<T> Default for Facet<T> {
    fn default() -> Self {
        Self::Inherited
    }
}

/// Kind of meal served in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MealKind {
    /// Morning meal
    Breakfast,
    /// Mid-morning meal
    SecondBreakfast,
    /// Main midday meal
    #[default]
    Lunch,
    /// Afternoon snack
    AfternoonSnack,
    /// Evening meal
    Dinner,
    /// Any other snack
    Snack,
}

/// One meal slot of a plan's daily structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealSlot {
    /// Slot id, unique within the structure
    pub id: MealSlotId,
    /// Display name
    pub name: String,
    /// Share of the daily energy target (percent)
    pub kcal_percentage: f64,
    /// Kind of meal
    #[serde(default)]
    pub meal_kind: MealKind,
    /// Expected number of dishes
    #[serde(default = "default_item_count")]
    pub item_count: u32,
}

const fn default_item_count() -> u32 {
    1
}

impl MealSlot {
    /// Create a slot with one expected item
    #[must_use]
    pub fn new(id: impl Into<MealSlotId>, name: impl Into<String>, kcal_percentage: f64, meal_kind: MealKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kcal_percentage,
            meal_kind,
            item_count: default_item_count(),
        }
    }
}

/// Where a nutrition goal's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSource {
    /// Goal of a base plan
    Owned,
    /// Derived plan reads the base value
    Inherited,
    /// Derived plan stores its own value
    Overridden,
}

/// Numeric target of a nutrition goal
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalRange {
    /// Lower bound per day
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper bound per day
    #[serde(default)]
    pub max: Option<f64>,
    /// Share of daily energy (percent), for macronutrients
    #[serde(default)]
    pub percent_of_kcal: Option<f64>,
}

impl GoalRange {
    /// Range with both bounds
    #[must_use]
    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            percent_of_kcal: None,
        }
    }

    /// Check that `min <= max` when both are set
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }

    /// Value used as the adherence target: midpoint when both bounds exist
    #[must_use]
    pub fn target(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (Some(value), None) | (None, Some(value)) => Some(value),
            (None, None) => None,
        }
    }
}

/// A nutrition goal stored on a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionGoal {
    /// Canonical nutrient name
    pub nutrient: String,
    /// Local value; ignored while the source is `Inherited`
    #[serde(flatten)]
    pub range: GoalRange,
    /// Value origin
    pub source: GoalSource,
}

impl NutritionGoal {
    /// Goal owned by a base plan
    #[must_use]
    pub fn owned(nutrient: &str, range: GoalRange) -> Self {
        Self {
            nutrient: NutrientInfo::canonical_name(nutrient),
            range,
            source: GoalSource::Owned,
        }
    }

    /// Goal of a derived plan that reads its base value
    #[must_use]
    pub fn inherited(nutrient: &str) -> Self {
        Self {
            nutrient: NutrientInfo::canonical_name(nutrient),
            range: GoalRange::default(),
            source: GoalSource::Inherited,
        }
    }

    /// Goal of a derived plan with a local value
    #[must_use]
    pub fn overridden(nutrient: &str, range: GoalRange) -> Self {
        Self {
            nutrient: NutrientInfo::canonical_name(nutrient),
            range,
            source: GoalSource::Overridden,
        }
    }

    /// Check whether this goal is for `nutrient` (name or alias)
    #[must_use]
    pub fn is_for(&self, nutrient: &str) -> bool {
        self.nutrient
            .eq_ignore_ascii_case(&NutrientInfo::canonical_name(nutrient))
    }
}

/// Category of an exclusion rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionCategory {
    /// EU allergen code
    Allergen,
    /// Ingredient name
    Ingredient,
    /// Dish category
    DishCategory,
}

/// An exclusion rule on a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Exclusion id
    pub id: Uuid,
    /// Rule category
    pub category: ExclusionCategory,
    /// Allergen code, ingredient name or dish category
    pub name: String,
    /// Whether the rule is enforced
    pub active: bool,
    /// Received from the base plan
    #[serde(default)]
    pub from_base: bool,
}

impl Exclusion {
    /// Active, locally added exclusion
    #[must_use]
    pub fn new(category: ExclusionCategory, name: impl Into<String>) -> Self {
        let name = name.into();
        let name = match category {
            ExclusionCategory::Allergen => Allergen::canonical_code(&name),
            ExclusionCategory::Ingredient | ExclusionCategory::DishCategory => name.trim().to_owned(),
        };
        Self {
            id: Uuid::new_v4(),
            category,
            name,
            active: true,
            from_base: false,
        }
    }

    /// Check if two exclusions describe the same rule
    #[must_use]
    pub fn same_rule(&self, other: &Self) -> bool {
        self.category == other.category && self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Check if the rule hits a dish (regardless of `active`)
    #[must_use]
    pub fn matches(&self, dish: &DishAssignment) -> bool {
        match self.category {
            ExclusionCategory::Allergen => dish
                .allergens()
                .contains(&Allergen::canonical_code(&self.name)),
            ExclusionCategory::Ingredient => {
                let needle = self.name.to_lowercase();
                dish.ingredient_names()
                    .iter()
                    .any(|ingredient| ingredient.contains(&needle))
            }
            ExclusionCategory::DishCategory => dish
                .category
                .as_deref()
                .is_some_and(|category| category.eq_ignore_ascii_case(&self.name)),
        }
    }
}

/// Kind of deviation recorded by a substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Element replaced by another
    Replace,
    /// Element removed
    Remove,
    /// Element added
    Add,
    /// Same element, different portion
    PortionChange,
}

/// Explicit deviation of a derived plan from the inherited menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    /// Substitution id
    pub id: Uuid,
    /// Menu element affected (dish, component or meal)
    pub menu_element: String,
    /// Element on the base menu
    pub original: String,
    /// Element served instead
    pub replacement: String,
    /// Kind of change
    pub change_type: ChangeType,
    /// Meal slots the substitution applies to; empty means all
    #[serde(default)]
    pub applies_to: Vec<MealSlotId>,
}

/// Link between a plan and a client institution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssignment {
    /// Client identifier
    pub client_id: String,
    /// Whether the client currently receives this plan
    pub assigned: bool,
    /// First day of the assignment
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Last day of the assignment
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// A diet plan aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlan {
    /// Plan id
    pub id: DietPlanId,
    /// Unique, stable code shown in the UI
    pub code: String,
    /// Display name
    pub name: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: PlanStatus,
    /// Base or derived
    pub lineage: Lineage,
    /// Daily meal slots
    pub meal_structure: Facet<Vec<MealSlot>>,
    /// Nutrition goals
    #[serde(default)]
    pub nutrition_goals: Vec<NutritionGoal>,
    /// Local exclusions, plus shadows of base exclusions once unlocked
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    /// Base exclusions independently toggleable (one-way)
    #[serde(default)]
    pub exclusions_unlocked: bool,
    /// Deviations from the inherited menu (derived plans only)
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    /// Client institutions using this plan
    #[serde(default)]
    pub client_assignments: Vec<ClientAssignment>,
    /// Optimistic concurrency stamp
    #[serde(default)]
    pub version: u64,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl DietPlan {
    /// New base plan with an empty owned meal structure
    #[must_use]
    pub fn new_base(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_lineage(code.into(), name.into(), Lineage::Base, Facet::Owned(Vec::new()))
    }

    /// New derived plan mirroring its base's meal structure
    #[must_use]
    pub fn new_derived(code: impl Into<String>, name: impl Into<String>, base_diet_id: DietPlanId) -> Self {
        Self::with_lineage(
            code.into(),
            name.into(),
            Lineage::Derived { base_diet_id },
            Facet::Inherited,
        )
    }

    fn with_lineage(code: String, name: String, lineage: Lineage, meal_structure: Facet<Vec<MealSlot>>) -> Self {
        Self {
            id: DietPlanId::new(),
            code,
            name,
            status: PlanStatus::Draft,
            lineage,
            meal_structure,
            nutrition_goals: Vec::new(),
            exclusions: Vec::new(),
            exclusions_unlocked: false,
            substitutions: Vec::new(),
            client_assignments: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Base or derived
    #[must_use]
    pub const fn kind(&self) -> DietKind {
        self.lineage.kind()
    }

    /// Check if the plan is derived
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        matches!(self.lineage, Lineage::Derived { .. })
    }

    /// Base plan id, when derived
    #[must_use]
    pub const fn base_diet_id(&self) -> Option<DietPlanId> {
        self.lineage.base_diet_id()
    }

    /// Stored goal for a nutrient
    #[must_use]
    pub fn goal(&self, nutrient: &str) -> Option<&NutritionGoal> {
        self.nutrition_goals.iter().find(|goal| goal.is_for(nutrient))
    }

    /// Mutable stored goal for a nutrient
    pub fn goal_mut(&mut self, nutrient: &str) -> Option<&mut NutritionGoal> {
        self.nutrition_goals
            .iter_mut()
            .find(|goal| goal.is_for(nutrient))
    }

    /// Owned meal slots, if the structure is not inherited
    #[must_use]
    pub fn owned_meal_slots(&self) -> Option<&[MealSlot]> {
        self.meal_structure.as_owned().map(Vec::as_slice)
    }

    /// Bump the version stamp after a successful mutation
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

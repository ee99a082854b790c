// ABOUTME: Dish assignment model placed into menu cells, with denormalized nutrition snapshot
// ABOUTME: NutritionSnapshot, NutrientField, CompositionItem and portion resizing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::constants::Allergen;
use crate::errors::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Aggregatable nutrition field of a dish snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientField {
    /// Energy (kcal)
    Kcal,
    /// Protein (g)
    Protein,
    /// Total fat (g)
    Fat,
    /// Saturated fat (g)
    SaturatedFat,
    /// Carbohydrates (g)
    Carbs,
    /// Sugars (g)
    Sugars,
    /// Salt (g)
    Salt,
    /// Fiber (g)
    Fiber,
    /// Food cost per portion
    Cost,
}

impl NutrientField {
    /// All fields in display order
    pub const ALL: [Self; 9] = [
        Self::Kcal,
        Self::Protein,
        Self::Fat,
        Self::SaturatedFat,
        Self::Carbs,
        Self::Sugars,
        Self::Salt,
        Self::Fiber,
        Self::Cost,
    ];
}

/// Denormalized nutrition data copied from the catalog when a dish is assigned
///
/// Fields are optional because catalog entries are often incomplete; the
/// aggregator treats a missing field as zero and reports the gap separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionSnapshot {
    /// Energy (kcal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcal: Option<f64>,
    /// Protein (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    /// Fat (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    /// Saturated fat (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturated_fat: Option<f64>,
    /// Carbohydrates (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    /// Sugars (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugars: Option<f64>,
    /// Salt (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<f64>,
    /// Fiber (g)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<f64>,
    /// Food cost per portion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl NutritionSnapshot {
    /// Read one field
    #[must_use]
    pub const fn get(&self, field: NutrientField) -> Option<f64> {
        match field {
            NutrientField::Kcal => self.kcal,
            NutrientField::Protein => self.protein,
            NutrientField::Fat => self.fat,
            NutrientField::SaturatedFat => self.saturated_fat,
            NutrientField::Carbs => self.carbs,
            NutrientField::Sugars => self.sugars,
            NutrientField::Salt => self.salt,
            NutrientField::Fiber => self.fiber,
            NutrientField::Cost => self.cost,
        }
    }

    /// Fields with no value
    pub fn missing_fields(&self) -> impl Iterator<Item = NutrientField> + '_ {
        NutrientField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_none())
    }

    /// Snapshot with every present value multiplied by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |value: Option<f64>| value.map(|v| v * factor);
        Self {
            kcal: scale(self.kcal),
            protein: scale(self.protein),
            fat: scale(self.fat),
            saturated_fat: scale(self.saturated_fat),
            carbs: scale(self.carbs),
            sugars: scale(self.sugars),
            salt: scale(self.salt),
            fiber: scale(self.fiber),
            cost: scale(self.cost),
        }
    }
}

/// Sub-item of a composite dish, kept for detailed display and exclusion checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionItem {
    /// Ingredient or component name
    pub name: String,
    /// Portion of this component (g)
    pub portion_grams: f64,
    /// Allergen codes carried by this component
    #[serde(default)]
    pub allergen_codes: Vec<String>,
}

/// A dish placed into a menu cell
///
/// Identity is `reference_id`; resizing the portion never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishAssignment {
    /// Catalog reference
    pub reference_id: String,
    /// Display name
    pub name: String,
    /// Served portion (g)
    pub portion_grams: f64,
    /// Nutrition for the served portion
    #[serde(default)]
    pub nutrition: NutritionSnapshot,
    /// Allergen codes declared on the dish itself
    #[serde(default)]
    pub allergen_codes: Vec<String>,
    /// Dish category (soup, main course, dessert, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Components, when the catalog provides them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composition: Vec<CompositionItem>,
}

impl DishAssignment {
    /// Create an assignment with an empty nutrition snapshot
    #[must_use]
    pub fn new(reference_id: impl Into<String>, name: impl Into<String>, portion_grams: f64) -> Self {
        Self {
            reference_id: reference_id.into(),
            name: name.into(),
            portion_grams,
            nutrition: NutritionSnapshot::default(),
            allergen_codes: Vec::new(),
            category: None,
            composition: Vec::new(),
        }
    }

    /// Builder: set the nutrition snapshot
    #[must_use]
    pub fn with_nutrition(mut self, nutrition: NutritionSnapshot) -> Self {
        self.nutrition = nutrition;
        self
    }

    /// Builder: set declared allergens
    #[must_use]
    pub fn with_allergens<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allergen_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set the dish category
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builder: set composition items
    #[must_use]
    pub fn with_composition(mut self, composition: Vec<CompositionItem>) -> Self {
        self.composition = composition;
        self
    }

    /// Canonical allergen codes of the dish and all of its components
    #[must_use]
    pub fn allergens(&self) -> BTreeSet<String> {
        self.allergen_codes
            .iter()
            .chain(self.composition.iter().flat_map(|c| c.allergen_codes.iter()))
            .map(|code| Allergen::canonical_code(code))
            .collect()
    }

    /// Lower-cased ingredient names (components plus the dish name itself)
    #[must_use]
    pub fn ingredient_names(&self) -> BTreeSet<String> {
        std::iter::once(self.name.as_str())
            .chain(self.composition.iter().map(|c| c.name.as_str()))
            .map(str::to_lowercase)
            .collect()
    }

    /// Resize the portion in place, scaling nutrition and components proportionally
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive or non-finite portion.
    pub fn resize_portion(&mut self, portion_grams: f64) -> Result<(), PlanError> {
        if !portion_grams.is_finite() || portion_grams <= 0.0 {
            return Err(PlanError::invalid_input(format!(
                "portion for '{}' must be positive, got {portion_grams}",
                self.reference_id
            )));
        }

        if self.portion_grams > 0.0 {
            let factor = portion_grams / self.portion_grams;
            self.nutrition = self.nutrition.scaled(factor);
            for item in &mut self.composition {
                item.portion_grams *= factor;
            }
        }
        self.portion_grams = portion_grams;
        Ok(())
    }
}

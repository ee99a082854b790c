// ABOUTME: Read-only dish catalog collaborator used when dishes are added to menu cells
// ABOUTME: DishCatalog trait, CatalogDish entries and an in-memory implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use nutriplan_core::constants::MeasurementUnit;
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{CompositionItem, DishAssignment, NutritionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A catalog entry with nutrition for its reference portion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDish {
    /// Catalog reference
    pub reference_id: String,
    /// Display name
    pub name: String,
    /// Portion the nutrition values refer to (g)
    pub portion_grams: f64,
    /// Nutrition for `portion_grams`
    #[serde(default)]
    pub nutrition: NutritionSnapshot,
    /// Declared allergen codes
    #[serde(default)]
    pub allergen_codes: Vec<String>,
    /// Dish category
    #[serde(default)]
    pub category: Option<String>,
    /// Components
    #[serde(default)]
    pub composition: Vec<CompositionItem>,
    /// Density for volume quantities (g/ml)
    #[serde(default)]
    pub grams_per_ml: Option<f64>,
    /// Weight of one piece (g)
    #[serde(default)]
    pub grams_per_piece: Option<f64>,
}

impl CatalogDish {
    /// Build a cell assignment, optionally resized from the reference portion
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive portion.
    pub fn assign(&self, portion_grams: Option<f64>) -> PlanResult<DishAssignment> {
        let mut dish = DishAssignment::new(&self.reference_id, &self.name, self.portion_grams)
            .with_nutrition(self.nutrition.clone())
            .with_allergens(&self.allergen_codes)
            .with_composition(self.composition.clone());
        if let Some(category) = &self.category {
            dish = dish.with_category(category);
        }
        if let Some(portion) = portion_grams {
            dish.resize_portion(portion)?;
        }
        Ok(dish)
    }

    /// Build a cell assignment from a quantity in any measurement unit
    ///
    /// `Portions` count reference portions, `Pieces` use `grams_per_piece`
    /// and volume units use `grams_per_ml`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the quantity is invalid or the dish lacks
    /// the density or piece weight the unit needs.
    pub fn assign_quantity(&self, amount: f64, unit: MeasurementUnit) -> PlanResult<DishAssignment> {
        let grams_per_unit = match unit {
            MeasurementUnit::Portions => Some(self.portion_grams),
            _ => self.grams_per_piece,
        };
        let grams = unit
            .to_grams(amount, self.grams_per_ml, grams_per_unit)
            .map_err(|e| PlanError::invalid_input(format!("dish '{}': {e}", self.reference_id)))?;
        self.assign(Some(grams))
    }
}

/// Read-only dish lookup; the engine never writes catalog data
pub trait DishCatalog: Send + Sync {
    /// Resolve a dish by reference id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown references.
    fn resolve_dish(&self, reference_id: &str) -> PlanResult<CatalogDish>;
}

/// Catalog backed by a hash map, for tests, tools and preloaded snapshots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<CatalogDish>", into = "Vec<CatalogDish>")]
pub struct InMemoryCatalog {
    dishes: HashMap<String, CatalogDish>,
}

impl InMemoryCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    pub fn insert(&mut self, dish: CatalogDish) {
        self.dishes.insert(dish.reference_id.clone(), dish);
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.dishes.len()
    }

    /// Check if the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }
}

impl From<Vec<CatalogDish>> for InMemoryCatalog {
    fn from(dishes: Vec<CatalogDish>) -> Self {
        Self {
            dishes: dishes
                .into_iter()
                .map(|dish| (dish.reference_id.clone(), dish))
                .collect(),
        }
    }
}

impl From<InMemoryCatalog> for Vec<CatalogDish> {
    fn from(catalog: InMemoryCatalog) -> Self {
        let mut dishes: Self = catalog.dishes.into_values().collect();
        dishes.sort_by(|a, b| a.reference_id.cmp(&b.reference_id));
        dishes
    }
}

impl DishCatalog for InMemoryCatalog {
    fn resolve_dish(&self, reference_id: &str) -> PlanResult<CatalogDish> {
        self.dishes
            .get(reference_id)
            .cloned()
            .ok_or_else(|| PlanError::not_found("dish", reference_id))
    }
}

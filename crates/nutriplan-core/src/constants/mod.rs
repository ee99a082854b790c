// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Static reference catalog (allergens, nutrients, units) and engine-wide values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Constants module
//!
//! Static reference data consumed (never produced) by the engine, grouped by
//! domain rather than kept in a single large file.

/// Fixed EU allergen exclusion set
pub mod allergens;
/// Nutrient names, units and aggregation mapping
pub mod nutrients;
/// Measurement units and conversions to grams
pub mod units;

pub use allergens::{Allergen, EU_ALLERGENS};
pub use nutrients::{NutrientInfo, NutrientSource, NUTRIENTS, SODIUM_MG_PER_SALT_G};
pub use units::{MeasurementUnit, UnitConversionError};

/// Menu calendar constants
pub mod menu {
    /// Days in one menu week
    pub const DAYS_PER_WEEK: usize = 7;
    /// Meal slot kcal percentages of an active plan must sum to this value
    pub const KCAL_PERCENT_TOTAL: f64 = 100.0;
    /// Default menu cycle length in days
    pub const DEFAULT_CYCLE_LENGTH: u32 = 28;
}

/// Energy content of macronutrients (kcal per gram)
pub mod energy {
    /// Protein kcal per gram
    pub const PROTEIN_KCAL_PER_G: f64 = 4.0;
    /// Fat kcal per gram
    pub const FAT_KCAL_PER_G: f64 = 9.0;
    /// Carbohydrate kcal per gram
    pub const CARBS_KCAL_PER_G: f64 = 4.0;
}

/// Service identity used in structured logs
pub mod service_names {
    /// Engine service name
    pub const NUTRIPLAN: &str = "nutriplan";
    /// CLI binary name
    pub const NUTRIPLAN_CLI: &str = "nutriplan-cli";
}

/// Numeric comparison tolerance for goal values and percentages
pub const FLOAT_EPSILON: f64 = 1e-6;

// ABOUTME: Nutrient reference catalog with display units and aggregation mapping
// ABOUTME: Maps goal nutrient names onto the dish nutrition snapshot fields
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use crate::models::NutrientField;
use serde::Serialize;

/// How a nutrient's daily value is obtained from aggregated dish data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NutrientSource {
    /// Read directly from a nutrition snapshot field
    Field(NutrientField),
    /// Sodium in mg computed from salt in g
    SodiumFromSalt,
    /// Not present in dish snapshots; goals can be stored but not measured
    Untracked,
}

/// Static description of a nutrient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NutrientInfo {
    /// Canonical name used in nutrition goals
    pub name: &'static str,
    /// Display unit
    pub unit: &'static str,
    /// Alternative spellings accepted on lookup
    pub aliases: &'static [&'static str],
    /// Where aggregated values come from
    pub source: NutrientSource,
}

/// Milligrams of sodium per gram of salt (salt = sodium x 2.5)
pub const SODIUM_MG_PER_SALT_G: f64 = 400.0;

/// Nutrients known to the catalog
pub const NUTRIENTS: [NutrientInfo; 13] = [
    NutrientInfo {
        name: "Energy",
        unit: "kcal",
        aliases: &["kcal", "calories", "energy_kcal"],
        source: NutrientSource::Field(NutrientField::Kcal),
    },
    NutrientInfo {
        name: "Protein",
        unit: "g",
        aliases: &["proteins"],
        source: NutrientSource::Field(NutrientField::Protein),
    },
    NutrientInfo {
        name: "Fat",
        unit: "g",
        aliases: &["fats", "total_fat"],
        source: NutrientSource::Field(NutrientField::Fat),
    },
    NutrientInfo {
        name: "SaturatedFat",
        unit: "g",
        aliases: &["saturated_fat", "saturates"],
        source: NutrientSource::Field(NutrientField::SaturatedFat),
    },
    NutrientInfo {
        name: "Carbohydrates",
        unit: "g",
        aliases: &["carbs", "carbohydrate"],
        source: NutrientSource::Field(NutrientField::Carbs),
    },
    NutrientInfo {
        name: "Sugars",
        unit: "g",
        aliases: &["sugar"],
        source: NutrientSource::Field(NutrientField::Sugars),
    },
    NutrientInfo {
        name: "Salt",
        unit: "g",
        aliases: &[],
        source: NutrientSource::Field(NutrientField::Salt),
    },
    NutrientInfo {
        name: "Fiber",
        unit: "g",
        aliases: &["fibre", "dietary_fiber"],
        source: NutrientSource::Field(NutrientField::Fiber),
    },
    NutrientInfo {
        name: "Sodium",
        unit: "mg",
        aliases: &["na"],
        source: NutrientSource::SodiumFromSalt,
    },
    NutrientInfo {
        name: "Calcium",
        unit: "mg",
        aliases: &["ca"],
        source: NutrientSource::Untracked,
    },
    NutrientInfo {
        name: "Iron",
        unit: "mg",
        aliases: &["fe"],
        source: NutrientSource::Untracked,
    },
    NutrientInfo {
        name: "Potassium",
        unit: "mg",
        aliases: &["k"],
        source: NutrientSource::Untracked,
    },
    NutrientInfo {
        name: "Cholesterol",
        unit: "mg",
        aliases: &[],
        source: NutrientSource::Untracked,
    },
];

impl NutrientInfo {
    /// Find a nutrient by canonical name or alias (case-insensitive)
    #[must_use]
    pub fn lookup(name: &str) -> Option<&'static Self> {
        let name = name.trim();
        NUTRIENTS.iter().find(|info| {
            info.name.eq_ignore_ascii_case(name)
                || info.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }

    /// Canonical goal key for a nutrient name
    ///
    /// Known nutrients map to their catalog name; unknown names are kept
    /// (trimmed) so custom goals can still be stored.
    #[must_use]
    pub fn canonical_name(name: &str) -> String {
        Self::lookup(name).map_or_else(|| name.trim().to_owned(), |info| info.name.to_owned())
    }
}

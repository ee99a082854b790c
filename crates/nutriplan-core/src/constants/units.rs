// ABOUTME: Measurement units used for dish portions and composition items
// ABOUTME: Converts mass, volume and count quantities to grams
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Volume conversion constants (to milliliters)
const ML_PER_LITER: f64 = 1000.0;
const ML_PER_CUP: f64 = 240.0;
const ML_PER_TBSP: f64 = 15.0;
const ML_PER_TSP: f64 = 5.0;

/// Weight conversion constants (to grams)
const GRAMS_PER_KG: f64 = 1000.0;
const MG_PER_GRAM: f64 = 1000.0;

/// Measurement unit for portions and composition quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementUnit {
    /// Weight in grams (base unit)
    #[default]
    Grams,
    /// Weight in kilograms
    Kilograms,
    /// Weight in milligrams
    Milligrams,
    /// Volume in milliliters
    Milliliters,
    /// Volume in liters
    Liters,
    /// US cup (240 ml)
    Cups,
    /// Tablespoon (15 ml)
    Tablespoons,
    /// Teaspoon (5 ml)
    Teaspoons,
    /// Count of whole items
    Pieces,
    /// Catalog-defined standard portion
    Portions,
}

/// Conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitConversionError {
    /// Negative or non-finite quantity
    #[error("invalid quantity {0}: must be a finite, non-negative number")]
    InvalidAmount(f64),
    /// Volume unit without a density
    #[error("unit {0:?} needs a density (g/ml) to convert to grams")]
    MissingDensity(MeasurementUnit),
    /// Count/portion unit without a unit weight
    #[error("unit {0:?} needs a unit weight (g) to convert to grams")]
    MissingUnitWeight(MeasurementUnit),
}

impl MeasurementUnit {
    /// Parse a unit symbol such as `g`, `ml`, `tbsp` or `portion` (case-insensitive)
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let unit = match symbol.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" => Self::Grams,
            "kg" => Self::Kilograms,
            "mg" => Self::Milligrams,
            "ml" => Self::Milliliters,
            "l" => Self::Liters,
            "cup" | "cups" => Self::Cups,
            "tbsp" => Self::Tablespoons,
            "tsp" => Self::Teaspoons,
            "piece" | "pieces" | "pc" => Self::Pieces,
            "portion" | "portions" => Self::Portions,
            _ => return None,
        };
        Some(unit)
    }

    /// Check if this unit is a volume measurement
    #[must_use]
    pub const fn is_volume(&self) -> bool {
        matches!(
            self,
            Self::Milliliters | Self::Liters | Self::Cups | Self::Tablespoons | Self::Teaspoons
        )
    }

    /// Check if this unit is a mass measurement
    #[must_use]
    pub const fn is_mass(&self) -> bool {
        matches!(self, Self::Grams | Self::Kilograms | Self::Milligrams)
    }

    /// Milliliters represented by one unit, for volume units
    const fn milliliters(self) -> Option<f64> {
        match self {
            Self::Milliliters => Some(1.0),
            Self::Liters => Some(ML_PER_LITER),
            Self::Cups => Some(ML_PER_CUP),
            Self::Tablespoons => Some(ML_PER_TBSP),
            Self::Teaspoons => Some(ML_PER_TSP),
            _ => None,
        }
    }

    /// Convert a quantity in this unit to grams
    ///
    /// `grams_per_ml` is required for volume units, `grams_per_unit` for
    /// pieces and portions.
    ///
    /// # Errors
    ///
    /// Returns an error for negative quantities or when the required density
    /// or unit weight is missing.
    pub fn to_grams(
        self,
        amount: f64,
        grams_per_ml: Option<f64>,
        grams_per_unit: Option<f64>,
    ) -> Result<f64, UnitConversionError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(UnitConversionError::InvalidAmount(amount));
        }

        match self {
            Self::Grams => Ok(amount),
            Self::Kilograms => Ok(amount * GRAMS_PER_KG),
            Self::Milligrams => Ok(amount / MG_PER_GRAM),
            Self::Pieces | Self::Portions => grams_per_unit
                .map(|weight| amount * weight)
                .ok_or(UnitConversionError::MissingUnitWeight(self)),
            volume => {
                let ml = volume.milliliters().unwrap_or(1.0) * amount;
                grams_per_ml
                    .map(|density| ml * density)
                    .ok_or(UnitConversionError::MissingDensity(volume))
            }
        }
    }
}

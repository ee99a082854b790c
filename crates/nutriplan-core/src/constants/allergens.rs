// ABOUTME: The fixed set of fourteen EU declarable allergens (Regulation 1169/2011 Annex II)
// ABOUTME: Stable codes used by dish allergen lists and allergen exclusions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use serde::Serialize;

/// One declarable allergen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allergen {
    /// Annex II ordinal (1-14)
    pub number: u8,
    /// Stable code stored on dishes and exclusions
    pub code: &'static str,
    /// Display name
    pub name: &'static str,
}

/// The EU allergen exclusion set, in Annex II order
pub const EU_ALLERGENS: [Allergen; 14] = [
    Allergen { number: 1, code: "GLUTEN", name: "Cereals containing gluten" },
    Allergen { number: 2, code: "CRUSTACEANS", name: "Crustaceans" },
    Allergen { number: 3, code: "EGGS", name: "Eggs" },
    Allergen { number: 4, code: "FISH", name: "Fish" },
    Allergen { number: 5, code: "PEANUTS", name: "Peanuts" },
    Allergen { number: 6, code: "SOYBEANS", name: "Soybeans" },
    Allergen { number: 7, code: "MILK", name: "Milk" },
    Allergen { number: 8, code: "NUTS", name: "Nuts" },
    Allergen { number: 9, code: "CELERY", name: "Celery" },
    Allergen { number: 10, code: "MUSTARD", name: "Mustard" },
    Allergen { number: 11, code: "SESAME", name: "Sesame seeds" },
    Allergen { number: 12, code: "SULPHITES", name: "Sulphur dioxide and sulphites" },
    Allergen { number: 13, code: "LUPIN", name: "Lupin" },
    Allergen { number: 14, code: "MOLLUSCS", name: "Molluscs" },
];

impl Allergen {
    /// Look up an allergen by code, Annex II number, or name (case-insensitive)
    #[must_use]
    pub fn lookup(key: &str) -> Option<&'static Self> {
        let key = key.trim();
        if let Ok(number) = key.parse::<u8>() {
            return EU_ALLERGENS.iter().find(|a| a.number == number);
        }
        EU_ALLERGENS
            .iter()
            .find(|a| a.code.eq_ignore_ascii_case(key) || a.name.eq_ignore_ascii_case(key))
    }

    /// Normalize any accepted allergen key to its canonical code
    ///
    /// Unknown keys are upper-cased and returned unchanged so local allergen
    /// codes still compare consistently.
    #[must_use]
    pub fn canonical_code(key: &str) -> String {
        Self::lookup(key).map_or_else(|| key.trim().to_uppercase(), |a| a.code.to_owned())
    }
}

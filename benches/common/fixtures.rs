// ABOUTME: Benchmark fixtures building a catering client with many derived diets
// ABOUTME: Deterministic generation of plans, a four-week package and a dish catalog
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Benchmark fixtures for reproducible performance measurements.

use chrono::NaiveDate;
use nutriplan::constants::menu;
use nutriplan::engine::catalog::{CatalogDish, DishCatalog, InMemoryCatalog};
use nutriplan::engine::grid;
use nutriplan::engine::PlanBook;
use nutriplan::models::{
    CellAddress, DietPlan, DietPlanId, DishAssignment, Exclusion, ExclusionCategory, Facet,
    GoalRange, MealKind, MealSlot, MenuPackage, MenuPeriod, NutritionGoal, NutritionSnapshot,
};

/// Number of derived diets in a scenario
#[derive(Debug, Clone, Copy)]
pub enum DietCount {
    /// A small kitchen (5 derived diets)
    Small,
    /// A hospital kitchen (40 derived diets)
    Large,
}

impl DietCount {
    #[must_use]
    pub const fn count(self) -> usize {
        match self {
            Self::Small => 5,
            Self::Large => 40,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Small => "5_diets",
            Self::Large => "40_diets",
        }
    }
}

const SLOTS: [(&str, f64, MealKind); 4] = [
    ("breakfast", 25.0, MealKind::Breakfast),
    ("lunch", 35.0, MealKind::Lunch),
    ("snack", 10.0, MealKind::Snack),
    ("dinner", 30.0, MealKind::Dinner),
];

const ALLERGENS: [&str; 4] = ["GLUTEN", "MILK", "EGGS", "CELERY"];

/// Generated scenario
pub struct Scenario {
    pub book: PlanBook,
    pub package: MenuPackage,
    pub catalog: InMemoryCatalog,
    pub base: DietPlanId,
    pub derived: Vec<DietPlanId>,
}

fn nutrition(seed: usize) -> NutritionSnapshot {
    let factor = (seed % 7) as f64;
    NutritionSnapshot {
        kcal: Some(factor.mul_add(35.0, 120.0)),
        protein: Some(factor.mul_add(2.0, 4.0)),
        fat: Some(factor + 3.0),
        saturated_fat: Some(factor.mul_add(0.5, 1.0)),
        carbs: Some(factor.mul_add(3.0, 15.0)),
        sugars: Some(factor + 1.0),
        salt: Some(factor.mul_add(0.2, 0.5)),
        fiber: Some(2.0),
        cost: Some(1.2),
    }
}

/// Catalog with `size` dishes cycling through a few allergens
#[must_use]
pub fn catalog(size: usize) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for index in 0..size {
        let allergen_codes = if index % 3 == 0 {
            vec![ALLERGENS[index % ALLERGENS.len()].to_owned()]
        } else {
            Vec::new()
        };
        catalog.insert(CatalogDish {
            reference_id: format!("dish-{index}"),
            name: format!("Dish {index}"),
            portion_grams: 250.0,
            nutrition: nutrition(index),
            allergen_codes,
            category: Some(if index % 2 == 0 { "main" } else { "side" }.to_owned()),
            composition: Vec::new(),
            grams_per_ml: None,
            grams_per_piece: None,
        });
    }
    catalog
}

fn assigned(catalog: &InMemoryCatalog, index: usize) -> Vec<DishAssignment> {
    let size = catalog.len();
    [index % size, (index * 7 + 3) % size]
        .iter()
        .map(|dish| catalog.resolve_dish(&format!("dish-{dish}")).unwrap())
        .map(|dish| dish.assign(None).unwrap())
        .collect()
}

/// Base diet plus `diets` derived diets on a fully planned four-week cycle
///
/// Every third derived diet overrides the lunch cells of its first week.
#[must_use]
pub fn scenario(diets: DietCount) -> Scenario {
    let catalog = catalog(60);
    let mut base = DietPlan::new_base("STANDARD", "Standard diet");
    base.meal_structure = Facet::Owned(
        SLOTS
            .iter()
            .map(|(id, share, kind)| MealSlot::new(*id, *id, *share, *kind))
            .collect(),
    );
    base.nutrition_goals = vec![
        NutritionGoal::owned("Sodium", GoalRange::between(1800.0, 2200.0)),
        NutritionGoal::owned("Protein", GoalRange::between(60.0, 90.0)),
        NutritionGoal::owned("Energy", GoalRange::between(1800.0, 2400.0)),
    ];
    let base_id = base.id;

    let mut book = PlanBook::new();
    book.insert(base).unwrap();
    let mut derived = Vec::with_capacity(diets.count());
    for index in 0..diets.count() {
        let mut plan = DietPlan::new_derived(format!("D{index:02}"), format!("Derived {index}"), base_id);
        plan.exclusions.push(Exclusion::new(
            ExclusionCategory::Allergen,
            ALLERGENS[index % ALLERGENS.len()],
        ));
        derived.push(plan.id);
        book.insert(plan).unwrap();
    }

    let period = MenuPeriod {
        from: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        to: NaiveDate::from_ymd_opt(2025, 3, 30).unwrap(),
    };
    let mut package = MenuPackage::new("bench-client", period, menu::DEFAULT_CYCLE_LENGTH).unwrap();

    let mut seed = 0;
    let resolver = book.resolver(base_id).unwrap();
    for offset in 0..package.cycle_length as usize {
        for (slot, _, _) in SLOTS {
            let address = CellAddress::new(offset / 7, offset % 7, slot);
            grid::write_cell(&mut package, resolver, &address, assigned(&catalog, seed)).unwrap();
            seed += 1;
        }
    }
    for id in derived.iter().step_by(3) {
        let resolver = book.resolver(*id).unwrap();
        for day in 0..7 {
            let address = CellAddress::new(0, day, "lunch");
            grid::write_cell(&mut package, resolver, &address, assigned(&catalog, seed)).unwrap();
            seed += 1;
        }
    }

    Scenario {
        book,
        package,
        catalog,
        base: base_id,
        derived,
    }
}

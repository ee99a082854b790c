// ABOUTME: Shared test utilities and fixtures for integration tests
// ABOUTME: Builds the STANDARD / GF / DIABETIC plans, a two-week package and a small dish catalog
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::too_many_lines
)]
//! Shared test utilities for `nutriplan`
//!
//! The fixture mirrors a small catering client: a STANDARD base diet with
//! breakfast, lunch and dinner slots and a Sodium goal of 1800-2200 mg, a
//! gluten-free derived diet (GF) excluding gluten, and a DIABETIC derived
//! diet with no exclusions. The package holds two weeks with Soup A on
//! STANDARD's lunch of week 0, day 2.

use chrono::NaiveDate;
use nutriplan::engine::audit::MemoryAuditSink;
use nutriplan::engine::catalog::{CatalogDish, DishCatalog, InMemoryCatalog};
use nutriplan::engine::grid;
use nutriplan::engine::{EngineConfig, PlanBook};
use nutriplan::models::{
    CellAddress, DietPlan, DietPlanId, DishAssignment, Exclusion, ExclusionCategory, GoalRange,
    MealKind, MealSlot, MenuPackage, MenuPeriod, NutritionGoal, NutritionSnapshot,
};
use nutriplan::services::{PlanningService, PlanningSnapshot};
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

pub const BREAKFAST: &str = "breakfast";
pub const LUNCH: &str = "lunch";
pub const DINNER: &str = "dinner";

/// Week 0, day 2, lunch: the cell every scenario revolves around
pub fn lunch_day_2() -> CellAddress {
    CellAddress::new(0, 2, LUNCH)
}

/// Nutrition snapshot with every field present
pub fn nutrition(kcal: f64, protein: f64, fat: f64, carbs: f64, sugars: f64, salt: f64) -> NutritionSnapshot {
    NutritionSnapshot {
        kcal: Some(kcal),
        protein: Some(protein),
        fat: Some(fat),
        saturated_fat: Some(fat / 3.0),
        carbs: Some(carbs),
        sugars: Some(sugars),
        salt: Some(salt),
        fiber: Some(2.0),
        cost: Some(1.5),
    }
}

fn catalog_dish(reference_id: &str, name: &str, portion_grams: f64, nutrition: NutritionSnapshot, allergens: &[&str], category: &str) -> CatalogDish {
    CatalogDish {
        reference_id: reference_id.to_owned(),
        name: name.to_owned(),
        portion_grams,
        nutrition,
        allergen_codes: allergens.iter().map(|code| (*code).to_owned()).collect(),
        category: Some(category.to_owned()),
        composition: Vec::new(),
        grams_per_ml: None,
        grams_per_piece: None,
    }
}

/// Catalog with three soups, a gluten bread, a salty stew and a dessert
pub fn catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog.insert(catalog_dish("soup-a", "Soup A", 300.0, nutrition(150.0, 6.0, 4.0, 20.0, 3.0, 1.2), &[], "soup"));
    catalog.insert(catalog_dish("soup-b", "Soup B", 300.0, nutrition(120.0, 5.0, 3.0, 18.0, 2.0, 1.0), &[], "soup"));
    catalog.insert(catalog_dish("soup-c", "Soup C", 300.0, nutrition(180.0, 8.0, 6.0, 22.0, 3.0, 1.4), &["CELERY"], "soup"));
    catalog.insert(catalog_dish("wheat-bread", "Wheat bread", 50.0, nutrition(130.0, 4.0, 1.0, 25.0, 1.0, 0.6), &["GLUTEN"], "bread"));
    catalog.insert(catalog_dish("salty-stew", "Salty stew", 350.0, nutrition(420.0, 25.0, 18.0, 35.0, 4.0, 3.2), &[], "main"));
    catalog.insert(catalog_dish("pudding", "Rice pudding", 150.0, nutrition(210.0, 5.0, 6.0, 34.0, 18.0, 0.2), &["MILK"], "dessert"));
    catalog
}

/// A dish from the fixture catalog at its reference portion
pub fn dish(reference_id: &str) -> DishAssignment {
    catalog()
        .resolve_dish(reference_id)
        .unwrap()
        .assign(None)
        .unwrap()
}

/// STANDARD base diet with three slots and a Sodium goal of 1800-2200 mg
pub fn standard_plan() -> DietPlan {
    let mut plan = DietPlan::new_base("STANDARD", "Standard diet");
    plan.meal_structure = nutriplan::models::Facet::Owned(vec![
        MealSlot::new(BREAKFAST, "Breakfast", 25.0, MealKind::Breakfast),
        MealSlot::new(LUNCH, "Lunch", 40.0, MealKind::Lunch),
        MealSlot::new(DINNER, "Dinner", 35.0, MealKind::Dinner),
    ]);
    plan.nutrition_goals = vec![
        NutritionGoal::owned("Sodium", GoalRange::between(1800.0, 2200.0)),
        NutritionGoal::owned("Protein", GoalRange::between(60.0, 90.0)),
    ];
    plan
}

/// All fixture ids plus the snapshot they live in
pub struct Fixture {
    pub book: PlanBook,
    pub package: MenuPackage,
    pub standard: DietPlanId,
    pub gf: DietPlanId,
    pub diabetic: DietPlanId,
    pub catalog: InMemoryCatalog,
}

impl Fixture {
    /// STANDARD, GF (excluding gluten) and DIABETIC with Soup A on STANDARD's lunch of day 2
    pub fn new() -> Self {
        init_test_logging();
        let standard = standard_plan();
        let mut gf = DietPlan::new_derived("GF", "Gluten-free", standard.id);
        gf.exclusions.push(Exclusion::new(ExclusionCategory::Allergen, "gluten"));
        let diabetic = DietPlan::new_derived("DIABETIC", "Diabetic", standard.id);

        let ids = (standard.id, gf.id, diabetic.id);
        let mut book = PlanBook::new();
        book.insert(standard).unwrap();
        book.insert(gf).unwrap();
        book.insert(diabetic).unwrap();

        let mut package = MenuPackage::new("client-1", period(), 14).unwrap();
        grid::write_cell(
            &mut package,
            book.resolver(ids.0).unwrap(),
            &lunch_day_2(),
            vec![dish("soup-a")],
        )
        .unwrap();

        Self {
            book,
            package,
            standard: ids.0,
            gf: ids.1,
            diabetic: ids.2,
            catalog: catalog(),
        }
    }

    /// Snapshot for loading into a `PlanningService`
    pub fn snapshot(&self) -> PlanningSnapshot {
        PlanningSnapshot {
            plans: self.book.plans().cloned().collect(),
            packages: vec![self.package.clone()],
            catalog: self.catalog.clone(),
        }
    }

    /// Service over this fixture with an in-memory audit sink
    pub fn service(&self) -> (PlanningService, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let service = PlanningService::from_snapshot(
            self.snapshot(),
            audit.clone(),
            EngineConfig::default(),
            "dietitian-1",
        )
        .unwrap();
        (service, audit)
    }
}

/// Two-week menu period starting on a Monday
pub fn period() -> MenuPeriod {
    MenuPeriod {
        from: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
        to: NaiveDate::from_ymd_opt(2025, 1, 19).unwrap(),
    }
}

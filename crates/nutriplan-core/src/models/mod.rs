// ABOUTME: Core data models for diet plans, menu packages and dish assignments
// ABOUTME: Re-exports DietPlan, MenuPackage, MenuDietView, DishAssignment and identifier types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Data Models
//!
//! Plain, serde-serializable aggregates. The engine operates on loaded
//! snapshots of these and returns the same shapes for saving.
//!
//! ## Core Models
//!
//! - `DietPlan`: one diet with its lineage, meal structure, goals and exclusions
//! - `MenuPackage`: a client's multi-week menu with one `MenuDietView` per diet
//! - `MenuCell`: locally stored dishes at `(day, slot)` within a week
//! - `DishAssignment`: a dish placed into a cell with a nutrition snapshot

mod diet_plan;
mod dish;
mod ids;
mod menu;

// Identifiers
pub use ids::{DietPlanId, MealSlotId, MenuPackageId};

// Diet plan domain
pub use diet_plan::{
    ChangeType, ClientAssignment, DietKind, DietPlan, Exclusion, ExclusionCategory, Facet,
    GoalRange, GoalSource, Lineage, MealKind, MealSlot, NutritionGoal, PlanStatus, Substitution,
};

// Dish domain
pub use dish::{CompositionItem, DishAssignment, NutrientField, NutritionSnapshot};

// Menu domain
pub use menu::{CellAddress, MenuCell, MenuDietView, MenuPackage, MenuPeriod, MenuWeek};

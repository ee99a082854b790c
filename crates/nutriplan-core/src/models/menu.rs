// ABOUTME: Menu package, per-diet views, weeks and stored cells of the composition grid
// ABOUTME: Stored cells are always locally owned; inherited views are computed at read time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use super::dish::DishAssignment;
use super::ids::{DietPlanId, MealSlotId, MenuPackageId};
use crate::constants::menu::DAYS_PER_WEEK;
use crate::errors::{PlanError, PlanResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar period covered by a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuPeriod {
    /// First day served
    pub from: NaiveDate,
    /// Last day served
    pub to: NaiveDate,
}

/// Address of one cell: 0-based week, 0-based day within the week, meal slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    /// Week index
    pub week: usize,
    /// Day index within the week
    pub day: usize,
    /// Meal slot
    pub slot: MealSlotId,
}

impl CellAddress {
    /// Build an address
    #[must_use]
    pub fn new(week: usize, day: usize, slot: impl Into<MealSlotId>) -> Self {
        Self {
            week,
            day,
            slot: slot.into(),
        }
    }

    /// Day offset from the start of the cycle, `None` on overflow
    #[must_use]
    pub const fn cycle_day(&self) -> Option<usize> {
        match self.week.checked_mul(DAYS_PER_WEEK) {
            Some(offset) => offset.checked_add(self.day),
            None => None,
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}/d{}/{}", self.week, self.day, self.slot)
    }
}

/// A locally stored cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCell {
    /// Day within the week
    pub day_index: usize,
    /// Meal slot
    pub meal_slot_id: MealSlotId,
    /// Ordered dishes; empty means "no meal"
    #[serde(default)]
    pub dishes: Vec<DishAssignment>,
}

/// One week of stored cells, keyed by `(day_index, meal_slot_id)`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MenuWeek {
    /// Stored cells
    #[serde(default)]
    pub cells: Vec<MenuCell>,
}

impl MenuWeek {
    /// Stored cell at a key
    #[must_use]
    pub fn cell(&self, day: usize, slot: &MealSlotId) -> Option<&MenuCell> {
        self.cells
            .iter()
            .find(|cell| cell.day_index == day && &cell.meal_slot_id == slot)
    }

    /// Insert or replace the cell at a key, returning the previous dishes
    pub fn put(&mut self, day: usize, slot: &MealSlotId, dishes: Vec<DishAssignment>) -> Option<Vec<DishAssignment>> {
        if let Some(cell) = self
            .cells
            .iter_mut()
            .find(|cell| cell.day_index == day && &cell.meal_slot_id == slot)
        {
            return Some(std::mem::replace(&mut cell.dishes, dishes));
        }
        self.cells.push(MenuCell {
            day_index: day,
            meal_slot_id: slot.clone(),
            dishes,
        });
        None
    }

    /// Remove the cell at a key, returning its dishes
    pub fn remove(&mut self, day: usize, slot: &MealSlotId) -> Option<Vec<DishAssignment>> {
        let position = self
            .cells
            .iter()
            .position(|cell| cell.day_index == day && &cell.meal_slot_id == slot)?;
        Some(self.cells.remove(position).dishes)
    }
}

/// Menu content of one diet inside a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDietView {
    /// Diet the view belongs to
    pub diet_plan_id: DietPlanId,
    /// Weeks of the cycle
    #[serde(default)]
    pub weeks: Vec<MenuWeek>,
}

impl MenuDietView {
    /// Empty view covering `week_count` weeks
    #[must_use]
    pub fn new(diet_plan_id: DietPlanId, week_count: usize) -> Self {
        Self {
            diet_plan_id,
            weeks: vec![MenuWeek::default(); week_count],
        }
    }

    /// Stored cell at an address
    #[must_use]
    pub fn stored(&self, address: &CellAddress) -> Option<&MenuCell> {
        self.weeks
            .get(address.week)
            .and_then(|week| week.cell(address.day, &address.slot))
    }

    /// Store dishes at an address, growing the week list as needed
    pub fn store(&mut self, address: &CellAddress, dishes: Vec<DishAssignment>) -> Option<Vec<DishAssignment>> {
        if self.weeks.len() <= address.week {
            self.weeks.resize_with(address.week + 1, MenuWeek::default);
        }
        self.weeks[address.week].put(address.day, &address.slot, dishes)
    }

    /// Delete the stored cell at an address
    pub fn unstore(&mut self, address: &CellAddress) -> Option<Vec<DishAssignment>> {
        self.weeks
            .get_mut(address.week)
            .and_then(|week| week.remove(address.day, &address.slot))
    }

    /// Addresses of every stored cell, in week/day/slot order
    #[must_use]
    pub fn stored_addresses(&self) -> Vec<CellAddress> {
        let mut addresses: Vec<CellAddress> = self
            .weeks
            .iter()
            .enumerate()
            .flat_map(|(week, content)| {
                content
                    .cells
                    .iter()
                    .map(move |cell| CellAddress::new(week, cell.day_index, cell.meal_slot_id.clone()))
            })
            .collect();
        addresses.sort();
        addresses
    }
}

/// A multi-week menu package for one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuPackage {
    /// Package id
    pub id: MenuPackageId,
    /// Client institution
    pub client_id: String,
    /// Calendar period served
    pub period: MenuPeriod,
    /// Cycle length in days (positive multiple of 7)
    pub cycle_length: u32,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// One view per relevant diet
    #[serde(default)]
    pub diet_views: Vec<MenuDietView>,
    /// Optimistic concurrency stamp
    #[serde(default)]
    pub version: u64,
}

impl MenuPackage {
    /// Create an empty package
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the cycle is not a positive multiple of 7
    /// days or the period ends before it starts.
    pub fn new(client_id: impl Into<String>, period: MenuPeriod, cycle_length: u32) -> PlanResult<Self> {
        if cycle_length == 0 || cycle_length as usize % DAYS_PER_WEEK != 0 {
            return Err(PlanError::invalid_input(format!(
                "cycle length must be a positive multiple of {DAYS_PER_WEEK} days, got {cycle_length}"
            )));
        }
        if period.to < period.from {
            return Err(PlanError::invalid_input(format!(
                "menu period ends ({}) before it starts ({})",
                period.to, period.from
            )));
        }
        Ok(Self {
            id: MenuPackageId::new(),
            client_id: client_id.into(),
            period,
            cycle_length,
            tags: Vec::new(),
            diet_views: Vec::new(),
            version: 0,
        })
    }

    /// Number of weeks in the cycle
    #[must_use]
    pub const fn week_count(&self) -> usize {
        (self.cycle_length as usize).div_ceil(DAYS_PER_WEEK)
    }

    /// Validate week/day against the cycle
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the day is not in `[0, 7)` or the address
    /// falls outside `[0, cycle_length)`.
    pub fn check_address(&self, address: &CellAddress) -> PlanResult<()> {
        let in_cycle = address
            .cycle_day()
            .is_some_and(|day| day < self.cycle_length as usize);
        if address.day >= DAYS_PER_WEEK || address.week >= self.week_count() || !in_cycle {
            return Err(PlanError::OutOfRange {
                week: address.week,
                day: address.day,
                cycle_length: self.cycle_length,
            });
        }
        Ok(())
    }

    /// View of a diet, if present
    #[must_use]
    pub fn view(&self, diet_plan_id: DietPlanId) -> Option<&MenuDietView> {
        self.diet_views
            .iter()
            .find(|view| view.diet_plan_id == diet_plan_id)
    }

    /// Mutable view of a diet, if present
    pub fn view_mut(&mut self, diet_plan_id: DietPlanId) -> Option<&mut MenuDietView> {
        self.diet_views
            .iter_mut()
            .find(|view| view.diet_plan_id == diet_plan_id)
    }

    /// View of a diet, created empty when missing
    pub fn view_or_insert(&mut self, diet_plan_id: DietPlanId) -> &mut MenuDietView {
        let index = match self
            .diet_views
            .iter()
            .position(|view| view.diet_plan_id == diet_plan_id)
        {
            Some(index) => index,
            None => {
                let weeks = self.week_count();
                self.diet_views.push(MenuDietView::new(diet_plan_id, weeks));
                self.diet_views.len() - 1
            }
        };
        &mut self.diet_views[index]
    }

    /// Bump the version stamp after a successful mutation
    pub fn touch(&mut self) {
        self.version += 1;
    }
}

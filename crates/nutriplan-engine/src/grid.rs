// ABOUTME: Menu composition grid with inheritance-aware cell reads and writes
// ABOUTME: get_cell, write_cell, reset_cell_to_inherited, dish helpers and cell freezing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Menu Composition Grid
//!
//! A derived diet stores only the cells it overrides. Every other cell is a
//! view: reading it looks up the base diet's cell at the same
//! `(week, day, slot)` key, so the view always reflects the live base
//! content. [`write_cell`] is the only way to create an override.

use crate::catalog::DishCatalog;
use crate::resolver::Resolver;
use nutriplan_core::constants::menu::DAYS_PER_WEEK;
use nutriplan_core::errors::{PlanError, PlanResult};
use nutriplan_core::models::{
    CellAddress, DietPlan, DietPlanId, DishAssignment, MealSlot, MenuDietView, MenuPackage,
};
use serde::Serialize;
use tracing::{debug, info};

/// How a cell's content is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOrigin {
    /// Stored on a base diet
    Owned,
    /// Stored on a derived diet, superseding the base cell
    Overridden,
    /// Read live from the base diet
    Inherited,
}

/// A cell as presented to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCell<'a> {
    /// Cell address
    pub address: CellAddress,
    /// Dishes in serving order
    pub dishes: &'a [DishAssignment],
    /// Where the content comes from
    pub origin: CellOrigin,
}

impl ResolvedCell<'_> {
    /// Content is read from the base diet
    #[must_use]
    pub const fn inherited(&self) -> bool {
        matches!(self.origin, CellOrigin::Inherited)
    }

    /// Content is a derived diet's local override
    #[must_use]
    pub const fn overridden(&self) -> bool {
        matches!(self.origin, CellOrigin::Overridden)
    }

    /// Owned copy of the cell state
    #[must_use]
    pub fn to_state(&self) -> CellState {
        CellState {
            origin: self.origin,
            dishes: self.dishes.to_vec(),
        }
    }
}

/// Owned cell content with its origin, used in change records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellState {
    /// Where the content came from
    pub origin: CellOrigin,
    /// Dishes
    pub dishes: Vec<DishAssignment>,
}

/// Before/after pair produced by a cell mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    /// Diet whose storage changed
    pub plan_id: DietPlanId,
    /// Cell address
    pub address: CellAddress,
    /// State before the mutation
    pub before: CellState,
    /// State after the mutation
    pub after: CellState,
}

/// Read-only grid of one diet inside a package
#[derive(Debug, Clone, Copy)]
pub struct DietGrid<'a> {
    package: &'a MenuPackage,
    diet: Resolver<'a>,
    view: Option<&'a MenuDietView>,
    base_view: Option<&'a MenuDietView>,
}

impl<'a> DietGrid<'a> {
    /// Open the grid of a diet
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the package has no view for a base diet, or
    /// no view for a derived diet's base.
    pub fn new(package: &'a MenuPackage, diet: Resolver<'a>) -> PlanResult<Self> {
        let plan = diet.plan();
        let view = package.view(plan.id);
        let base_view = match diet.base() {
            Some(base) => Some(
                package
                    .view(base.id)
                    .ok_or_else(|| PlanError::not_found("menu diet view", &base.code))?,
            ),
            None => {
                if view.is_none() {
                    return Err(PlanError::not_found("menu diet view", &plan.code));
                }
                None
            }
        };
        Ok(Self {
            package,
            diet,
            view,
            base_view,
        })
    }

    /// The diet this grid belongs to
    #[must_use]
    pub const fn plan(&self) -> &'a DietPlan {
        self.diet.plan()
    }

    /// The package
    #[must_use]
    pub const fn package(&self) -> &'a MenuPackage {
        self.package
    }

    /// Effective meal slots, in serving order
    #[must_use]
    pub fn slots(&self) -> &'a [MealSlot] {
        self.diet.effective_meal_slots()
    }

    /// Validate an address against the cycle and the meal structure
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` or `NotFound` for an unknown slot.
    pub fn check(&self, address: &CellAddress) -> PlanResult<()> {
        check_address(self.package, &self.diet, address)
    }

    /// Read a cell
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` or `NotFound` for an unknown slot.
    pub fn get_cell(&self, address: &CellAddress) -> PlanResult<ResolvedCell<'a>> {
        self.check(address)?;
        let local = self.view.and_then(|view| view.stored(address));
        let empty: &'a [DishAssignment] = &[];
        let (dishes, origin) = match (local, self.base_view) {
            (Some(cell), None) => (cell.dishes.as_slice(), CellOrigin::Owned),
            (Some(cell), Some(_)) => (cell.dishes.as_slice(), CellOrigin::Overridden),
            (None, None) => (empty, CellOrigin::Owned),
            (None, Some(base_view)) => (
                base_view
                    .stored(address)
                    .map_or(empty, |cell| cell.dishes.as_slice()),
                CellOrigin::Inherited,
            ),
        };
        Ok(ResolvedCell {
            address: address.clone(),
            dishes,
            origin,
        })
    }

    /// Check if the diet stores a local cell at an address
    #[must_use]
    pub fn has_local(&self, address: &CellAddress) -> bool {
        self.view.and_then(|view| view.stored(address)).is_some()
    }

    /// Every cell of one day, in slot order
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for a day outside the cycle.
    pub fn day_cells(&self, week: usize, day: usize) -> PlanResult<Vec<ResolvedCell<'a>>> {
        let slots = self.slots();
        if slots.is_empty() {
            self.package
                .check_address(&CellAddress::new(week, day, ""))?;
        }
        slots
            .iter()
            .map(|slot| self.get_cell(&CellAddress::new(week, day, slot.id.clone())))
            .collect()
    }

    /// Every `(week, day)` pair of the cycle
    #[must_use]
    pub fn days(&self) -> Vec<(usize, usize)> {
        (0..self.package.cycle_length as usize)
            .map(|offset| (offset / DAYS_PER_WEEK, offset % DAYS_PER_WEEK))
            .collect()
    }

    /// Every address of the cycle, in week/day/slot order
    #[must_use]
    pub fn addresses(&self) -> Vec<CellAddress> {
        self.days()
            .into_iter()
            .flat_map(|(week, day)| {
                self.slots()
                    .iter()
                    .map(move |slot| CellAddress::new(week, day, slot.id.clone()))
            })
            .collect()
    }
}

fn check_address(package: &MenuPackage, diet: &Resolver<'_>, address: &CellAddress) -> PlanResult<()> {
    package.check_address(address)?;
    if !diet.has_slot(&address.slot) {
        return Err(PlanError::not_found("meal slot", &address.slot));
    }
    Ok(())
}

fn current_state(package: &MenuPackage, diet: Resolver<'_>, address: &CellAddress) -> PlanResult<CellState> {
    match DietGrid::new(package, diet) {
        Ok(grid) => Ok(grid.get_cell(address)?.to_state()),
        Err(PlanError::NotFound { .. }) if diet.base().is_none() => Ok(CellState {
            origin: CellOrigin::Owned,
            dishes: Vec::new(),
        }),
        Err(err) => Err(err),
    }
}

fn stored_origin(diet: &Resolver<'_>) -> CellOrigin {
    if diet.base().is_some() {
        CellOrigin::Overridden
    } else {
        CellOrigin::Owned
    }
}

/// Create or overwrite the diet's local cell
///
/// An empty dish list is a valid override meaning "no meal". The diet's
/// view is created when the package has none yet.
///
/// # Errors
///
/// Returns `OutOfRange`, `NotFound` for an unknown slot, or `NotFound` when
/// a derived diet's base has no view in the package.
pub fn write_cell(package: &mut MenuPackage, diet: Resolver<'_>, address: &CellAddress, dishes: Vec<DishAssignment>) -> PlanResult<CellChange> {
    check_address(package, &diet, address)?;
    let before = current_state(package, diet, address)?;
    let plan = diet.plan();

    package.view_or_insert(plan.id).store(address, dishes.clone());
    info!(plan = %plan.code, cell = %address, dishes = dishes.len(), "Cell written");

    Ok(CellChange {
        plan_id: plan.id,
        address: address.clone(),
        before,
        after: CellState {
            origin: stored_origin(&diet),
            dishes,
        },
    })
}

/// Delete a derived diet's override so the cell reads from the base again
///
/// Returns `None` when there was no override to remove.
///
/// # Errors
///
/// Returns `NotInheritable` on a base diet, `OutOfRange`, or `NotFound`.
pub fn reset_cell_to_inherited(package: &mut MenuPackage, diet: Resolver<'_>, address: &CellAddress) -> PlanResult<Option<CellChange>> {
    let plan = diet.plan();
    if !plan.is_derived() {
        return Err(PlanError::not_inheritable(&plan.code));
    }
    check_address(package, &diet, address)?;
    let grid = DietGrid::new(package, diet)?;
    let before = grid.get_cell(address)?.to_state();
    if before.origin != CellOrigin::Overridden {
        return Ok(None);
    }

    if let Some(view) = package.view_mut(plan.id) {
        view.unstore(address);
    }
    let after = DietGrid::new(package, diet)?.get_cell(address)?.to_state();
    info!(plan = %plan.code, cell = %address, "Cell reset to inherited");

    Ok(Some(CellChange {
        plan_id: plan.id,
        address: address.clone(),
        before,
        after,
    }))
}

/// Append a catalog dish to a cell
///
/// Inherited content is cloned into the new override first.
///
/// # Errors
///
/// Returns `NotFound` for an unknown dish plus any error of [`write_cell`].
pub fn add_dish(package: &mut MenuPackage, diet: Resolver<'_>, address: &CellAddress, catalog: &dyn DishCatalog, reference_id: &str, portion_grams: Option<f64>) -> PlanResult<CellChange> {
    let dish = catalog.resolve_dish(reference_id)?.assign(portion_grams)?;
    let mut dishes = current_state(package, diet, address)?.dishes;
    dishes.push(dish);
    debug!(plan = %diet.plan().code, cell = %address, reference_id, "Dish added");
    write_cell(package, diet, address, dishes)
}

/// Remove the first dish with a reference id from a cell
///
/// # Errors
///
/// Returns `NotFound` when the cell holds no such dish, plus any error of
/// [`write_cell`].
pub fn remove_dish(package: &mut MenuPackage, diet: Resolver<'_>, address: &CellAddress, reference_id: &str) -> PlanResult<CellChange> {
    let mut dishes = current_state(package, diet, address)?.dishes;
    let index = dishes
        .iter()
        .position(|dish| dish.reference_id == reference_id)
        .ok_or_else(|| PlanError::not_found("dish", reference_id))?;
    dishes.remove(index);
    write_cell(package, diet, address, dishes)
}

/// Resize a dish's portion in place; its identity is unchanged
///
/// # Errors
///
/// Returns `NotFound` when the cell holds no such dish, `InvalidInput` for a
/// non-positive portion, plus any error of [`write_cell`].
pub fn resize_dish(package: &mut MenuPackage, diet: Resolver<'_>, address: &CellAddress, reference_id: &str, portion_grams: f64) -> PlanResult<CellChange> {
    let mut dishes = current_state(package, diet, address)?.dishes;
    let dish = dishes
        .iter_mut()
        .find(|dish| dish.reference_id == reference_id)
        .ok_or_else(|| PlanError::not_found("dish", reference_id))?;
    dish.resize_portion(portion_grams)?;
    write_cell(package, diet, address, dishes)
}

/// Copy every inherited cell with base content into the derived diet's storage
///
/// Run before converting a derived diet to base so no menu content is lost.
///
/// # Errors
///
/// Returns `NotInheritable` on a base diet and `NotFound` when the base has
/// no view in the package.
pub fn freeze_inherited_cells(package: &mut MenuPackage, diet: Resolver<'_>) -> PlanResult<Vec<CellChange>> {
    let plan = diet.plan();
    if !plan.is_derived() {
        return Err(PlanError::not_inheritable(&plan.code));
    }
    let pending: Vec<(CellAddress, Vec<DishAssignment>)> = {
        let grid = DietGrid::new(package, diet)?;
        let mut pending = Vec::new();
        for address in grid.addresses() {
            let cell = grid.get_cell(&address)?;
            if cell.inherited() && !cell.dishes.is_empty() {
                pending.push((address, cell.dishes.to_vec()));
            }
        }
        pending
    };

    let changes = pending
        .into_iter()
        .map(|(address, dishes)| write_cell(package, diet, &address, dishes))
        .collect::<PlanResult<Vec<_>>>()?;
    info!(plan = %plan.code, cells = changes.len(), "Inherited cells frozen");
    Ok(changes)
}

// ABOUTME: Planning service holding versioned plan and package snapshots over the engine
// ABOUTME: Enforces expected-version writes, serializes mutations and forwards audit records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Planning Service
//!
//! Every mutation names the version the caller loaded. A mismatch fails
//! with `STALE_WRITE` before anything is touched; a successful write bumps
//! the version of each aggregate it changed and hands one before/after
//! record per change to the audit sink. A commit stores all of its plans
//! at once, so a read spanning several plans or a package and its diets
//! never sees half of a propagation. Reads work on cloned snapshots.

use crate::errors::{AppError, AppResult, PlanError, PlanResult};
use crate::models::{
    CellAddress, ClientAssignment, DietPlan, DietPlanId, DishAssignment, Exclusion,
    ExclusionCategory, GoalRange, GoalSource, MealSlot, MealSlotId, MenuPackage, MenuPackageId,
    MenuPeriod, NutritionGoal, PlanStatus, Substitution,
};
use dashmap::DashMap;
use nutriplan_engine::aggregator::{self, AdherenceReport, Aggregate};
use nutriplan_engine::audit::{AuditRecord, AuditSink, AuditTarget};
use nutriplan_engine::catalog::{DishCatalog, InMemoryCatalog};
use nutriplan_engine::diff::{self, PlanDiff};
use nutriplan_engine::grid::{self, CellChange, CellState, DietGrid};
use nutriplan_engine::plan_model::{KindChange, PlanBook, PlanViolation};
use nutriplan_engine::propagation::{
    self, ApplyOutcome, CellProposal, ExclusionProposal, GoalProposal,
};
use nutriplan_engine::resolver::{EffectiveExclusion, ResolvedGoal};
use nutriplan_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serializable state handed over by a persistence collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningSnapshot {
    /// Diet plans, base and derived in any order
    #[serde(default)]
    pub plans: Vec<DietPlan>,
    /// Menu packages
    #[serde(default)]
    pub packages: Vec<MenuPackage>,
    /// Dish catalog
    #[serde(default)]
    pub catalog: InMemoryCatalog,
}

/// Versioned in-memory store of plans and packages with audit forwarding
pub struct PlanningService {
    plans: DashMap<DietPlanId, DietPlan>,
    packages: DashMap<MenuPackageId, MenuPackage>,
    catalog: Arc<dyn DishCatalog>,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
    actor_id: String,
    writer: Mutex<()>,
    /// Held for writing while a batch of plans or a package is stored, and
    /// for reading while a snapshot spanning several aggregates is taken
    commits: RwLock<()>,
}

impl PlanningService {
    /// Create an empty service
    #[must_use]
    pub fn new(
        catalog: Arc<dyn DishCatalog>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            plans: DashMap::new(),
            packages: DashMap::new(),
            catalog,
            audit,
            config,
            actor_id: actor_id.into(),
            writer: Mutex::new(()),
            commits: RwLock::new(()),
        }
    }

    /// Create a service preloaded from a snapshot
    ///
    /// Base plans are loaded before derived ones so base references resolve.
    ///
    /// # Errors
    ///
    /// Returns an error when a plan has a duplicate code or an invalid base
    /// reference, or a package fails validation.
    pub fn from_snapshot(
        snapshot: PlanningSnapshot,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
        actor_id: impl Into<String>,
    ) -> AppResult<Self> {
        let PlanningSnapshot {
            mut plans,
            packages,
            catalog,
        } = snapshot;
        let service = Self::new(Arc::new(catalog), audit, config, actor_id);

        plans.sort_by_key(DietPlan::is_derived);
        let mut book = PlanBook::new();
        for plan in plans {
            book.insert(plan.clone())?;
            service.plans.insert(plan.id, plan);
        }
        for package in packages {
            MenuPackage::new(&package.client_id, package.period, package.cycle_length)?;
            service.packages.insert(package.id, package);
        }

        info!(
            plans = service.plans.len(),
            packages = service.packages.len(),
            "Planning snapshot loaded"
        );
        Ok(service)
    }

    /// Engine configuration in use
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ================================================================================================
    // Reads
    // ================================================================================================

    /// Current snapshot of a plan
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown plan.
    pub fn plan(&self, plan_id: DietPlanId) -> AppResult<DietPlan> {
        self.plans
            .get(&plan_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlanError::not_found("diet plan", plan_id).into())
    }

    /// Current snapshot of a package
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown package.
    pub fn package(&self, package_id: MenuPackageId) -> AppResult<MenuPackage> {
        self.packages
            .get(&package_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlanError::not_found("menu package", package_id).into())
    }

    /// All plans ordered by code
    #[must_use]
    pub fn plans(&self) -> Vec<DietPlan> {
        let mut plans: Vec<DietPlan> = self.plans.iter().map(|entry| entry.value().clone()).collect();
        plans.sort_by(|a, b| a.code.cmp(&b.code));
        plans
    }

    /// All packages ordered by client and start date
    #[must_use]
    pub fn packages(&self) -> Vec<MenuPackage> {
        let mut packages: Vec<MenuPackage> = self
            .packages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        packages.sort_by(|a, b| (&a.client_id, a.period.from).cmp(&(&b.client_id, b.period.from)));
        packages
    }

    /// Effective goals of a plan
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE` when the plan cannot be resolved.
    pub fn effective_goals(&self, plan_id: DietPlanId) -> AppResult<Vec<ResolvedGoal>> {
        let book = self.lineage_book(plan_id)?;
        Ok(book.resolver(plan_id)?.effective_goals())
    }

    /// Effective exclusions of a plan
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE` when the plan cannot be resolved.
    pub fn effective_exclusions(&self, plan_id: DietPlanId) -> AppResult<Vec<EffectiveExclusion>> {
        let book = self.lineage_book(plan_id)?;
        Ok(book.resolver(plan_id)?.effective_exclusions())
    }

    /// Effective meal slots of a plan
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE` when the plan cannot be resolved.
    pub fn effective_meal_slots(&self, plan_id: DietPlanId) -> AppResult<Vec<MealSlot>> {
        let book = self.lineage_book(plan_id)?;
        Ok(book.resolver(plan_id)?.effective_meal_slots().to_vec())
    }

    /// Structure and goal problems of a plan
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE` when the plan cannot be resolved.
    pub fn validate_plan(&self, plan_id: DietPlanId) -> AppResult<Vec<PlanViolation>> {
        let book = self.lineage_book(plan_id)?;
        let violations = book.validate(plan_id, &self.config)?;
        if !violations.is_empty() {
            warn!(plan = %plan_id, violations = violations.len(), "Plan has violations");
        }
        Ok(violations)
    }

    /// Resolved content of one cell
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `OUT_OF_RANGE` for an address the diet cannot hold.
    pub fn cell(&self, package_id: MenuPackageId, plan_id: DietPlanId, address: &CellAddress) -> AppResult<CellState> {
        let (package, book) = self.package_with_lineage(package_id, plan_id)?;
        let grid = DietGrid::new(&package, book.resolver(plan_id)?)?;
        let state = grid.get_cell(address)?.to_state();
        Ok(state)
    }

    /// Totals of one day
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `OUT_OF_RANGE` for a day the diet cannot hold.
    pub fn day_totals(&self, package_id: MenuPackageId, plan_id: DietPlanId, week: usize, day: usize) -> AppResult<Aggregate> {
        let (package, book) = self.package_with_lineage(package_id, plan_id)?;
        let grid = DietGrid::new(&package, book.resolver(plan_id)?)?;
        Ok(aggregator::day_totals(&grid, week, day)?)
    }

    /// Goal adherence of a week's daily average
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `OUT_OF_RANGE` for a week the package does not have.
    pub fn week_adherence(&self, package_id: MenuPackageId, plan_id: DietPlanId, week: usize) -> AppResult<AdherenceReport> {
        let (package, book) = self.package_with_lineage(package_id, plan_id)?;
        let resolver = book.resolver(plan_id)?;
        let grid = DietGrid::new(&package, resolver)?;
        let average = aggregator::week_average(&grid, week)?;
        Ok(aggregator::goal_adherence(&resolver, &average, &self.config))
    }

    /// Diff of a derived plan against its base, with cells when a package is given
    ///
    /// # Errors
    ///
    /// Returns `NOT_INHERITABLE` for a base plan and `NOT_FOUND` for unknown ids.
    pub fn diff(&self, plan_id: DietPlanId, package_id: Option<MenuPackageId>) -> AppResult<PlanDiff> {
        let _snapshot = self.snapshot_guard();
        let book = self.collect_lineage(plan_id)?;
        let plan = book.require(plan_id)?;
        let base_id = plan
            .base_diet_id()
            .ok_or_else(|| PlanError::not_inheritable(&plan.code))?;
        let base = book.require(base_id)?;
        let package = package_id.map(|id| self.package(id)).transpose()?;
        Ok(diff::diff(plan, base, package.as_ref())?)
    }

    // ================================================================================================
    // Plan lifecycle
    // ================================================================================================

    /// Create a base plan
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for a duplicate code.
    pub fn create_base_plan(&self, code: &str, name: &str) -> AppResult<DietPlan> {
        self.insert_plan(DietPlan::new_base(code, name))
    }

    /// Create a plan derived from `base_diet_id`
    ///
    /// # Errors
    ///
    /// Returns `INVALID_BASE_REFERENCE` for a missing or derived base and
    /// `INVALID_INPUT` for a duplicate code.
    pub fn create_derived_plan(&self, code: &str, name: &str, base_diet_id: DietPlanId) -> AppResult<DietPlan> {
        self.insert_plan(DietPlan::new_derived(code, name, base_diet_id))
    }

    fn insert_plan(&self, plan: DietPlan) -> AppResult<DietPlan> {
        let _guard = self.write_guard();
        let mut book = self.book();
        book.insert(plan.clone()).map_err(|e| self.reject(e))?;
        self.audit.record(AuditRecord::new(
            plan.id,
            &self.actor_id,
            plan_target("create"),
            Value::Null,
            serde_json::to_value(&plan)?,
        ));
        info!(plan = %plan.code, kind = %plan.kind(), actor = %self.actor_id, "Plan created");
        self.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    /// Create an empty menu package
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` for a bad cycle length or period.
    pub fn create_package(&self, client_id: &str, period: MenuPeriod, cycle_length: u32) -> AppResult<MenuPackage> {
        let package = MenuPackage::new(client_id, period, cycle_length)?;
        let _guard = self.write_guard();
        info!(package = %package.id, client = client_id, cycle_length, "Menu package created");
        self.packages.insert(package.id, package.clone());
        Ok(package)
    }

    /// Switch a plan between base and derived
    ///
    /// Converting to base first freezes the plan's inherited cells in every
    /// package holding its base, so no menu content is lost.
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` on a version mismatch and `INVALID_BASE_REFERENCE`
    /// for an unusable base.
    pub fn set_kind(&self, plan_id: DietPlanId, expected_version: u64, change: KindChange) -> AppResult<DietPlan> {
        let _guard = self.write_guard();
        self.expect_plan_version(plan_id, expected_version)?;
        let before = self.book();
        let mut after = before.clone();

        let mut frozen = Vec::new();
        if let (KindChange::Base, Some(base_id)) = (change, before.require(plan_id)?.base_diet_id()) {
            let resolver = before.resolver(plan_id)?;
            for mut package in self.packages.iter().map(|entry| entry.value().clone()) {
                if package.view(base_id).is_none() {
                    continue;
                }
                let changes = grid::freeze_inherited_cells(&mut package, resolver)
                    .map_err(|e| self.reject(e))?;
                if !changes.is_empty() {
                    frozen.push((package, changes));
                }
            }
        }

        after.set_kind(plan_id, change).map_err(|e| self.reject(e))?;

        for (package, changes) in frozen {
            self.commit_package(package, &changes)?;
        }
        self.commit_plans(&before, &after, &plan_target("set_kind"))?;
        self.plan(plan_id)
    }

    /// Rename a plan
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` on a version mismatch and `INVALID_INPUT` for an empty name.
    pub fn rename(&self, plan_id: DietPlanId, expected_version: u64, name: &str) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("rename"), |book| {
            book.rename(plan_id, name)
        })?;
        self.plan(plan_id)
    }

    /// Change a plan's lifecycle status
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` on a version mismatch.
    pub fn set_status(&self, plan_id: DietPlanId, expected_version: u64, status: PlanStatus) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("set_status"), |book| {
            book.set_status(plan_id, status)
        })?;
        self.plan(plan_id)
    }

    /// Record a client assignment
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` on a version mismatch and `INVALID_INPUT` for an inverted date range.
    pub fn assign_client(&self, plan_id: DietPlanId, expected_version: u64, assignment: ClientAssignment) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("assign_client"), |book| {
            book.assign_client(plan_id, assignment)
        })?;
        self.plan(plan_id)
    }

    // ================================================================================================
    // Goals
    // ================================================================================================

    /// Flip a derived plan's goal between inherited and overridden
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `NOT_INHERITABLE` on a base plan, or `NOT_FOUND`
    /// for a nutrient neither plan defines.
    pub fn toggle_goal_source(&self, plan_id: DietPlanId, expected_version: u64, nutrient: &str) -> AppResult<GoalSource> {
        self.mutate_plan(plan_id, expected_version, plan_target("toggle_goal_source"), |book| {
            book.toggle_goal_source(plan_id, nutrient)
        })
    }

    /// Set a goal's range
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `LOCKED_FACET` for an inherited goal, or `INVALID_INPUT`.
    pub fn set_goal(&self, plan_id: DietPlanId, expected_version: u64, nutrient: &str, range: GoalRange) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("set_goal"), |book| {
            book.set_goal(plan_id, nutrient, range)
        })?;
        self.plan(plan_id)
    }

    /// Remove a goal from the plan
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `NOT_FOUND`.
    pub fn remove_goal(&self, plan_id: DietPlanId, expected_version: u64, nutrient: &str) -> AppResult<NutritionGoal> {
        self.mutate_plan(plan_id, expected_version, plan_target("remove_goal"), |book| {
            book.remove_goal(plan_id, nutrient)
        })
    }

    // ================================================================================================
    // Exclusions and meal structure
    // ================================================================================================

    /// Unlock a derived plan's exclusion set; `false` when already unlocked
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `NOT_INHERITABLE`.
    pub fn unlock_exclusions(&self, plan_id: DietPlanId, expected_version: u64) -> AppResult<bool> {
        self.mutate_plan(plan_id, expected_version, exclusions_target("unlock"), |book| {
            book.unlock_exclusions(plan_id)
        })
    }

    /// Unlock a derived plan's meal structure; `false` when already unlocked
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `NOT_INHERITABLE`.
    pub fn unlock_meal_structure(&self, plan_id: DietPlanId, expected_version: u64) -> AppResult<bool> {
        self.mutate_plan(plan_id, expected_version, plan_target("unlock_meal_structure"), |book| {
            book.unlock_meal_structure(plan_id)
        })
    }

    /// Add an exclusion rule
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `INVALID_INPUT` for a duplicate rule.
    pub fn add_exclusion(&self, plan_id: DietPlanId, expected_version: u64, category: ExclusionCategory, name: &str) -> AppResult<Exclusion> {
        self.mutate_plan(plan_id, expected_version, exclusions_target("add"), |book| {
            book.add_exclusion(plan_id, category, name)
        })
    }

    /// Activate or deactivate an exclusion rule
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `LOCKED_FACET` for a locked base rule, or `NOT_FOUND`.
    pub fn set_exclusion_active(&self, plan_id: DietPlanId, expected_version: u64, category: ExclusionCategory, name: &str, active: bool) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, exclusions_target("set_active"), |book| {
            book.set_exclusion_active(plan_id, category, name, active)
        })?;
        self.plan(plan_id)
    }

    /// Remove one of the plan's own exclusion rules
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `LOCKED_FACET` for a base-derived rule, or `NOT_FOUND`.
    pub fn remove_exclusion(&self, plan_id: DietPlanId, expected_version: u64, exclusion_id: Uuid) -> AppResult<Exclusion> {
        self.mutate_plan(plan_id, expected_version, exclusions_target("remove"), |book| {
            book.remove_exclusion(plan_id, exclusion_id)
        })
    }

    /// Insert or replace a meal slot
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `LOCKED_FACET` while the structure is inherited.
    pub fn upsert_meal_slot(&self, plan_id: DietPlanId, expected_version: u64, slot: MealSlot) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("upsert_meal_slot"), |book| {
            book.upsert_meal_slot(plan_id, slot)
        })?;
        self.plan(plan_id)
    }

    /// Remove a meal slot
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `LOCKED_FACET` while the structure is inherited, or `NOT_FOUND`.
    pub fn remove_meal_slot(&self, plan_id: DietPlanId, expected_version: u64, slot_id: &MealSlotId) -> AppResult<MealSlot> {
        self.mutate_plan(plan_id, expected_version, plan_target("remove_meal_slot"), |book| {
            book.remove_meal_slot(plan_id, slot_id)
        })
    }

    /// Record a substitution on a derived plan
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `NOT_INHERITABLE`.
    pub fn add_substitution(&self, plan_id: DietPlanId, expected_version: u64, substitution: Substitution) -> AppResult<DietPlan> {
        self.mutate_plan(plan_id, expected_version, plan_target("add_substitution"), |book| {
            book.add_substitution(plan_id, substitution)
        })?;
        self.plan(plan_id)
    }

    /// Drop a substitution by id
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` or `NOT_FOUND`.
    pub fn remove_substitution(&self, plan_id: DietPlanId, expected_version: u64, substitution_id: Uuid) -> AppResult<Substitution> {
        self.mutate_plan(plan_id, expected_version, plan_target("remove_substitution"), |book| {
            book.remove_substitution(plan_id, substitution_id)
        })
    }

    // ================================================================================================
    // Menu cells
    // ================================================================================================

    /// Write a diet's cell
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` on a package version mismatch, `OUT_OF_RANGE`, or `NOT_FOUND`.
    pub fn write_cell(&self, package_id: MenuPackageId, expected_version: u64, plan_id: DietPlanId, address: &CellAddress, dishes: Vec<DishAssignment>) -> AppResult<CellChange> {
        self.mutate_cells(package_id, expected_version, |book, package| {
            let change = grid::write_cell(package, book.resolver(plan_id)?, address, dishes)?;
            Ok((change.clone(), vec![change]))
        })
    }

    /// Drop a derived diet's override so the cell follows the base again
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `NOT_INHERITABLE` on a base diet, `OUT_OF_RANGE`, or `NOT_FOUND`.
    pub fn reset_cell(&self, package_id: MenuPackageId, expected_version: u64, plan_id: DietPlanId, address: &CellAddress) -> AppResult<Option<CellChange>> {
        self.mutate_cells(package_id, expected_version, |book, package| {
            let change = grid::reset_cell_to_inherited(package, book.resolver(plan_id)?, address)?;
            let changes = change.iter().cloned().collect();
            Ok((change, changes))
        })
    }

    /// Add a catalog dish to a cell
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `NOT_FOUND` for an unknown dish, or any cell write error.
    pub fn add_dish(&self, package_id: MenuPackageId, expected_version: u64, plan_id: DietPlanId, address: &CellAddress, reference_id: &str, portion_grams: Option<f64>) -> AppResult<CellChange> {
        self.mutate_cells(package_id, expected_version, |book, package| {
            let change = grid::add_dish(
                package,
                book.resolver(plan_id)?,
                address,
                self.catalog.as_ref(),
                reference_id,
                portion_grams,
            )?;
            Ok((change.clone(), vec![change]))
        })
    }

    /// Remove a dish from a cell
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `NOT_FOUND` when the cell lacks the dish, or any cell write error.
    pub fn remove_dish(&self, package_id: MenuPackageId, expected_version: u64, plan_id: DietPlanId, address: &CellAddress, reference_id: &str) -> AppResult<CellChange> {
        self.mutate_cells(package_id, expected_version, |book, package| {
            let change = grid::remove_dish(package, book.resolver(plan_id)?, address, reference_id)?;
            Ok((change.clone(), vec![change]))
        })
    }

    /// Resize a dish in a cell
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE`, `INVALID_INPUT` for a non-positive portion, or any cell write error.
    pub fn resize_dish(&self, package_id: MenuPackageId, expected_version: u64, plan_id: DietPlanId, address: &CellAddress, reference_id: &str, portion_grams: f64) -> AppResult<CellChange> {
        self.mutate_cells(package_id, expected_version, |book, package| {
            let change = grid::resize_dish(package, book.resolver(plan_id)?, address, reference_id, portion_grams)?;
            Ok((change.clone(), vec![change]))
        })
    }

    // ================================================================================================
    // Propagation
    // ================================================================================================

    /// Classify a base cell change for every derived diet in the package
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND`, `OUT_OF_RANGE`, or `INVALID_BASE_REFERENCE` for a derived "base".
    pub fn propose_cell_change(&self, package_id: MenuPackageId, base_diet_id: DietPlanId, address: &CellAddress, proposed: Vec<DishAssignment>) -> AppResult<CellProposal> {
        let _snapshot = self.snapshot_guard();
        let package = self.package(package_id)?;
        let book = self.collect_book();
        Ok(propagation::propose_cell_change(
            &book,
            &package,
            base_diet_id,
            address,
            proposed,
            &self.config,
        )?)
    }

    /// Apply a cell proposal for the confirmed diets
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` when the package changed since the proposal.
    pub fn apply_cell_change(&self, proposal: &CellProposal, confirmed: &BTreeSet<DietPlanId>) -> AppResult<ApplyOutcome> {
        let _guard = self.write_guard();
        let mut package = self.package(proposal.package_id)?;
        let book = self.book();
        let outcome = propagation::apply_cell_change(&book, &mut package, proposal, confirmed)
            .map_err(|e| self.reject(e))?;
        self.commit_package(package, &outcome.cell_changes)?;
        Ok(outcome)
    }

    /// Classify a base goal change for every derived diet
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE`.
    pub fn propose_goal_change(&self, base_diet_id: DietPlanId, nutrient: &str, proposed: GoalRange) -> AppResult<GoalProposal> {
        let book = self.book();
        Ok(propagation::propose_goal_change(&book, base_diet_id, nutrient, proposed)?)
    }

    /// Apply a goal proposal for the confirmed diets
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` when the base plan changed since it was loaded.
    pub fn apply_goal_change(&self, proposal: &GoalProposal, expected_base_version: u64, confirmed: &BTreeSet<DietPlanId>) -> AppResult<ApplyOutcome> {
        self.mutate_plan(proposal.base_diet_id, expected_base_version, plan_target("apply_goal_change"), |book| {
            propagation::apply_goal_change(book, proposal, confirmed)
        })
    }

    /// Classify a new base exclusion against every derived diet and package
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` or `INVALID_BASE_REFERENCE`.
    pub fn propose_exclusion_change(&self, base_diet_id: DietPlanId, exclusion: Exclusion) -> AppResult<ExclusionProposal> {
        let _snapshot = self.snapshot_guard();
        let book = self.collect_book();
        let packages = self.packages();
        let package_refs: Vec<&MenuPackage> = packages.iter().collect();
        Ok(propagation::propose_exclusion_change(
            &book,
            &package_refs,
            base_diet_id,
            exclusion,
        )?)
    }

    /// Apply an exclusion proposal for the confirmed diets
    ///
    /// # Errors
    ///
    /// Returns `STALE_WRITE` when the base plan changed since it was loaded.
    pub fn apply_exclusion_change(&self, proposal: &ExclusionProposal, expected_base_version: u64, confirmed: &BTreeSet<DietPlanId>) -> AppResult<ApplyOutcome> {
        self.mutate_plan(proposal.base_diet_id, expected_base_version, exclusions_target("apply_exclusion_change"), |book| {
            propagation::apply_exclusion_change(book, proposal, confirmed)
        })
    }

    // ================================================================================================
    // Internals
    // ================================================================================================

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.commits.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.commits.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of every plan
    fn book(&self) -> PlanBook {
        let _snapshot = self.snapshot_guard();
        self.collect_book()
    }

    fn collect_book(&self) -> PlanBook {
        self.plans.iter().map(|entry| entry.value().clone()).collect()
    }

    /// The plan and, for a derived plan, its base
    fn lineage_book(&self, plan_id: DietPlanId) -> AppResult<PlanBook> {
        let _snapshot = self.snapshot_guard();
        self.collect_lineage(plan_id)
    }

    /// A package together with the lineage of one of its diets
    fn package_with_lineage(&self, package_id: MenuPackageId, plan_id: DietPlanId) -> AppResult<(MenuPackage, PlanBook)> {
        let _snapshot = self.snapshot_guard();
        Ok((self.package(package_id)?, self.collect_lineage(plan_id)?))
    }

    fn collect_lineage(&self, plan_id: DietPlanId) -> AppResult<PlanBook> {
        let plan = self.plan(plan_id)?;
        let base = plan
            .base_diet_id()
            .and_then(|base_id| self.plans.get(&base_id).map(|entry| entry.value().clone()));
        Ok(std::iter::once(plan).chain(base).collect())
    }

    fn reject(&self, error: PlanError) -> AppError {
        warn!(actor = %self.actor_id, error = %error, "Planning operation rejected");
        AppError::from(error).with_actor_id(&self.actor_id)
    }

    fn expect_plan_version(&self, plan_id: DietPlanId, expected: u64) -> AppResult<()> {
        let actual = self
            .plans
            .get(&plan_id)
            .map(|entry| entry.version)
            .ok_or_else(|| PlanError::not_found("diet plan", plan_id))?;
        check_version(plan_id.to_string(), expected, actual).map_err(|e| self.reject(e))
    }

    /// Run a plan mutation against a copy of all plans and commit what changed
    fn mutate_plan<T>(
        &self,
        plan_id: DietPlanId,
        expected_version: u64,
        target: AuditTarget,
        op: impl FnOnce(&mut PlanBook) -> PlanResult<T>,
    ) -> AppResult<T> {
        let _guard = self.write_guard();
        self.expect_plan_version(plan_id, expected_version)?;
        let before = self.book();
        let mut after = before.clone();
        let value = op(&mut after).map_err(|e| self.reject(e))?;
        self.commit_plans(&before, &after, &target)?;
        Ok(value)
    }

    /// Run a cell mutation against a copy of the package and commit it
    fn mutate_cells<T>(
        &self,
        package_id: MenuPackageId,
        expected_version: u64,
        op: impl FnOnce(&PlanBook, &mut MenuPackage) -> PlanResult<(T, Vec<CellChange>)>,
    ) -> AppResult<T> {
        let _guard = self.write_guard();
        let mut package = self.package(package_id)?;
        check_version(package_id.to_string(), expected_version, package.version)
            .map_err(|e| self.reject(e))?;
        let book = self.book();
        let (value, changes) = op(&book, &mut package).map_err(|e| self.reject(e))?;
        if !changes.is_empty() {
            self.commit_package(package, &changes)?;
        }
        Ok(value)
    }

    /// Store every plan that differs from `before`, bumping its version
    ///
    /// The whole batch becomes visible at once; audit records follow.
    fn commit_plans(&self, before: &PlanBook, after: &PlanBook, target: &AuditTarget) -> AppResult<()> {
        let mut changed = Vec::new();
        for plan in after.plans() {
            let previous = before.get(plan.id);
            if previous == Some(plan) {
                continue;
            }
            let mut plan = plan.clone();
            plan.touch();
            let record = AuditRecord::new(
                plan.id,
                &self.actor_id,
                target.clone(),
                previous.map_or(Ok(Value::Null), |p| audit_value(p, target))?,
                audit_value(&plan, target)?,
            );
            changed.push((plan, record));
        }

        {
            let _commit = self.commit_guard();
            for (plan, _) in &changed {
                self.plans.insert(plan.id, plan.clone());
            }
        }

        for (plan, record) in changed {
            info!(
                plan = %plan.code,
                version = plan.version,
                actor = %self.actor_id,
                target = ?target,
                "Plan updated"
            );
            self.audit.record(record);
        }
        Ok(())
    }

    /// Store a package, bumping its version, and audit each cell change
    fn commit_package(&self, mut package: MenuPackage, changes: &[CellChange]) -> AppResult<()> {
        package.touch();
        let records = changes
            .iter()
            .map(|change| {
                Ok(AuditRecord::new(
                    change.plan_id,
                    &self.actor_id,
                    AuditTarget::Cell {
                        package_id: package.id,
                        address: change.address.clone(),
                    },
                    serde_json::to_value(&change.before)?,
                    serde_json::to_value(&change.after)?,
                ))
            })
            .collect::<AppResult<Vec<_>>>()?;
        debug!(package = %package.id, version = package.version, cells = changes.len(), "Package updated");
        {
            let _commit = self.commit_guard();
            self.packages.insert(package.id, package);
        }
        for record in records {
            self.audit.record(record);
        }
        Ok(())
    }
}

fn check_version(resource_id: String, expected: u64, actual: u64) -> PlanResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(PlanError::StaleWrite {
            resource_id,
            expected,
            actual,
        })
    }
}

fn plan_target(operation: &str) -> AuditTarget {
    AuditTarget::Plan {
        operation: operation.to_owned(),
    }
}

fn exclusions_target(operation: &str) -> AuditTarget {
    AuditTarget::Exclusions {
        operation: operation.to_owned(),
    }
}

fn audit_value(plan: &DietPlan, target: &AuditTarget) -> AppResult<Value> {
    Ok(match target {
        AuditTarget::Exclusions { .. } => serde_json::json!({
            "exclusions": plan.exclusions,
            "exclusions_unlocked": plan.exclusions_unlocked,
        }),
        _ => serde_json::to_value(plan)?,
    })
}

// ABOUTME: Snapshot file handling for nutriplan-cli
// ABOUTME: Loads a JSON snapshot into a PlanningService, resolves codes and ids, writes changes back
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

use nutriplan::engine::audit::TracingAuditSink;
use nutriplan::constants::MeasurementUnit;
use nutriplan::engine::catalog::{DishCatalog, InMemoryCatalog};
use nutriplan::engine::EngineConfig;
use nutriplan::errors::{AppError, AppResult};
use nutriplan::models::{DietPlan, DietPlanId, DishAssignment, MenuPackageId};
use nutriplan::services::{PlanningService, PlanningSnapshot};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A loaded snapshot file
pub struct Workspace {
    path: PathBuf,
    catalog: InMemoryCatalog,
    pub service: PlanningService,
}

impl Workspace {
    /// Read and validate the snapshot at `path`
    pub fn load(path: &Path, config: EngineConfig, actor_id: &str) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::not_found(format!("snapshot file {}", path.display())).with_source(e)
        })?;
        let snapshot: PlanningSnapshot = serde_json::from_str(&content)?;
        let catalog = snapshot.catalog.clone();
        let service = PlanningService::from_snapshot(
            snapshot,
            Arc::new(TracingAuditSink),
            config,
            actor_id,
        )?;
        info!(path = %path.display(), dishes = catalog.len(), "Snapshot loaded");

        Ok(Self {
            path: path.to_path_buf(),
            catalog,
            service,
        })
    }

    /// Write the current plans and packages back to the snapshot file
    pub fn save(&self) -> AppResult<()> {
        let snapshot = PlanningSnapshot {
            plans: self.service.plans(),
            packages: self.service.packages(),
            catalog: self.catalog.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, json).map_err(|e| {
            AppError::internal(format!("cannot write snapshot {}", self.path.display())).with_source(e)
        })?;
        info!(path = %self.path.display(), "Snapshot written");
        Ok(())
    }

    /// Find a plan by code, ignoring case
    pub fn plan_by_code(&self, code: &str) -> AppResult<DietPlan> {
        self.service
            .plans()
            .into_iter()
            .find(|plan| plan.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| AppError::not_found(format!("diet plan '{code}'")))
    }

    /// Ids of the given diet codes
    pub fn plan_ids(&self, codes: &[String]) -> AppResult<Vec<DietPlanId>> {
        codes
            .iter()
            .filter(|code| !code.trim().is_empty())
            .map(|code| self.plan_by_code(code.trim()).map(|plan| plan.id))
            .collect()
    }

    /// The requested package, or the only one in the snapshot
    pub fn package_id(&self, requested: Option<&str>) -> AppResult<MenuPackageId> {
        if let Some(raw) = requested {
            return raw
                .parse::<MenuPackageId>()
                .map_err(|_| AppError::invalid_input(format!("'{raw}' is not a package id")));
        }
        match self.service.packages().as_slice() {
            [only] => Ok(only.id),
            [] => Err(AppError::not_found("menu package")),
            _ => Err(AppError::invalid_input(
                "snapshot holds several packages; pass --package",
            )),
        }
    }

    /// Catalog dishes for a list of `id` or `id:quantity` specs (`soup-a:2portion`, `milk:200ml`)
    pub fn dishes(&self, specs: &[String]) -> AppResult<Vec<DishAssignment>> {
        specs
            .iter()
            .map(|spec| spec.trim())
            .filter(|spec| !spec.is_empty())
            .map(|spec| -> AppResult<DishAssignment> {
                let Some((id, quantity)) = spec.split_once(':') else {
                    return Ok(self.catalog.resolve_dish(spec)?.assign(None)?);
                };
                let (amount, unit) = parse_quantity(quantity)?;
                Ok(self.catalog.resolve_dish(id.trim())?.assign_quantity(amount, unit)?)
            })
            .collect()
    }
}

/// Split `150g` or `2 portion` into an amount and a unit
fn parse_quantity(raw: &str) -> AppResult<(f64, MeasurementUnit)> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, symbol) = raw.split_at(split);
    let amount = number
        .parse::<f64>()
        .map_err(|_| AppError::invalid_input(format!("'{raw}' does not start with a quantity")))?;
    let unit = if symbol.trim().is_empty() {
        MeasurementUnit::Grams
    } else {
        MeasurementUnit::from_symbol(symbol)
            .ok_or_else(|| AppError::invalid_input(format!("unknown unit '{}'", symbol.trim())))?
    };
    Ok((amount, unit))
}

// ABOUTME: Nutrition aggregator summing dish snapshots into cell, day and period totals
// ABOUTME: Adherence bands, macro energy split and goal adherence reports with data gap tracking
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! # Nutrition Aggregator
//!
//! Totals are never stored; they are recomputed from the current dish
//! snapshots on every call. Missing snapshot fields count as zero and are
//! reported as [`DataGap`]s so zero-filling does not hide a data-entry gap.

use crate::config::{AdherenceConfig, EngineConfig, MacroEnergyConfig};
use crate::grid::{DietGrid, ResolvedCell};
use crate::resolver::Resolver;
use nutriplan_core::constants::{NutrientInfo, NutrientSource, SODIUM_MG_PER_SALT_G};
use nutriplan_core::errors::PlanResult;
use nutriplan_core::models::{CellAddress, DishAssignment, GoalRange, NutrientField, NutritionSnapshot};
use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Elementwise nutrition totals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NutritionTotals {
    /// Energy (kcal)
    pub kcal: f64,
    /// Protein (g)
    pub protein: f64,
    /// Fat (g)
    pub fat: f64,
    /// Saturated fat (g)
    pub saturated_fat: f64,
    /// Carbohydrates (g)
    pub carbs: f64,
    /// Sugars (g)
    pub sugars: f64,
    /// Salt (g)
    pub salt: f64,
    /// Fiber (g)
    pub fiber: f64,
    /// Food cost
    pub cost: f64,
}

impl NutritionTotals {
    /// Totals of one snapshot, missing fields as zero
    #[must_use]
    pub fn from_snapshot(snapshot: &NutritionSnapshot) -> Self {
        Self {
            kcal: snapshot.kcal.unwrap_or_default(),
            protein: snapshot.protein.unwrap_or_default(),
            fat: snapshot.fat.unwrap_or_default(),
            saturated_fat: snapshot.saturated_fat.unwrap_or_default(),
            carbs: snapshot.carbs.unwrap_or_default(),
            sugars: snapshot.sugars.unwrap_or_default(),
            salt: snapshot.salt.unwrap_or_default(),
            fiber: snapshot.fiber.unwrap_or_default(),
            cost: snapshot.cost.unwrap_or_default(),
        }
    }

    /// Read one field
    #[must_use]
    pub const fn get(&self, field: NutrientField) -> f64 {
        match field {
            NutrientField::Kcal => self.kcal,
            NutrientField::Protein => self.protein,
            NutrientField::Fat => self.fat,
            NutrientField::SaturatedFat => self.saturated_fat,
            NutrientField::Carbs => self.carbs,
            NutrientField::Sugars => self.sugars,
            NutrientField::Salt => self.salt,
            NutrientField::Fiber => self.fiber,
            NutrientField::Cost => self.cost,
        }
    }

    /// Every field multiplied by `factor`
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            kcal: self.kcal * factor,
            protein: self.protein * factor,
            fat: self.fat * factor,
            saturated_fat: self.saturated_fat * factor,
            carbs: self.carbs * factor,
            sugars: self.sugars * factor,
            salt: self.salt * factor,
            fiber: self.fiber * factor,
            cost: self.cost * factor,
        }
    }

    /// Daily value for a catalog nutrient, if dish snapshots track it
    #[must_use]
    pub fn nutrient_value(&self, info: &NutrientInfo) -> Option<f64> {
        match info.source {
            NutrientSource::Field(field) => Some(self.get(field)),
            NutrientSource::SodiumFromSalt => Some(self.salt * SODIUM_MG_PER_SALT_G),
            NutrientSource::Untracked => None,
        }
    }
}

impl Add for NutritionTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            kcal: self.kcal + rhs.kcal,
            protein: self.protein + rhs.protein,
            fat: self.fat + rhs.fat,
            saturated_fat: self.saturated_fat + rhs.saturated_fat,
            carbs: self.carbs + rhs.carbs,
            sugars: self.sugars + rhs.sugars,
            salt: self.salt + rhs.salt,
            fiber: self.fiber + rhs.fiber,
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for NutritionTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for NutritionTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// A dish field that was missing and counted as zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataGap {
    /// Cell holding the dish
    pub address: CellAddress,
    /// Dish reference
    pub reference_id: String,
    /// Missing field
    pub field: NutrientField,
}

/// Totals plus the gaps behind them
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Aggregate {
    /// Summed values
    pub totals: NutritionTotals,
    /// Missing snapshot fields
    pub gaps: Vec<DataGap>,
}

/// Sum of the dishes of one cell; empty cells total zero
#[must_use]
pub fn cell_totals(dishes: &[DishAssignment]) -> NutritionTotals {
    dishes
        .iter()
        .map(|dish| NutritionTotals::from_snapshot(&dish.nutrition))
        .sum()
}

/// Cell totals with data gaps
#[must_use]
pub fn cell_aggregate(cell: &ResolvedCell<'_>) -> Aggregate {
    let gaps = cell
        .dishes
        .iter()
        .flat_map(|dish| {
            dish.nutrition.missing_fields().map(|field| DataGap {
                address: cell.address.clone(),
                reference_id: dish.reference_id.clone(),
                field,
            })
        })
        .collect();
    Aggregate {
        totals: cell_totals(cell.dishes),
        gaps,
    }
}

/// Sum over every meal slot of one day
///
/// # Errors
///
/// Returns `OutOfRange` for a day outside the cycle.
pub fn day_totals(grid: &DietGrid<'_>, week: usize, day: usize) -> PlanResult<Aggregate> {
    let mut aggregate = Aggregate::default();
    for cell in grid.day_cells(week, day)? {
        let cell = cell_aggregate(&cell);
        aggregate.totals += cell.totals;
        aggregate.gaps.extend(cell.gaps);
    }
    Ok(aggregate)
}

/// Average of day totals over a day set; an empty set averages to zero
///
/// # Errors
///
/// Returns `OutOfRange` for a day outside the cycle.
pub fn period_average(grid: &DietGrid<'_>, days: &[(usize, usize)]) -> PlanResult<Aggregate> {
    let mut sum = Aggregate::default();
    for &(week, day) in days {
        let aggregate = day_totals(grid, week, day)?;
        sum.totals += aggregate.totals;
        sum.gaps.extend(aggregate.gaps);
    }
    if days.is_empty() {
        return Ok(sum);
    }
    #[allow(clippy::cast_precision_loss)]
    let count = days.len() as f64;
    Ok(Aggregate {
        totals: sum.totals.scaled(count.recip()),
        gaps: sum.gaps,
    })
}

/// Average over the days of one week that fall inside the cycle
///
/// # Errors
///
/// Returns `OutOfRange` when the week starts outside the cycle.
pub fn week_average(grid: &DietGrid<'_>, week: usize) -> PlanResult<Aggregate> {
    let days: Vec<(usize, usize)> = grid
        .days()
        .into_iter()
        .filter(|(w, _)| *w == week)
        .collect();
    if days.is_empty() {
        grid.package()
            .check_address(&CellAddress::new(week, 0, ""))?;
    }
    period_average(grid, &days)
}

/// Target adherence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdherenceBand {
    /// Deviation within the on-target threshold
    OnTarget,
    /// Deviation above on-target, within borderline
    Borderline,
    /// Anything further away
    OffTarget,
}

/// Band for a current value against a single target
///
/// Relative deviation is `|current - target| / target`. A zero target is
/// on-target only when the current value is zero too.
#[must_use]
pub fn adherence_band(current: f64, target: f64, thresholds: &AdherenceConfig) -> AdherenceBand {
    if target.abs() < f64::EPSILON {
        return if current.abs() < f64::EPSILON {
            AdherenceBand::OnTarget
        } else {
            AdherenceBand::OffTarget
        };
    }
    let deviation = (current - target).abs() / target.abs();
    if deviation <= thresholds.on_target {
        AdherenceBand::OnTarget
    } else if deviation <= thresholds.borderline {
        AdherenceBand::Borderline
    } else {
        AdherenceBand::OffTarget
    }
}

/// Band for a current value against a goal range
///
/// Inside `[min, max]` is on-target; outside, the nearest bound is the
/// target. Returns `None` when the range has no bounds.
#[must_use]
pub fn range_band(current: f64, range: &GoalRange, thresholds: &AdherenceConfig) -> Option<AdherenceBand> {
    let nearest = match (range.min, range.max) {
        (Some(min), _) if current < min => min,
        (_, Some(max)) if current > max => max,
        (None, None) => return None,
        _ => return Some(AdherenceBand::OnTarget),
    };
    Some(adherence_band(current, nearest, thresholds))
}

/// Share of macronutrient energy, as fractions summing to 1 (or all zero)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MacroSplit {
    /// Protein share
    pub protein: f64,
    /// Fat share
    pub fat: f64,
    /// Carbohydrate share
    pub carbs: f64,
}

/// Macro energy split; a zero denominator yields all zeros
#[must_use]
pub fn macro_split(totals: &NutritionTotals, energy: &MacroEnergyConfig) -> MacroSplit {
    let protein = totals.protein * energy.protein_kcal_per_g;
    let fat = totals.fat * energy.fat_kcal_per_g;
    let carbs = totals.carbs * energy.carbs_kcal_per_g;
    let total = protein + fat + carbs;
    if total <= 0.0 {
        return MacroSplit::default();
    }
    MacroSplit {
        protein: protein / total,
        fat: fat / total,
        carbs: carbs / total,
    }
}

/// How a goal compares with the aggregated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "band", rename_all = "snake_case")]
pub enum GoalStatus {
    /// Compared; band attached
    Measured(AdherenceBand),
    /// Goal has no value (e.g. missing on the base)
    Unresolved,
    /// Dish snapshots carry no data for this nutrient
    Untracked,
    /// Goal has only a kcal percentage, compared via the macro split
    PercentOnly(AdherenceBand),
    /// Goal has neither bounds nor a percentage
    Empty,
}

/// Adherence of one goal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAdherence {
    /// Nutrient name
    pub nutrient: String,
    /// Aggregated value, when tracked
    pub current: Option<f64>,
    /// Effective goal range
    pub goal: Option<GoalRange>,
    /// Current value as a percentage of the goal target (progress bar)
    pub percent_of_target: Option<f64>,
    /// Comparison result
    pub status: GoalStatus,
}

/// Goal adherence for a set of totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdherenceReport {
    /// One entry per effective goal
    pub goals: Vec<GoalAdherence>,
    /// Macro split of the totals
    pub macro_split: MacroSplit,
    /// Missing dish data behind the totals
    pub gaps: Vec<DataGap>,
}

/// Compare aggregated totals with a diet's effective goals
#[must_use]
pub fn goal_adherence(diet: &Resolver<'_>, aggregate: &Aggregate, config: &EngineConfig) -> AdherenceReport {
    let split = macro_split(&aggregate.totals, &config.macro_energy);
    let goals = diet
        .effective_goals()
        .into_iter()
        .map(|goal| {
            let info = NutrientInfo::lookup(&goal.nutrient);
            let current = info.and_then(|info| aggregate.totals.nutrient_value(info));
            let status = goal_status(goal.range.as_ref(), current, info, &split, &config.adherence);
            let percent_of_target = match (current, goal.range.as_ref().and_then(GoalRange::target)) {
                (Some(value), Some(target)) if target > 0.0 => Some(value / target * 100.0),
                _ => None,
            };
            GoalAdherence {
                nutrient: goal.nutrient,
                current,
                goal: goal.range,
                percent_of_target,
                status,
            }
        })
        .collect();

    AdherenceReport {
        goals,
        macro_split: split,
        gaps: aggregate.gaps.clone(),
    }
}

fn goal_status(range: Option<&GoalRange>, current: Option<f64>, info: Option<&NutrientInfo>, split: &MacroSplit, thresholds: &AdherenceConfig) -> GoalStatus {
    let Some(range) = range else {
        return GoalStatus::Unresolved;
    };
    if let Some(band) = current.and_then(|value| range_band(value, range, thresholds)) {
        return GoalStatus::Measured(band);
    }
    if let Some(percent) = range.percent_of_kcal {
        let share = info.and_then(|info| match info.source {
            NutrientSource::Field(NutrientField::Protein) => Some(split.protein),
            NutrientSource::Field(NutrientField::Fat) => Some(split.fat),
            NutrientSource::Field(NutrientField::Carbs) => Some(split.carbs),
            _ => None,
        });
        if let Some(share) = share {
            return GoalStatus::PercentOnly(adherence_band(share * 100.0, percent, thresholds));
        }
    }
    if current.is_none() {
        GoalStatus::Untracked
    } else {
        GoalStatus::Empty
    }
}

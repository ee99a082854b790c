// ABOUTME: Nutriplan CLI - inspect and edit diet plans and menus stored in a JSON snapshot
// ABOUTME: Resolves plans and cells, reports totals and diffs, proposes and applies propagation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors
//!
//! Usage:
//! ```bash
//! # Effective goals, exclusions and meal slots of a diet
//! nutriplan-cli --snapshot plans.json resolve --plan GF
//!
//! # One resolved menu cell
//! nutriplan-cli resolve-cell --plan GF --week 0 --day 0 --slot lunch
//!
//! # Day totals, or goal adherence of a week's average
//! nutriplan-cli totals --plan DIABETIC --week 0 --day 2
//! nutriplan-cli totals --plan DIABETIC --week 0
//!
//! # Propose a base cell change, then apply it for confirmed diets
//! nutriplan-cli propagate cell --base STANDARD --week 0 --day 0 --slot lunch --dishes soup-b
//! nutriplan-cli propagate cell --base STANDARD --week 0 --day 0 --slot lunch --dishes soup-b \
//!     --confirm DIABETIC --apply
//!
//! # Derived-versus-base differences and plan validation
//! nutriplan-cli diff --plan GF
//! nutriplan-cli validate
//! ```

mod commands;
mod helpers;

use clap::{Parser, Subcommand};
use nutriplan::config::PlannerConfig;
use nutriplan::constants::service_names;
use nutriplan::errors::{AppError, AppResult};
use nutriplan::logging::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing::info;

type Result<T> = AppResult<T>;

#[derive(Parser)]
#[command(
    name = "nutriplan-cli",
    about = "Nutriplan diet plan and menu tool",
    long_about = "Command-line tool for resolving inherited diet plans, inspecting menu cells and totals, and propagating base-diet changes to derived diets."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON snapshot holding plans, packages and the dish catalog
    #[arg(long, short = 's', global = true, default_value = "nutriplan.json")]
    snapshot: PathBuf,

    /// Menu package id (defaults to the only package in the snapshot)
    #[arg(long, global = true)]
    package: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// Show a diet's effective goals, exclusions and meal slots
    Resolve {
        /// Diet code
        #[arg(long)]
        plan: String,
    },

    /// Show one resolved menu cell
    ResolveCell {
        /// Diet code
        #[arg(long)]
        plan: String,

        /// Week index within the cycle
        #[arg(long)]
        week: usize,

        /// Day index within the week (0-6)
        #[arg(long)]
        day: usize,

        /// Meal slot id
        #[arg(long)]
        slot: String,
    },

    /// Show day totals, or week-average goal adherence when no day is given
    Totals {
        /// Diet code
        #[arg(long)]
        plan: String,

        /// Week index within the cycle
        #[arg(long)]
        week: usize,

        /// Day index within the week (0-6)
        #[arg(long)]
        day: Option<usize>,
    },

    /// Propose and apply base-diet changes
    Propagate {
        #[command(subcommand)]
        action: PropagateCommand,
    },

    /// Show how a derived diet differs from its base
    Diff {
        /// Derived diet code
        #[arg(long)]
        plan: String,
    },

    /// Report structure and goal problems
    Validate {
        /// Diet code (all diets when omitted)
        #[arg(long)]
        plan: Option<String>,
    },
}

#[non_exhaustive]
#[derive(Subcommand)]
enum PropagateCommand {
    /// Replace the content of a base cell
    Cell {
        /// Base diet code
        #[arg(long)]
        base: String,

        /// Week index within the cycle
        #[arg(long)]
        week: usize,

        /// Day index within the week (0-6)
        #[arg(long)]
        day: usize,

        /// Meal slot id
        #[arg(long)]
        slot: String,

        /// Catalog dishes of the new content as `id` or `id:quantity` (comma-separated, empty for no meal)
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        dishes: Vec<String>,

        /// Derived diet codes that take the change (comma-separated)
        #[arg(long, value_delimiter = ',')]
        confirm: Vec<String>,

        /// Apply the change and write the snapshot back
        #[arg(long)]
        apply: bool,
    },

    /// Change a base nutrition goal
    Goal {
        /// Base diet code
        #[arg(long)]
        base: String,

        /// Nutrient name
        #[arg(long)]
        nutrient: String,

        /// Lower bound
        #[arg(long)]
        min: Option<f64>,

        /// Upper bound
        #[arg(long)]
        max: Option<f64>,

        /// Derived diet codes that take the change (comma-separated)
        #[arg(long, value_delimiter = ',')]
        confirm: Vec<String>,

        /// Apply the change and write the snapshot back
        #[arg(long)]
        apply: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Compact logs go to stderr so stdout stays machine-readable
    let mut logging = LoggingConfig::from_env();
    logging.format = LogFormat::Compact;
    logging.level = if cli.verbose { "debug" } else { "warn" }.to_owned();
    logging
        .init()
        .map_err(|e| AppError::internal(format!("logging setup failed: {e:#}")))?;

    info!("{} starting", service_names::NUTRIPLAN_CLI);

    let config = PlannerConfig::from_env().map_err(|e| AppError::config(format!("{e:#}")))?;
    let engine_config = config
        .engine_config()
        .map_err(|e| AppError::config(format!("{e:#}")))?;
    let workspace = helpers::snapshot::Workspace::load(&cli.snapshot, engine_config, &config.actor_id)?;
    let package = cli.package.as_deref();

    match cli.command {
        Command::Resolve { plan } => commands::plans::resolve(&workspace, &plan)?,
        Command::ResolveCell {
            plan,
            week,
            day,
            slot,
        } => commands::menu::resolve_cell(&workspace, package, &plan, week, day, &slot)?,
        Command::Totals { plan, week, day } => {
            commands::menu::totals(&workspace, package, &plan, week, day)?;
        }
        Command::Propagate { action } => match action {
            PropagateCommand::Cell {
                base,
                week,
                day,
                slot,
                dishes,
                confirm,
                apply,
            } => {
                commands::propagate::cell(
                    &workspace,
                    package,
                    &base,
                    (week, day, slot),
                    &dishes,
                    &confirm,
                    apply,
                )?;
            }
            PropagateCommand::Goal {
                base,
                nutrient,
                min,
                max,
                confirm,
                apply,
            } => {
                commands::propagate::goal(&workspace, &base, &nutrient, (min, max), &confirm, apply)?;
            }
        },
        Command::Diff { plan } => commands::plans::diff(&workspace, package, &plan)?,
        Command::Validate { plan } => commands::plans::validate(&workspace, plan.as_deref())?,
    }

    Ok(())
}

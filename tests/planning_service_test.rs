// ABOUTME: Tests for the versioned planning service over the engine
// ABOUTME: Stale write detection, version bumps, audit records and end-to-end propagation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{dish, lunch_day_2, Fixture};
use nutriplan::engine::audit::{AuditTarget, MemoryAuditSink};
use nutriplan::engine::grid::CellOrigin;
use nutriplan::engine::{EngineConfig, KindChange};
use nutriplan::errors::ErrorCode;
use nutriplan::models::{
    ChangeType, DietKind, DietPlan, ExclusionCategory, GoalRange, GoalSource, Substitution,
};
use nutriplan::services::{PlanningService, PlanningSnapshot};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn test_plan_write_with_stale_version_is_rejected() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();

    let err = service.toggle_goal_source(fixture.gf, 7, "Sodium").unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleWrite);
    assert!(err.is_retryable());
    assert_eq!(err.context.actor_id.as_deref(), Some("dietitian-1"));
    assert_eq!(err.context.details["expected_version"], 7);
    assert_eq!(err.context.details["actual_version"], 0);
    assert!(audit.records().is_empty());
    assert_eq!(service.plan(fixture.gf).unwrap().version, 0);
}

#[test]
fn test_successful_write_bumps_version_and_audits() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();

    let source = service.toggle_goal_source(fixture.gf, 0, "Sodium").unwrap();
    assert_eq!(source, GoalSource::Overridden);
    assert_eq!(service.plan(fixture.gf).unwrap().version, 1);
    assert_eq!(service.plan(fixture.standard).unwrap().version, 0);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].plan_id, fixture.gf);
    assert_eq!(records[0].actor_id, "dietitian-1");
    assert_eq!(
        records[0].target,
        AuditTarget::Plan {
            operation: "toggle_goal_source".to_owned()
        }
    );
    assert_ne!(records[0].before, records[0].after);

    let err = service
        .set_goal(fixture.gf, 0, "Sodium", GoalRange::between(1800.0, 2000.0))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleWrite);
    let plan = service
        .set_goal(fixture.gf, 1, "Sodium", GoalRange::between(1800.0, 2000.0))
        .unwrap();
    assert_eq!(plan.version, 2);
    let base = service.effective_goals(fixture.standard).unwrap();
    let sodium = base.iter().find(|goal| goal.nutrient == "Sodium").unwrap();
    assert_eq!(sodium.range, Some(GoalRange::between(1800.0, 2200.0)));
}

#[test]
fn test_failed_operation_changes_nothing() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();

    let err = service
        .set_exclusion_active(fixture.gf, 0, ExclusionCategory::Allergen, "peanuts", false)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = service.unlock_exclusions(fixture.standard, 0).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotInheritable);

    assert!(audit.records().is_empty());
    assert_eq!(service.plan(fixture.gf).unwrap().version, 0);
}

#[test]
fn test_exclusion_edits_are_audited_as_exclusion_changes() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();

    let exclusion = service
        .add_exclusion(fixture.diabetic, 0, ExclusionCategory::Ingredient, "honey")
        .unwrap();
    service.remove_exclusion(fixture.diabetic, 1, exclusion.id).unwrap();

    let records = audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0].target,
        AuditTarget::Exclusions {
            operation: "add".to_owned()
        }
    );
    assert!(records[0].after.get("exclusions").is_some());
    assert_eq!(service.plan(fixture.diabetic).unwrap().version, 2);
}

#[test]
fn test_cell_writes_are_versioned_per_package() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();
    let package_id = fixture.package.id;

    service
        .write_cell(package_id, 0, fixture.gf, &lunch_day_2(), vec![dish("soup-b")])
        .unwrap();
    assert_eq!(service.package(package_id).unwrap().version, 1);

    let err = service
        .write_cell(package_id, 0, fixture.gf, &lunch_day_2(), vec![dish("soup-c")])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleWrite);

    let cell = service.cell(package_id, fixture.gf, &lunch_day_2()).unwrap();
    assert_eq!(cell.origin, CellOrigin::Overridden);
    assert_eq!(cell.dishes[0].reference_id, "soup-b");

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].target, AuditTarget::Cell { .. }));
    assert_eq!(records[0].before["origin"], "inherited");
    assert_eq!(records[0].after["origin"], "overridden");
}

#[test]
fn test_reset_without_override_keeps_version() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();
    let package_id = fixture.package.id;

    let change = service
        .reset_cell(package_id, 0, fixture.gf, &lunch_day_2())
        .unwrap();
    assert!(change.is_none());
    assert_eq!(service.package(package_id).unwrap().version, 0);
}

#[test]
fn test_add_dish_uses_catalog() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();
    let package_id = fixture.package.id;

    let change = service
        .add_dish(package_id, 0, fixture.standard, &lunch_day_2(), "soup-b", Some(150.0))
        .unwrap();
    assert_eq!(change.after.dishes.len(), 2);

    let totals = service.day_totals(package_id, fixture.gf, 0, 2).unwrap();
    assert!((totals.totals.kcal - 210.0).abs() < 1e-9);
}

#[test]
fn test_service_propagation_end_to_end() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();
    let package_id = fixture.package.id;

    service
        .write_cell(package_id, 0, fixture.gf, &lunch_day_2(), vec![dish("soup-b")])
        .unwrap();
    let proposal = service
        .propose_cell_change(package_id, fixture.standard, &lunch_day_2(), vec![dish("soup-c")])
        .unwrap();
    assert_eq!(proposal.package_version, 1);

    let confirmed: BTreeSet<_> = [fixture.gf, fixture.diabetic].into_iter().collect();
    let outcome = service.apply_cell_change(&proposal, &confirmed).unwrap();
    assert_eq!(outcome.skipped_overrides, vec![fixture.gf]);
    assert_eq!(outcome.applied, vec![fixture.diabetic]);

    let diabetic = service.cell(package_id, fixture.diabetic, &lunch_day_2()).unwrap();
    assert_eq!(diabetic.origin, CellOrigin::Inherited);
    assert_eq!(diabetic.dishes[0].reference_id, "soup-c");
    assert_eq!(service.package(package_id).unwrap().version, 2);

    let err = service.apply_cell_change(&proposal, &confirmed).unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleWrite);
    assert_eq!(audit.records().len(), 2);
}

#[test]
fn test_goal_propagation_checks_base_version() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();

    let proposal = service
        .propose_goal_change(fixture.standard, "Sodium", GoalRange::between(1500.0, 2000.0))
        .unwrap();
    let err = service
        .apply_goal_change(&proposal, 3, &BTreeSet::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleWrite);

    let outcome = service
        .apply_goal_change(&proposal, 0, &BTreeSet::new())
        .unwrap();
    assert_eq!(outcome.pinned.len(), 2);
    assert_eq!(service.plan(fixture.standard).unwrap().version, 1);
    assert_eq!(service.plan(fixture.gf).unwrap().version, 1);
}

#[test]
fn test_readers_never_see_half_applied_goal_propagation() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();
    let previous = Some(GoalRange::between(1800.0, 2200.0));

    let proposal = service
        .propose_goal_change(fixture.standard, "Sodium", GoalRange::between(1500.0, 2000.0))
        .unwrap();
    std::thread::scope(|scope| {
        let readers: Vec<_> = [fixture.gf, fixture.diabetic]
            .into_iter()
            .map(|diet| {
                let service = &service;
                scope.spawn(move || {
                    for _ in 0..500 {
                        let goals = service.effective_goals(diet).unwrap();
                        let sodium = goals.iter().find(|g| g.nutrient == "Sodium").unwrap();
                        assert_eq!(sodium.range, previous);
                    }
                })
            })
            .collect();

        let outcome = service
            .apply_goal_change(&proposal, 0, &BTreeSet::new())
            .unwrap();
        assert_eq!(outcome.pinned.len(), 2);
        for reader in readers {
            reader.join().unwrap();
        }
    });
}

#[test]
fn test_set_kind_to_base_freezes_cells() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();
    let package_id = fixture.package.id;

    let plan = service
        .set_kind(fixture.diabetic, 0, KindChange::Base)
        .unwrap();
    assert_eq!(plan.kind(), DietKind::Base);

    let cell = service.cell(package_id, fixture.diabetic, &lunch_day_2()).unwrap();
    assert_eq!(cell.origin, CellOrigin::Owned);
    assert_eq!(cell.dishes[0].reference_id, "soup-a");
    assert_eq!(service.package(package_id).unwrap().version, 1);
}

#[test]
fn test_create_plans_and_package() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();

    let light = service
        .create_derived_plan("LIGHT", "Light", fixture.standard)
        .unwrap();
    assert!(light.is_derived());
    let err = service
        .create_derived_plan("LIGHTER", "Lighter", light.id)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidBaseReference);
    let err = service.create_base_plan("standard", "Copy").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);

    let err = service
        .create_package("client-2", common::period(), 10)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    service.create_package("client-2", common::period(), 7).unwrap();
    assert_eq!(service.packages().len(), 2);

    let codes: Vec<String> = service.plans().into_iter().map(|plan| plan.code).collect();
    assert_eq!(codes, vec!["DIABETIC", "GF", "LIGHT", "STANDARD"]);
    assert_eq!(audit.records().len(), 1);
}

#[test]
fn test_snapshot_loads_derived_before_base() {
    let fixture = Fixture::new();
    let mut snapshot = fixture.snapshot();
    snapshot.plans.sort_by_key(|plan| !plan.is_derived());

    let service = PlanningService::from_snapshot(
        snapshot,
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
        "loader",
    )
    .unwrap();
    assert_eq!(service.plans().len(), 3);
}

#[test]
fn test_snapshot_with_dangling_base_is_rejected() {
    let fixture = Fixture::new();
    let mut snapshot = fixture.snapshot();
    snapshot.plans.push(DietPlan::new_derived(
        "ORPHAN",
        "Orphan",
        nutriplan::models::DietPlanId::new(),
    ));

    let result = PlanningService::from_snapshot(
        snapshot,
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
        "loader",
    );
    assert!(matches!(
        result,
        Err(err) if err.code == ErrorCode::InvalidBaseReference
    ));
}

#[test]
fn test_snapshot_survives_json() {
    let fixture = Fixture::new();
    let json = serde_json::to_string(&fixture.snapshot()).unwrap();
    let snapshot: PlanningSnapshot = serde_json::from_str(&json).unwrap();

    assert_eq!(snapshot.plans.len(), 3);
    assert_eq!(snapshot.packages.len(), 1);
    assert_eq!(snapshot.packages[0].id, fixture.package.id);
    assert_eq!(snapshot.catalog.len(), fixture.catalog.len());

    let service = PlanningService::from_snapshot(
        snapshot,
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
        "loader",
    )
    .unwrap();
    let cell = service
        .cell(fixture.package.id, fixture.gf, &lunch_day_2())
        .unwrap();
    assert_eq!(cell.origin, CellOrigin::Inherited);
    assert_eq!(cell.dishes[0].reference_id, "soup-a");
}

#[test]
fn test_substitutions_are_recorded_and_removed() {
    let fixture = Fixture::new();
    let (service, audit) = fixture.service();
    let substitution = Substitution {
        id: Uuid::new_v4(),
        menu_element: "bread".into(),
        original: "wheat-bread".into(),
        replacement: "rice-cakes".into(),
        change_type: ChangeType::Replace,
        applies_to: Vec::new(),
    };

    let err = service
        .add_substitution(fixture.standard, 0, substitution.clone())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotInheritable);

    let plan = service.add_substitution(fixture.gf, 0, substitution.clone()).unwrap();
    assert_eq!(plan.version, 1);
    let diff = service.diff(fixture.gf, None).unwrap();
    assert_eq!(diff.substitutions, vec![substitution.clone()]);

    let err = service.remove_substitution(fixture.gf, 1, Uuid::new_v4()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    let removed = service.remove_substitution(fixture.gf, 1, substitution.id).unwrap();
    assert_eq!(removed, substitution);
    assert!(service.plan(fixture.gf).unwrap().substitutions.is_empty());
    assert_eq!(service.plan(fixture.gf).unwrap().version, 2);
    assert_eq!(audit.records().len(), 2);
}

#[test]
fn test_week_adherence_and_diff_reads() {
    let fixture = Fixture::new();
    let (service, _audit) = fixture.service();
    let package_id = fixture.package.id;

    let report = service.week_adherence(package_id, fixture.gf, 0).unwrap();
    assert!(report.goals.iter().any(|goal| goal.nutrient == "Sodium"));

    let diff = service.diff(fixture.gf, Some(package_id)).unwrap();
    assert_eq!(diff.exclusions_added.len(), 1);
    let err = service.diff(fixture.standard, None).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotInheritable);

    assert!(service.validate_plan(fixture.gf).unwrap().is_empty());
}

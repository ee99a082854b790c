// ABOUTME: Tests for classifying and applying base-diet changes across derived diets
// ABOUTME: Cell, goal and exclusion propagation with overrides, conflicts, checks and pinning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{dish, lunch_day_2, Fixture, LUNCH};
use nutriplan::engine::grid::{self, CellOrigin, DietGrid};
use nutriplan::engine::propagation::{
    apply_cell_change, apply_exclusion_change, apply_goal_change, propose_cell_change,
    propose_exclusion_change, propose_goal_change,
};
use nutriplan::engine::{Classification, EngineConfig};
use nutriplan::errors::PlanError;
use nutriplan::models::{
    DietPlan, DietPlanId, Exclusion, ExclusionCategory, GoalRange, GoalSource, MealSlotId,
    PlanStatus,
};
use std::collections::BTreeSet;

fn confirmed(ids: &[DietPlanId]) -> BTreeSet<DietPlanId> {
    ids.iter().copied().collect()
}

fn cell_refs(fixture: &Fixture, plan: DietPlanId) -> (Vec<String>, CellOrigin) {
    let grid = DietGrid::new(&fixture.package, fixture.book.resolver(plan).unwrap()).unwrap();
    let cell = grid.get_cell(&lunch_day_2()).unwrap();
    (
        cell.dishes.iter().map(|d| d.reference_id.clone()).collect(),
        cell.origin,
    )
}

fn override_gf_lunch(fixture: &mut Fixture, reference_id: &str) {
    grid::write_cell(
        &mut fixture.package,
        fixture.book.resolver(fixture.gf).unwrap(),
        &lunch_day_2(),
        vec![dish(reference_id)],
    )
    .unwrap();
}

// ============================================================================
// Cell propagation
// ============================================================================

#[test]
fn test_override_skipped_and_compatible_stays_view() {
    let mut fixture = Fixture::new();
    override_gf_lunch(&mut fixture, "soup-b");

    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();

    let codes: Vec<(&str, Classification)> = proposal
        .records
        .iter()
        .map(|r| (r.diet_code.as_str(), r.classification))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("DIABETIC", Classification::Compatible),
            ("GF", Classification::Override),
        ]
    );

    let outcome = apply_cell_change(
        &fixture.book,
        &mut fixture.package,
        &proposal,
        &confirmed(&[fixture.gf, fixture.diabetic]),
    )
    .unwrap();
    assert_eq!(outcome.applied, vec![fixture.diabetic]);
    assert_eq!(outcome.skipped_overrides, vec![fixture.gf]);
    assert!(outcome.pinned.is_empty());

    assert_eq!(
        cell_refs(&fixture, fixture.diabetic),
        (vec!["soup-c".to_owned()], CellOrigin::Inherited)
    );
    assert_eq!(
        cell_refs(&fixture, fixture.gf),
        (vec!["soup-b".to_owned()], CellOrigin::Overridden)
    );
    assert_eq!(
        cell_refs(&fixture, fixture.standard),
        (vec!["soup-c".to_owned()], CellOrigin::Owned)
    );
}

#[test]
fn test_exclusion_hit_is_conflict() {
    let fixture = Fixture::new();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-b"), dish("wheat-bread")],
        &EngineConfig::default(),
    )
    .unwrap();

    let gf = proposal.records.iter().find(|r| r.diet_id == fixture.gf).unwrap();
    assert_eq!(gf.classification, Classification::Conflict);
    assert!(gf.note.contains("GLUTEN"));
    let diabetic = proposal.records.iter().find(|r| r.diet_id == fixture.diabetic).unwrap();
    assert_eq!(diabetic.classification, Classification::Compatible);
}

#[test]
fn test_verify_rule_flags_check() {
    let mut fixture = Fixture::new();
    fixture.book.toggle_goal_source(fixture.diabetic, "Sodium").unwrap();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("salty-stew")],
        &EngineConfig::default(),
    )
    .unwrap();

    let diabetic = proposal.records.iter().find(|r| r.diet_id == fixture.diabetic).unwrap();
    assert_eq!(diabetic.classification, Classification::Check);
    assert!(diabetic.note.contains("sodium-sensitive"));
}

#[test]
fn test_inherited_goal_does_not_trigger_verify_rule() {
    let fixture = Fixture::new();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("salty-stew")],
        &EngineConfig::default(),
    )
    .unwrap();

    assert_eq!(proposal.records.len(), 2);
    assert!(proposal
        .records
        .iter()
        .all(|r| r.classification == Classification::Compatible));
}

#[test]
fn test_verify_rules_are_configurable() {
    let fixture = Fixture::new();
    let config = EngineConfig {
        verify_rules: Vec::new(),
        ..EngineConfig::default()
    };
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("salty-stew")],
        &config,
    )
    .unwrap();

    assert!(proposal
        .records
        .iter()
        .all(|r| r.classification == Classification::Compatible));
}

#[test]
fn test_unconfirmed_diets_are_pinned_to_previous_content() {
    let mut fixture = Fixture::new();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();

    let outcome = apply_cell_change(
        &fixture.book,
        &mut fixture.package,
        &proposal,
        &confirmed(&[fixture.diabetic]),
    )
    .unwrap();
    assert_eq!(outcome.applied, vec![fixture.diabetic]);
    assert_eq!(outcome.pinned, vec![fixture.gf]);
    assert_eq!(outcome.cell_changes.len(), 2);

    assert_eq!(
        cell_refs(&fixture, fixture.gf),
        (vec!["soup-a".to_owned()], CellOrigin::Overridden)
    );
    assert_eq!(
        cell_refs(&fixture, fixture.diabetic),
        (vec!["soup-c".to_owned()], CellOrigin::Inherited)
    );
}

#[test]
fn test_stale_package_is_rejected() {
    let mut fixture = Fixture::new();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();
    fixture.package.touch();

    let result = apply_cell_change(&fixture.book, &mut fixture.package, &proposal, &BTreeSet::new());
    assert!(matches!(
        result,
        Err(PlanError::StaleWrite {
            expected: 0,
            actual: 1,
            ..
        })
    ));
    assert_eq!(
        cell_refs(&fixture, fixture.standard),
        (vec!["soup-a".to_owned()], CellOrigin::Owned)
    );
}

#[test]
fn test_diets_without_the_slot_are_left_out() {
    let mut fixture = Fixture::new();
    fixture.book.unlock_meal_structure(fixture.gf).unwrap();
    fixture
        .book
        .remove_meal_slot(fixture.gf, &MealSlotId::from(LUNCH))
        .unwrap();

    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();
    let ids: Vec<DietPlanId> = proposal.records.iter().map(|r| r.diet_id).collect();
    assert_eq!(ids, vec![fixture.diabetic]);
}

#[test]
fn test_archived_diets_are_left_out() {
    let mut fixture = Fixture::new();
    fixture.book.set_status(fixture.diabetic, PlanStatus::Archived).unwrap();

    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();
    let ids: Vec<DietPlanId> = proposal.records.iter().map(|r| r.diet_id).collect();
    assert_eq!(ids, vec![fixture.gf]);
}

#[test]
fn test_archived_diets_are_pinned_on_apply() {
    let mut fixture = Fixture::new();
    fixture.book.set_status(fixture.diabetic, PlanStatus::Archived).unwrap();

    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();
    let outcome = apply_cell_change(
        &fixture.book,
        &mut fixture.package,
        &proposal,
        &confirmed(&[fixture.diabetic]),
    )
    .unwrap();

    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.pinned, vec![fixture.diabetic, fixture.gf]);
    assert_eq!(
        cell_refs(&fixture, fixture.diabetic),
        (vec!["soup-a".to_owned()], CellOrigin::Overridden)
    );
    assert_eq!(
        cell_refs(&fixture, fixture.standard),
        (vec!["soup-c".to_owned()], CellOrigin::Owned)
    );
}

#[test]
fn test_diets_derived_after_the_proposal_are_pinned() {
    let mut fixture = Fixture::new();
    let proposal = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();

    let low_salt = DietPlan::new_derived("LOWSALT", "Low salt", fixture.standard);
    let low_salt_id = low_salt.id;
    fixture.book.insert(low_salt).unwrap();

    let outcome = apply_cell_change(
        &fixture.book,
        &mut fixture.package,
        &proposal,
        &confirmed(&[fixture.gf, low_salt_id]),
    )
    .unwrap();
    assert_eq!(outcome.applied, vec![fixture.gf]);
    assert!(outcome.pinned.contains(&low_salt_id));
    assert_eq!(
        cell_refs(&fixture, low_salt_id),
        (vec!["soup-a".to_owned()], CellOrigin::Overridden)
    );
    assert_eq!(
        cell_refs(&fixture, fixture.gf),
        (vec!["soup-c".to_owned()], CellOrigin::Inherited)
    );
}

#[test]
fn test_propagation_must_start_from_base() {
    let fixture = Fixture::new();
    let result = propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.gf,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    );
    assert!(matches!(result, Err(PlanError::InvalidBaseReference { .. })));
}

#[test]
fn test_proposal_does_not_mutate() {
    let fixture = Fixture::new();
    let package_before = fixture.package.clone();
    propose_cell_change(
        &fixture.book,
        &fixture.package,
        fixture.standard,
        &lunch_day_2(),
        vec![dish("soup-c")],
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(fixture.package, package_before);
}

// ============================================================================
// Goal propagation
// ============================================================================

#[test]
fn test_goal_change_respects_overrides_and_pins_unconfirmed() {
    let mut fixture = Fixture::new();
    fixture.book.toggle_goal_source(fixture.gf, "Sodium").unwrap();
    fixture
        .book
        .set_goal(fixture.gf, "Sodium", GoalRange::between(1500.0, 1900.0))
        .unwrap();

    let proposal = propose_goal_change(
        &fixture.book,
        fixture.standard,
        "sodium",
        GoalRange::between(1600.0, 2000.0),
    )
    .unwrap();
    assert_eq!(proposal.nutrient, "Sodium");
    assert_eq!(proposal.previous, Some(GoalRange::between(1800.0, 2200.0)));
    let gf = proposal.records.iter().find(|r| r.diet_id == fixture.gf).unwrap();
    assert_eq!(gf.classification, Classification::Override);

    let outcome = apply_goal_change(&mut fixture.book, &proposal, &BTreeSet::new()).unwrap();
    assert_eq!(outcome.skipped_overrides, vec![fixture.gf]);
    assert_eq!(outcome.pinned, vec![fixture.diabetic]);

    let diabetic = fixture.book.resolver(fixture.diabetic).unwrap().effective_goal("Sodium");
    assert_eq!(diabetic.source, GoalSource::Overridden);
    assert_eq!(diabetic.range, Some(GoalRange::between(1800.0, 2200.0)));
    let gf = fixture.book.resolver(fixture.gf).unwrap().effective_goal("Sodium");
    assert_eq!(gf.range, Some(GoalRange::between(1500.0, 1900.0)));
    let base = fixture.book.resolver(fixture.standard).unwrap().effective_goal("Sodium");
    assert_eq!(base.range, Some(GoalRange::between(1600.0, 2000.0)));
}

#[test]
fn test_confirmed_goal_change_is_inherited() {
    let mut fixture = Fixture::new();
    let proposal = propose_goal_change(
        &fixture.book,
        fixture.standard,
        "Sodium",
        GoalRange::between(1600.0, 2000.0),
    )
    .unwrap();

    let outcome = apply_goal_change(
        &mut fixture.book,
        &proposal,
        &confirmed(&[fixture.gf, fixture.diabetic]),
    )
    .unwrap();
    assert_eq!(outcome.applied.len(), 2);

    let gf = fixture.book.resolver(fixture.gf).unwrap().effective_goal("Sodium");
    assert_eq!(gf.source, GoalSource::Inherited);
    assert_eq!(gf.range, Some(GoalRange::between(1600.0, 2000.0)));
}

#[test]
fn test_archived_diet_keeps_previous_goal() {
    let mut fixture = Fixture::new();
    fixture.book.set_status(fixture.diabetic, PlanStatus::Archived).unwrap();

    let proposal = propose_goal_change(
        &fixture.book,
        fixture.standard,
        "Sodium",
        GoalRange::between(1600.0, 2000.0),
    )
    .unwrap();
    assert!(proposal.records.iter().all(|r| r.diet_id != fixture.diabetic));

    let outcome = apply_goal_change(&mut fixture.book, &proposal, &confirmed(&[fixture.gf])).unwrap();
    assert_eq!(outcome.applied, vec![fixture.gf]);
    assert_eq!(outcome.pinned, vec![fixture.diabetic]);

    let diabetic = fixture.book.resolver(fixture.diabetic).unwrap().effective_goal("Sodium");
    assert_eq!(diabetic.source, GoalSource::Overridden);
    assert_eq!(diabetic.range, Some(GoalRange::between(1800.0, 2200.0)));
}

#[test]
fn test_goal_proposal_rejects_inverted_range() {
    let fixture = Fixture::new();
    let result = propose_goal_change(
        &fixture.book,
        fixture.standard,
        "Sodium",
        GoalRange::between(2000.0, 1000.0),
    );
    assert!(matches!(result, Err(PlanError::InvalidInput(_))));
}

// ============================================================================
// Exclusion propagation
// ============================================================================

#[test]
fn test_exclusion_conflicts_with_own_cells() {
    let mut fixture = Fixture::new();
    override_gf_lunch(&mut fixture, "soup-c");

    let proposal = propose_exclusion_change(
        &fixture.book,
        &[&fixture.package],
        fixture.standard,
        Exclusion::new(ExclusionCategory::Allergen, "celery"),
    )
    .unwrap();

    let gf = proposal.records.iter().find(|r| r.diet_id == fixture.gf).unwrap();
    assert_eq!(gf.classification, Classification::Conflict);
    assert!(gf.note.contains("w0/d2/lunch"));
    let diabetic = proposal.records.iter().find(|r| r.diet_id == fixture.diabetic).unwrap();
    assert_eq!(diabetic.classification, Classification::Compatible);
}

fn has_active(fixture: &Fixture, plan: DietPlanId, name: &str) -> bool {
    fixture
        .book
        .resolver(plan)
        .unwrap()
        .active_exclusions()
        .iter()
        .any(|e| e.name == name)
}

#[test]
fn test_unconfirmed_exclusion_reaches_no_diet() {
    let mut fixture = Fixture::new();
    override_gf_lunch(&mut fixture, "pudding");
    let mut diabetic = fixture.book.get(fixture.diabetic).unwrap().clone();
    let mut local = Exclusion::new(ExclusionCategory::Allergen, "milk");
    local.active = false;
    diabetic.exclusions.push(local);
    fixture.book.put(diabetic);

    let proposal = propose_exclusion_change(
        &fixture.book,
        &[&fixture.package],
        fixture.standard,
        Exclusion::new(ExclusionCategory::Allergen, "milk"),
    )
    .unwrap();
    let gf = proposal.records.iter().find(|r| r.diet_id == fixture.gf).unwrap();
    assert_eq!(gf.classification, Classification::Conflict);

    let outcome = apply_exclusion_change(&mut fixture.book, &proposal, &BTreeSet::new()).unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.pinned, vec![fixture.gf]);
    assert_eq!(outcome.skipped_overrides, vec![fixture.diabetic]);

    assert!(has_active(&fixture, fixture.standard, "MILK"));
    assert!(!has_active(&fixture, fixture.gf, "MILK"));
    assert!(!has_active(&fixture, fixture.diabetic, "MILK"));
    assert!(has_active(&fixture, fixture.gf, "GLUTEN"));
    assert!(fixture.book.get(fixture.gf).unwrap().exclusions_unlocked);
}

#[test]
fn test_confirmed_exclusion_reaches_locked_diet() {
    let mut fixture = Fixture::new();
    fixture.book.unlock_exclusions(fixture.diabetic).unwrap();

    let proposal = propose_exclusion_change(
        &fixture.book,
        &[&fixture.package],
        fixture.standard,
        Exclusion::new(ExclusionCategory::Allergen, "sesame"),
    )
    .unwrap();
    let outcome = apply_exclusion_change(&mut fixture.book, &proposal, &confirmed(&[fixture.gf])).unwrap();
    assert_eq!(outcome.applied, vec![fixture.gf]);
    assert_eq!(outcome.pinned, vec![fixture.diabetic]);

    assert!(has_active(&fixture, fixture.gf, "SESAME"));
    assert!(!fixture.book.get(fixture.gf).unwrap().exclusions_unlocked);
    assert!(!has_active(&fixture, fixture.diabetic, "SESAME"));
}

#[test]
fn test_deactivated_copy_is_override() {
    let mut fixture = Fixture::new();
    let mut diabetic = fixture.book.get(fixture.diabetic).unwrap().clone();
    let mut local = Exclusion::new(ExclusionCategory::Allergen, "milk");
    local.active = false;
    diabetic.exclusions.push(local);
    fixture.book.put(diabetic);

    let proposal = propose_exclusion_change(
        &fixture.book,
        &[&fixture.package],
        fixture.standard,
        Exclusion::new(ExclusionCategory::Allergen, "milk"),
    )
    .unwrap();
    let diabetic = proposal.records.iter().find(|r| r.diet_id == fixture.diabetic).unwrap();
    assert_eq!(diabetic.classification, Classification::Override);

    let outcome = apply_exclusion_change(&mut fixture.book, &proposal, &confirmed(&[fixture.diabetic])).unwrap();
    assert_eq!(outcome.skipped_overrides, vec![fixture.diabetic]);
    assert!(!has_active(&fixture, fixture.diabetic, "MILK"));
}

#[test]
fn test_existing_base_exclusion_is_rejected() {
    let mut fixture = Fixture::new();
    fixture
        .book
        .add_exclusion(fixture.standard, ExclusionCategory::Allergen, "fish")
        .unwrap();

    let result = propose_exclusion_change(
        &fixture.book,
        &[&fixture.package],
        fixture.standard,
        Exclusion::new(ExclusionCategory::Allergen, "FISH"),
    );
    assert!(matches!(result, Err(PlanError::InvalidInput(_))));
}

// ABOUTME: Criterion benchmarks for the diet inheritance and menu composition engine
// ABOUTME: Measures resolution, period aggregation, propagation proposals and service writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Nutriplan Contributors

//! Criterion benchmarks for the planning engine.
//!
//! Scenarios use a base diet with a fully planned four-week cycle and a
//! varying number of derived diets, a third of which override their lunches.

#![allow(
    clippy::missing_docs_in_private_items,
    clippy::unwrap_used,
    dead_code,
    missing_docs
)]

mod common;

use common::fixtures::{scenario, DietCount};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nutriplan::engine::aggregator;
use nutriplan::engine::audit::MemoryAuditSink;
use nutriplan::engine::grid::DietGrid;
use nutriplan::engine::propagation;
use nutriplan::engine::EngineConfig;
use nutriplan::models::CellAddress;
use nutriplan::services::{PlanningService, PlanningSnapshot};
use std::collections::BTreeSet;
use std::sync::Arc;

const SIZES: [DietCount; 2] = [DietCount::Small, DietCount::Large];

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for size in SIZES {
        let fixture = scenario(size);
        group.throughput(Throughput::Elements(size.count() as u64));
        group.bench_with_input(BenchmarkId::new("effective_goals", size.name()), &fixture, |b, fixture| {
            b.iter(|| {
                for id in &fixture.derived {
                    let resolver = fixture.book.resolver(*id).unwrap();
                    black_box(resolver.effective_goals());
                    black_box(resolver.effective_exclusions());
                }
            });
        });
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    let fixture = scenario(DietCount::Small);
    let config = EngineConfig::default();

    for (label, id) in [("base", fixture.base), ("derived", fixture.derived[0])] {
        let resolver = fixture.book.resolver(id).unwrap();
        let grid = DietGrid::new(&fixture.package, resolver).unwrap();
        let days = grid.days();

        group.bench_function(BenchmarkId::new("period_average", label), |b| {
            b.iter(|| black_box(aggregator::period_average(&grid, black_box(&days)).unwrap()));
        });
        group.bench_function(BenchmarkId::new("week_adherence", label), |b| {
            b.iter(|| {
                let week = aggregator::week_average(&grid, 0).unwrap();
                black_box(aggregator::goal_adherence(&resolver, &week, &config))
            });
        });
    }

    group.finish();
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    let config = EngineConfig::default();
    let address = CellAddress::new(0, 2, "lunch");

    for size in SIZES {
        let fixture = scenario(size);
        let replacement = fixture.package.view(fixture.base).unwrap().stored(&CellAddress::new(1, 4, "dinner")).unwrap().dishes.clone();
        group.throughput(Throughput::Elements(size.count() as u64));

        group.bench_with_input(BenchmarkId::new("propose_cell_change", size.name()), &fixture, |b, fixture| {
            b.iter(|| {
                black_box(
                    propagation::propose_cell_change(
                        &fixture.book,
                        &fixture.package,
                        fixture.base,
                        &address,
                        replacement.clone(),
                        &config,
                    )
                    .unwrap(),
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("apply_cell_change", size.name()), &fixture, |b, fixture| {
            let proposal = propagation::propose_cell_change(
                &fixture.book,
                &fixture.package,
                fixture.base,
                &address,
                replacement.clone(),
                &config,
            )
            .unwrap();
            let confirmed: BTreeSet<_> = fixture.derived.iter().step_by(2).copied().collect();
            b.iter(|| {
                let mut package = fixture.package.clone();
                black_box(propagation::apply_cell_change(&fixture.book, &mut package, &proposal, &confirmed).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_service_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("service");
    let fixture = scenario(DietCount::Large);
    let address = CellAddress::new(2, 3, "snack");
    let dishes = fixture.package.view(fixture.base).unwrap().stored(&address).unwrap().dishes.clone();
    let snapshot = PlanningSnapshot {
        plans: fixture.book.plans().cloned().collect(),
        packages: vec![fixture.package.clone()],
        catalog: fixture.catalog.clone(),
    };
    let service = PlanningService::from_snapshot(
        snapshot,
        Arc::new(MemoryAuditSink::new()),
        EngineConfig::default(),
        "bench",
    )
    .unwrap();
    let package_id = fixture.package.id;
    let diet = fixture.derived[1];

    group.bench_function("write_cell", |b| {
        b.iter(|| {
            let version = service.package(package_id).unwrap().version;
            black_box(
                service
                    .write_cell(package_id, version, diet, &address, dishes.clone())
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_resolution,
    bench_aggregation,
    bench_propagation,
    bench_service_writes,
);
criterion_main!(benches);

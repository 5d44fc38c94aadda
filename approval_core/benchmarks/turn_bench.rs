use std::collections::BTreeMap;
use std::sync::Arc;

use approval_core::{
    build_headless_app, run_turn, ActorId, ActorProfile, ApprovalConfig, ApprovalEngine,
    PoliticalCube, PoliticalPosition, PolicyId, PolicyProposal, SegmentRegistry, VoteRole,
};
use approval_schema::{
    ClassTier, CubeState, Gender, Issue, PositionState, PropertyStatus, SegmentRecord,
    SettlementKind,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn generated_registry(count: u32) -> Arc<SegmentRegistry> {
    let mut rng = SmallRng::seed_from_u64(7);
    let records: Vec<SegmentRecord> = (0..count)
        .map(|id| {
            let mut issues = BTreeMap::new();
            let mut salience = BTreeMap::new();
            for issue in Issue::ALL.iter().step_by(3) {
                issues.insert(*issue, rng.gen_range(-10.0..=10.0));
                salience.insert(*issue, rng.gen_range(0.0..=0.8));
            }
            SegmentRecord {
                id,
                population: rng.gen_range(500..50_000),
                region: format!("region-{}", id % 12),
                settlement: SettlementKind::Urban,
                occupation: "worker".to_string(),
                class_tier: ClassTier::Working,
                property: PropertyStatus::Renter,
                gender: Gender::Other,
                ethnicity: "mixed".to_string(),
                religion: "none".to_string(),
                voting_eligible: id % 5 != 0,
                default_position: PositionState {
                    cube: CubeState {
                        economic: rng.gen_range(-10.0..=10.0),
                        authority: rng.gen_range(-10.0..=10.0),
                        social: rng.gen_range(-10.0..=10.0),
                    },
                    issues,
                },
                salience,
            }
        })
        .collect();
    Arc::new(SegmentRegistry::from_records(&records).expect("generated segments are valid"))
}

fn engine_with_scores(registry: Arc<SegmentRegistry>, actors: u32) -> Arc<ApprovalEngine> {
    let engine = ApprovalEngine::new(registry, ApprovalConfig::builtin());
    for actor in 0..actors {
        engine
            .initialize_actor(ActorProfile::new(ActorId(actor)), 40.0 + actor as f32 * 5.0)
            .expect("fresh actor");
    }
    Arc::new(engine)
}

fn bench_decay_turn(c: &mut Criterion) {
    let mut group = c.benchmark_group("turn");

    for size in [1_000u32, 5_000, 20_000] {
        let registry = generated_registry(size);
        group.bench_with_input(BenchmarkId::new("decay", size), &size, |b, _| {
            b.iter_batched(
                || build_headless_app(engine_with_scores(Arc::clone(&registry), 4)),
                |mut app| {
                    run_turn(&mut app);
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_policy_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy");
    let policy = PolicyProposal::new(
        PolicyId(1),
        PoliticalPosition::new(PoliticalCube::new(2.0, -3.0, 4.0).expect("cube"))
            .with_issue(Issue::Healthcare, 6.0)
            .expect("issue"),
    );

    for size in [1_000u32, 5_000, 20_000] {
        let registry = generated_registry(size);
        let engine = engine_with_scores(Arc::clone(&registry), 1);
        let mut turn = 0u64;
        group.bench_with_input(BenchmarkId::new("fan_out", size), &size, |b, _| {
            b.iter(|| {
                turn += 1;
                engine
                    .apply_policy_impact(ActorId(0), &policy, VoteRole::Yes, turn)
                    .expect("registered actor")
            })
        });
    }

    group.finish();
}

criterion_group!(approval_benches, bench_decay_turn, bench_policy_fan_out);
criterion_main!(approval_benches);

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use hwboard::{
    core::allocation::{DayBoundary, MalformedSchedule, Planner},
    engine::Engine,
    model::{Assignment, AssignmentConfig, ProgressDelta, Subject, SubjectConfig},
    persist::{Store, memory::MemoryStore, sqlite::SqliteStore},
};

fn subject() -> Subject {
    Subject {
        id: "cs".into(),
        name: "Computing".into(),
        color: "#222".into(),
        config: SubjectConfig::default(),
    }
}

fn assignment(i: u64, days: i64) -> Assignment {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::hours(i as i64);
    Assignment {
        id: format!("a{i}"),
        subject: subject(),
        created,
        deadline: created + Duration::days(days),
        estimated: 240,
        spent: 0,
        title: format!("task {i}"),
        description: String::new(),
        priority: 0,
        config: AssignmentConfig::default(),
        submissions: None,
        total_required_submissions: None,
        tags: None,
    }
}

fn board<S: Store + 'static>(store: S) -> Engine<S> {
    let mut engine =
        Engine::new(store).with_planner(Planner::new(DayBoundary::utc(), MalformedSchedule::Clamp));
    engine.add_subject(&subject()).expect("subject");
    engine
}

fn bench_apply_undo(c: &mut Criterion) {
    c.bench_function("memory_create_undo_redo_1k", |b| {
        b.iter(|| {
            let mut engine = board(MemoryStore::new());
            for i in 0..1_000u64 {
                let id = engine.create_assignment(assignment(i, 3), "create").expect("create");
                engine.undo(&id).expect("undo");
                engine.redo(&id).expect("redo");
            }
        });
    });

    c.bench_function("sqlite_progress_1k", |b| {
        b.iter(|| {
            let mut engine = board(SqliteStore::open_in_memory().expect("sqlite"));
            engine.create_assignment(assignment(0, 3), "create").expect("create");
            for _ in 0..1_000 {
                engine
                    .finish_progress(vec![ProgressDelta::new(1, "a0")], "tick")
                    .expect("progress");
            }
        });
    });
}

fn bench_planning(c: &mut Criterion) {
    let planner = Planner::new(DayBoundary::utc(), MalformedSchedule::Clamp);
    let mut group = c.benchmark_group("plan_days");
    for days in [1i64, 14, 120] {
        let a = assignment(0, days);
        group.bench_with_input(BenchmarkId::from_parameter(days), &a, |b, a| {
            b.iter(|| planner.plan(a).expect("plan"));
        });
    }
    group.finish();
}

fn bench_linear_toggle(c: &mut Criterion) {
    c.bench_function("toggle_oldest_of_200", |b| {
        let mut engine = board(MemoryStore::new());
        engine.create_assignment(assignment(0, 2), "create").expect("create");
        let oldest = engine
            .finish_progress(vec![ProgressDelta::new(1, "a0")], "tick")
            .expect("progress");
        for _ in 0..199 {
            engine
                .finish_progress(vec![ProgressDelta::new(1, "a0")], "tick")
                .expect("progress");
        }
        b.iter(|| engine.toggle_linear(&oldest).expect("toggle"));
    });
}

criterion_group!(benches, bench_apply_undo, bench_planning, bench_linear_toggle);
criterion_main!(benches);

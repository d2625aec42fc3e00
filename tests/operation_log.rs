use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use hwboard::{
    core::{
        allocation::{DayBoundary, MalformedSchedule, Planner},
        registry::Registry,
        sanitize::{sanitize, to_millis},
    },
    engine::{Engine, EngineError},
    events::ChangeBus,
    model::{
        Assignment, AssignmentConfig, AssignmentPreset, AssignmentRef, ProgressDelta, Student,
        Subject, SubjectConfig, Submission,
    },
    op::{Changes, LogQuery, NewLogEntry, OperationKind, PayloadKind},
    persist::{Store, StoreError, memory::MemoryStore, sqlite::SqliteStore},
};

fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn math() -> Subject {
    Subject {
        id: "math".into(),
        name: "Math".into(),
        color: "#00f".into(),
        config: SubjectConfig {
            assignment_presets: vec![AssignmentPreset {
                name: "Drill".into(),
                description: "page of problems".into(),
                duration: 1,
                estimated: 30,
                priority: 0,
            }],
        },
    }
}

fn assignment(id: &str, created: DateTime<Utc>, deadline: DateTime<Utc>, estimated: i64) -> Assignment {
    Assignment {
        id: id.into(),
        subject: math(),
        created,
        deadline,
        estimated,
        spent: 0,
        title: format!("Assignment {id}"),
        description: String::new(),
        priority: 1,
        config: AssignmentConfig::default(),
        submissions: None,
        total_required_submissions: None,
        tags: None,
    }
}

fn ada() -> Student {
    Student {
        id: "st1".into(),
        name: "Ada".into(),
        group: "7b".into(),
    }
}

/// Engine on a UTC calendar whose clock advances one minute per entry.
fn board<S: Store + 'static>(store: S) -> Engine<S> {
    let tick = Arc::new(AtomicI64::new(0));
    let mut engine = Engine::with_parts(
        store,
        Registry::standard(),
        ChangeBus::new(),
        Planner::new(DayBoundary::utc(), MalformedSchedule::Clamp),
    )
    .with_clock(move || at(1, 0) + Duration::minutes(tick.fetch_add(1, Ordering::SeqCst)));
    engine.add_subject(&math()).unwrap();
    engine.add_student(&ada()).unwrap();
    engine
}

fn takens<S: Store + 'static>(engine: &Engine<S>, id: &str) -> Vec<(NaiveDate, f64)> {
    engine
        .store()
        .day_allocations_for(id)
        .unwrap()
        .into_iter()
        .map(|row| (row.date, row.taken))
        .collect()
}

fn spent<S: Store + 'static>(engine: &Engine<S>, id: &str) -> i64 {
    engine.store().assignment(id).unwrap().unwrap().spent
}

macro_rules! on_both_backends {
    ($($name:ident => $body:ident;)*) => {
        mod memory_backend {
            use super::*;
            $(#[test] fn $name() { $body(board(MemoryStore::new())); })*
        }
        mod sqlite_backend {
            use super::*;
            $(#[test] fn $name() { $body(board(SqliteStore::open_in_memory().unwrap())); })*
        }
    };
}

on_both_backends! {
    create_splits_evenly_and_undo_redo_round_trips => create_undo_redo;
    modify_reallocates_and_undo_restores => modify_then_undo;
    remove_and_revert_single_day_assignment => remove_then_undo;
    progress_batches_and_rolls_back_together => progress_batches;
    submission_payload_is_stripped_in_the_log => submission_logging;
    list_orders_pages_and_filters => list_filters;
    linear_toggle_preserves_later_entries => linear_toggle;
    linear_toggle_that_cannot_replay_changes_nothing => linear_toggle_rollback;
    compaction_rewrites_rich_rows_once => compaction;
    active_rows_hold_inverse_payloads => payload_kinds_follow_state;
    undo_redo_cycles_keep_identity_and_forward_payload => identity_cycles;
}

fn create_undo_redo<S: Store + 'static>(mut engine: Engine<S>) {
    let log = engine
        .create_assignment(assignment("a1", at(1, 0), at(3, 0), 120), "create a1")
        .unwrap();
    assert_eq!(takens(&engine, "a1"), vec![(day(1), 40.0), (day(2), 40.0), (day(3), 40.0)]);

    assert!(engine.undo(&log).unwrap());
    assert!(engine.get_assignment("a1").unwrap().is_none());
    assert!(takens(&engine, "a1").is_empty());
    assert!(engine.get_log(&log).unwrap().unwrap().reverted);

    assert!(engine.redo(&log).unwrap());
    assert_eq!(takens(&engine, "a1").len(), 3);
    let restored = engine.get_assignment("a1").unwrap().unwrap();
    assert_eq!(restored.estimated, 120);
    assert_eq!(restored.subject.config, math().config);
}

fn modify_then_undo<S: Store + 'static>(mut engine: Engine<S>) {
    engine
        .create_assignment(assignment("a1", at(1, 0), at(3, 0), 120), "create")
        .unwrap();
    let log = engine
        .modify_assignment(assignment("a1", at(1, 0), at(3, 0), 90), "shorter")
        .unwrap();
    assert!(takens(&engine, "a1").iter().all(|(_, taken)| *taken == 30.0));

    assert!(engine.undo(&log).unwrap());
    assert!(takens(&engine, "a1").iter().all(|(_, taken)| *taken == 40.0));
    assert_eq!(engine.get_assignment("a1").unwrap().unwrap().estimated, 120);

    let missing = engine.modify_assignment(assignment("ghost", at(1, 0), at(2, 0), 10), "nope");
    assert!(matches!(
        missing,
        Err(EngineError::Store(StoreError::NotFound { .. }))
    ));
}

fn remove_then_undo<S: Store + 'static>(mut engine: Engine<S>) {
    engine
        .create_assignment(assignment("a1", at(5, 8), at(5, 17), 45), "create")
        .unwrap();
    let log = engine.remove_assignment("a1", "drop").unwrap();
    assert!(engine.get_assignment("a1").unwrap().is_none());
    assert!(engine.day_allocations(day(5), day(5)).unwrap().is_empty());

    assert!(engine.undo(&log).unwrap());
    let days = engine.day_allocations(day(5), day(5)).unwrap();
    assert_eq!(days[&day(5)].len(), 1);
    assert_eq!(days[&day(5)][0].taken, 45.0);
    let entry = engine.get_log(&log).unwrap().unwrap();
    assert_eq!(entry.payload_kind, PayloadKind::AssignmentId);
    assert_eq!(entry.changes, "\"a1\"");
}

fn progress_batches<S: Store + 'static>(mut engine: Engine<S>) {
    engine
        .create_assignment(assignment("a1", at(1, 0), at(2, 0), 60), "a1")
        .unwrap();
    engine
        .create_assignment(assignment("a2", at(1, 0), at(2, 0), 60), "a2")
        .unwrap();
    let log = engine
        .finish_progress(
            vec![ProgressDelta::new(15, "a1"), ProgressDelta::new(25, "a2")],
            "study session",
        )
        .unwrap();
    assert_eq!((spent(&engine, "a1"), spent(&engine, "a2")), (15, 25));

    let failed = engine.finish_progress(
        vec![ProgressDelta::new(5, "a1"), ProgressDelta::new(5, "ghost")],
        "partial",
    );
    assert!(failed.is_err());
    assert_eq!(spent(&engine, "a1"), 15);
    assert_eq!(engine.list(&LogQuery::page(10, 0)).unwrap().len(), 3);

    assert!(engine.undo(&log).unwrap());
    assert_eq!((spent(&engine, "a1"), spent(&engine, "a2")), (0, 0));
}

fn submission_logging<S: Store + 'static>(mut engine: Engine<S>) {
    let a1 = assignment("a1", at(1, 0), at(2, 0), 60);
    engine.create_assignment(a1.clone(), "a1").unwrap();
    let log = engine
        .create_submission(
            Submission {
                id: "sub1".into(),
                assignment: AssignmentRef::from(a1),
                student: ada(),
                created: at(2, 0),
                spent: Some(55),
                feedback: Some("neat".into()),
            },
            "hand in",
        )
        .unwrap();

    let entry = engine.get_log(&log).unwrap().unwrap();
    let Changes::Submission(logged) = entry.decode_changes().unwrap() else {
        panic!("expected a submission payload");
    };
    assert_eq!(logged.assignment, AssignmentRef::Id { id: "a1".into() });
    assert_eq!(engine.submissions_for_student("st1").unwrap().len(), 1);

    assert!(engine.undo(&log).unwrap());
    assert!(engine.submissions_for_student("st1").unwrap().is_empty());
    assert!(engine.redo(&log).unwrap());
    assert_eq!(
        engine.get_assignment("a1").unwrap().unwrap().submissions.map(|s| s.len()),
        Some(1)
    );
}

fn list_filters<S: Store + 'static>(mut engine: Engine<S>) {
    let mut ids = Vec::new();
    for (i, text) in ["Create Essay", "create essay", "100% done", "Essay notes"].iter().enumerate() {
        let id = format!("a{i}");
        ids.push(
            engine
                .create_assignment(assignment(&id, at(1, 0), at(2, 0), 10), *text)
                .unwrap(),
        );
    }

    let all = engine.list(&LogQuery::page(10, 0)).unwrap();
    let newest_first: Vec<_> = all.iter().map(|e| e.id.clone()).rev().collect();
    assert_eq!(newest_first, ids);

    let page = engine.list(&LogQuery::page(2, 1)).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[2]);

    assert_eq!(engine.list(&LogQuery::page(10, 0).containing("Essay")).unwrap().len(), 2);
    assert_eq!(engine.list(&LogQuery::page(10, 0).containing("%")).unwrap().len(), 1);
    assert!(engine.list(&LogQuery::page(10, 0).containing("_")).unwrap().is_empty());

    let recent = engine
        .list(&LogQuery::page(10, 0).since(at(1, 0) + Duration::minutes(2)))
        .unwrap();
    assert_eq!(recent.len(), 2);
}

fn linear_toggle<S: Store + 'static>(mut engine: Engine<S>) {
    engine
        .create_assignment(assignment("a1", at(1, 0), at(2, 0), 60), "a1")
        .unwrap();
    engine
        .create_assignment(assignment("a2", at(1, 0), at(2, 0), 60), "a2")
        .unwrap();
    let first = engine.finish_progress(vec![ProgressDelta::new(10, "a1")], "p1").unwrap();
    engine.finish_progress(vec![ProgressDelta::new(5, "a2")], "p2").unwrap();
    engine.finish_progress(vec![ProgressDelta::new(20, "a1")], "p3").unwrap();

    let before = engine.bus().revision();
    assert!(engine.toggle_linear(&first).unwrap());
    assert_eq!(engine.bus().revision(), before + 1);
    assert_eq!((spent(&engine, "a1"), spent(&engine, "a2")), (20, 5));

    let log = engine.list(&LogQuery::page(10, 0)).unwrap();
    for entry in &log {
        assert_eq!(entry.reverted, entry.id == first, "{}", entry.description);
    }

    assert!(engine.toggle_linear(&first).unwrap());
    assert_eq!(spent(&engine, "a1"), 30);
    assert!(!engine.toggle_linear("missing").unwrap());
}

fn linear_toggle_rollback<S: Store + 'static>(mut engine: Engine<S>) {
    let create = engine
        .create_assignment(assignment("a1", at(1, 0), at(2, 0), 60), "a1")
        .unwrap();
    engine.finish_progress(vec![ProgressDelta::new(10, "a1")], "p1").unwrap();
    let snapshot = engine.list(&LogQuery::page(10, 0)).unwrap();

    // Replaying the progress entry needs a1, which the toggle would remove.
    assert!(engine.toggle_linear(&create).is_err());
    assert_eq!(engine.list(&LogQuery::page(10, 0)).unwrap(), snapshot);
    assert_eq!(spent(&engine, "a1"), 10);
}

fn compaction<S: Store + 'static>(mut engine: Engine<S>) {
    let mut rich = assignment("a9", at(1, 0), at(2, 0), 30);
    rich.submissions = Some(Vec::new());
    rich.total_required_submissions = Some(28);
    let stored = engine
        .store_mut()
        .insert_log(&NewLogEntry {
            id: "legacy".into(),
            description: "imported".into(),
            created: at(1, 0),
            kind: OperationKind::CreateAssignment,
            payload_kind: PayloadKind::Assignment,
            changes: Changes::Assignment(rich).encode().unwrap(),
            reverted: true,
        })
        .unwrap();

    assert_eq!(engine.compact_log().unwrap(), 1);
    assert_eq!(engine.compact_log().unwrap(), 0);
    let entry = engine.get_log(&stored.id).unwrap().unwrap();
    assert!(entry.reverted);
    assert!(!entry.changes.contains("totalRequiredSubmissions"));
    assert!(!entry.changes.contains("Drill"));

    assert!(engine.redo("legacy").unwrap());
    assert_eq!(takens(&engine, "a9").len(), 2);
}

fn payload_kinds_follow_state<S: Store + 'static>(mut engine: Engine<S>) {
    engine
        .create_assignment(assignment("a1", at(1, 0), at(2, 0), 60), "a1")
        .unwrap();
    let remove = engine.remove_assignment("a1", "rm").unwrap();
    let entry = engine.get_log(&remove).unwrap().unwrap();
    assert_eq!(entry.payload_kind, PayloadKind::Assignment);

    engine.undo(&remove).unwrap();
    let entry = engine.get_log(&remove).unwrap().unwrap();
    assert_eq!(entry.payload_kind, PayloadKind::AssignmentId);

    for entry in engine.list(&LogQuery::page(10, 0)).unwrap() {
        assert_eq!(entry.payload_kind, entry.kind.payload_kind(entry.reverted));
    }
}

fn identity_cycles<S: Store + 'static>(mut engine: Engine<S>) {
    let fine = Duration::nanoseconds(123_456_789);
    let mut a1 = assignment("a1", at(1, 8) + fine, at(3, 8) + fine, 90);
    a1.tags = Some(Vec::new());
    let mut a1_edit = a1.clone();
    a1_edit.estimated = 45;
    a1_edit.title = "Shorter".into();
    let submission = Submission {
        id: "sub1".into(),
        assignment: AssignmentRef::from(a1.clone()),
        student: ada(),
        created: at(2, 9) + fine,
        spent: Some(20),
        feedback: None,
    };
    let a2 = assignment("a2", at(4, 8), at(4, 9), 10);

    let steps = vec![
        (OperationKind::CreateAssignment, Changes::Assignment(a1.clone())),
        (OperationKind::ModifyAssignment, Changes::Assignment(a1_edit)),
        (OperationKind::CreateSubmission, Changes::Submission(submission)),
        (
            OperationKind::FinishProgress,
            Changes::Progress(vec![ProgressDelta::new(15, "a1")]),
        ),
        (OperationKind::CreateAssignment, Changes::Assignment(a2)),
        (OperationKind::RemoveAssignment, Changes::AssignmentId("a2".into())),
    ];
    let mut logged = Vec::new();
    for (kind, changes) in steps {
        let id = engine.apply(kind, changes.clone(), kind.as_str()).unwrap();
        let entry = engine.get_log(&id).unwrap().unwrap();
        logged.push((entry, sanitize(changes)));
    }

    let stored = engine.store().assignment("a1").unwrap().unwrap();
    assert_eq!(stored.created, to_millis(a1.created));
    assert_eq!(stored.deadline, to_millis(a1.deadline));

    let first = &logged[0].0;
    let since = engine
        .list(&LogQuery::page(10, 0).since(first.created + Duration::microseconds(500)))
        .unwrap();
    assert_eq!(since.len(), logged.len());

    for (original, forward) in logged.iter().rev() {
        for step in ["undo", "redo", "undo"] {
            let changed = match step {
                "undo" => engine.undo(&original.id).unwrap(),
                _ => engine.redo(&original.id).unwrap(),
            };
            assert!(changed, "{step} of {}", original.kind);

            let now = engine.get_log(&original.id).unwrap().unwrap();
            assert_eq!(
                (now.seq, &now.id, now.kind, now.created),
                (original.seq, &original.id, original.kind, original.created)
            );
            assert_eq!(now.payload_kind, now.kind.payload_kind(now.reverted));
            if now.reverted {
                assert_eq!(&now.decode_changes().unwrap(), forward, "{}", now.kind);
            }
        }
    }

    assert!(engine.store().assignment("a1").unwrap().is_none());
    assert!(engine.store().assignment("a2").unwrap().is_none());
    assert!(engine.submissions_for_student("st1").unwrap().is_empty());
}

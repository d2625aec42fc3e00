use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use hwboard::{
    config::BoardConfig,
    engine::Engine,
    model::{Assignment, AssignmentConfig, ProgressDelta, Student, Subject, SubjectConfig, Tag},
    op::LogQuery,
    persist::{Store, StoreError, sqlite::SqliteStore},
};

fn history() -> Subject {
    Subject {
        id: "hist".into(),
        name: "History".into(),
        color: "#a52".into(),
        config: SubjectConfig::default(),
    }
}

fn essay() -> Assignment {
    Assignment {
        id: "essay".into(),
        subject: history(),
        created: Utc.with_ymd_and_hms(2024, 9, 2, 7, 30, 0).unwrap(),
        deadline: Utc.with_ymd_and_hms(2024, 9, 5, 18, 0, 0).unwrap(),
        estimated: 200,
        spent: 0,
        title: "Causes of the war".into(),
        description: "two pages".into(),
        priority: 3,
        config: AssignmentConfig {
            tags: vec!["writing".into()],
        },
        submissions: None,
        total_required_submissions: None,
        tags: None,
    }
}

fn utc_config(path: std::path::PathBuf) -> BoardConfig {
    let mut config = BoardConfig::default();
    config.store.path = path;
    config.calendar.utc_offset_minutes = Some(0);
    config
}

#[test]
fn log_and_rows_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let config = utc_config(dir.path().join("board.db"));

    let (create, progress) = {
        let mut engine = config.open_engine().expect("open");
        engine.add_subject(&history()).expect("subject");
        engine
            .add_tag(&Tag {
                id: "writing".into(),
                name: "Writing".into(),
                color: "#111".into(),
            })
            .expect("tag");
        let create = engine.create_assignment(essay(), "create essay").expect("create");
        let progress = engine
            .finish_progress(vec![ProgressDelta::new(50, "essay")], "first draft")
            .expect("progress");
        assert!(engine.undo(&progress).expect("undo"));
        (create, progress)
    };

    let mut engine = config.open_engine().expect("reopen");
    let log = engine.list(&LogQuery::page(10, 0)).expect("list");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].id, progress);
    assert!(log[0].reverted);
    assert_eq!(log[1].id, create);
    assert!(!log[1].reverted);

    let essay = engine.get_assignment("essay").expect("get").expect("present");
    assert_eq!(essay.spent, 0);
    assert_eq!(essay.tags.expect("tags")[0].name, "Writing");
    assert_eq!(engine.store().day_allocations_for("essay").expect("days").len(), 4);

    assert!(engine.redo(&progress).expect("redo"));
    assert_eq!(engine.get_assignment("essay").expect("get").expect("present").spent, 50);
}

#[test]
fn connection_runs_with_wal_and_foreign_keys() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("pragmas.db")).expect("open");
    let conn = store.connection();
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .expect("journal_mode");
    assert_eq!(mode.to_lowercase(), "wal");
    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .expect("foreign_keys");
    assert_eq!(fk, 1);
}

#[test]
fn referential_rules_hold_on_disk() {
    let dir = tempdir().expect("tempdir");
    let mut engine = Engine::new(SqliteStore::open(dir.path().join("fk.db")).expect("open"));

    let orphan = engine.create_assignment(essay(), "no subject yet");
    assert!(orphan.is_err());
    assert!(engine.list(&LogQuery::page(10, 0)).expect("list").is_empty());

    engine.add_subject(&history()).expect("subject");
    engine
        .add_student(&Student {
            id: "s1".into(),
            name: "Lin".into(),
            group: "9".into(),
        })
        .expect("student");
    assert!(matches!(
        engine.store_mut().insert_subject(&history()),
        Err(StoreError::Conflict { .. })
    ));

    engine.create_assignment(essay(), "create").expect("create");
    assert!(engine.remove_subject("hist").expect("remove"));
    assert!(engine.get_assignment("essay").expect("get").is_none());
    assert!(engine.store().day_allocations_for("essay").expect("days").is_empty());
}

//! Homework board with a reversible, audited operation log.
//!
//! Assignments, submissions and progress are mutated only through logged
//! operations that can be undone and redone individually. Every assignment
//! change regenerates its per-day effort allocation. Subjects, students and
//! tags are edited directly.
//!
//! # Examples
//!
//! In-memory usage with [`engine::Engine`]:
//! ```
//! use chrono::{TimeZone, Utc};
//! use hwboard::{
//!     core::allocation::{DayBoundary, MalformedSchedule, Planner},
//!     engine::Engine,
//!     model::{Assignment, AssignmentConfig, Subject, SubjectConfig},
//!     persist::{Store, memory::MemoryStore},
//! };
//!
//! let mut engine = Engine::new(MemoryStore::new())
//!     .with_planner(Planner::new(DayBoundary::utc(), MalformedSchedule::Clamp));
//! let math = Subject {
//!     id: "math".into(),
//!     name: "Math".into(),
//!     color: "#00f".into(),
//!     config: SubjectConfig::default(),
//! };
//! engine.add_subject(&math).expect("subject");
//!
//! let log = engine
//!     .create_assignment(
//!         Assignment {
//!             id: "a1".into(),
//!             subject: math,
//!             created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!             deadline: Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
//!             estimated: 120,
//!             spent: 0,
//!             title: "Worksheet".into(),
//!             description: String::new(),
//!             priority: 1,
//!             config: AssignmentConfig::default(),
//!             submissions: None,
//!             total_required_submissions: None,
//!             tags: None,
//!         },
//!         "create worksheet",
//!     )
//!     .expect("create");
//! assert_eq!(engine.store().day_allocations_for("a1").expect("days").len(), 3);
//! assert!(engine.undo(&log).expect("undo"));
//! assert!(engine.get_assignment("a1").expect("get").is_none());
//! ```
//!
//! Runtime usage over SQLite:
//! ```no_run
//! use hwboard::{config::BoardConfig, op::LogQuery, runtime::spawn_board};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = BoardConfig::load("hwboard.toml").expect("config");
//! let engine = config.open_engine().expect("open");
//! let handle = spawn_board(engine, config.runtime.clone());
//! let recent = handle.list(LogQuery::page(20, 0)).await.expect("list");
//! println!("{} entries", recent.len());
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![warn(missing_docs)]

/// TOML configuration and logging setup.
pub mod config;
/// Operations, allocation planning and payload sanitization.
pub mod core;
/// Operation log engine plus direct CRUD.
pub mod engine;
/// Change notification bus.
pub mod events;
/// Board domain records.
pub mod model;
/// Operation kinds, payloads and log rows.
pub mod op;
/// Store abstraction with SQLite and in-memory backends.
pub mod persist;
/// Single-writer async runtime.
pub mod runtime;
/// Shared primitive ids and units.
pub mod types;

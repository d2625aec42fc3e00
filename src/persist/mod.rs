//! Persistent store abstraction with SQLite and in-memory backends.

/// In-memory store backend.
pub mod memory;
/// SQLite store backend.
pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    model::{Assignment, DayAllocation, Student, Subject, Submission, Tag},
    op::{LogQuery, NewLogEntry, OperationLogEntry, PayloadKind},
    types::Minutes,
};

/// Table-level entity names used in store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// Subjects table.
    Subject,
    /// Students table.
    Student,
    /// Assignment tags table.
    Tag,
    /// Assignments table.
    Assignment,
    /// Submissions table.
    Submission,
    /// Operation log table.
    LogEntry,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Subject => "subject",
            Self::Student => "student",
            Self::Tag => "tag",
            Self::Assignment => "assignment",
            Self::Submission => "submission",
            Self::LogEntry => "operation log entry",
        })
    }
}

/// Store-level failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced row does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Table of the missing row.
        entity: Entity,
        /// Missing id.
        id: String,
    },
    /// Row with the same id already exists.
    #[error("{entity} '{id}' already exists")]
    Conflict {
        /// Table of the clashing row.
        entity: Entity,
        /// Clashing id.
        id: String,
    },
    /// Database file could not be prepared.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite driver error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// JSON column could not be encoded or decoded.
    #[error("json column: {0}")]
    Serde(#[from] serde_json::Error),
    /// Stored data violates an invariant.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn conflict(entity: Entity, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
        }
    }
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Relational store consumed by the engine.
///
/// Implementations enforce the board's referential rules: assignments need
/// their subject, submissions need their assignment and student, and
/// deleting a subject, assignment or student cascades to dependent rows.
pub trait Store: Send {
    /// Runs `f` as one atomic unit. Changes made by `f` are discarded when it
    /// returns `Err`. Calls may nest.
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>;

    /// Inserts a subject.
    fn insert_subject(&mut self, subject: &Subject) -> StoreResult<()>;
    /// Overwrites an existing subject.
    fn update_subject(&mut self, subject: &Subject) -> StoreResult<()>;
    /// Deletes a subject and its assignments. Returns false when absent.
    fn delete_subject(&mut self, id: &str) -> StoreResult<bool>;
    /// Loads one subject.
    fn subject(&self, id: &str) -> StoreResult<Option<Subject>>;
    /// All subjects ordered by id.
    fn subjects(&self) -> StoreResult<Vec<Subject>>;

    /// Inserts a student.
    fn insert_student(&mut self, student: &Student) -> StoreResult<()>;
    /// Overwrites an existing student.
    fn update_student(&mut self, student: &Student) -> StoreResult<()>;
    /// Deletes a student and their submissions. Returns false when absent.
    fn delete_student(&mut self, id: &str) -> StoreResult<bool>;
    /// Deletes every student. Returns the number removed.
    fn clear_students(&mut self) -> StoreResult<usize>;
    /// All students ordered by group, then name.
    fn students(&self) -> StoreResult<Vec<Student>>;

    /// Inserts a tag.
    fn insert_tag(&mut self, tag: &Tag) -> StoreResult<()>;
    /// Overwrites an existing tag.
    fn update_tag(&mut self, tag: &Tag) -> StoreResult<()>;
    /// Deletes a tag. Returns false when absent.
    fn delete_tag(&mut self, id: &str) -> StoreResult<bool>;
    /// All tags ordered by id.
    fn tags(&self) -> StoreResult<Vec<Tag>>;

    /// Inserts an assignment row; enrichment fields are ignored.
    fn insert_assignment(&mut self, assignment: &Assignment) -> StoreResult<()>;
    /// Overwrites an existing assignment row.
    fn update_assignment(&mut self, assignment: &Assignment) -> StoreResult<()>;
    /// Deletes an assignment with its submissions and day allocations.
    fn delete_assignment(&mut self, id: &str) -> StoreResult<bool>;
    /// Loads one assignment with its subject, without enrichment.
    fn assignment(&self, id: &str) -> StoreResult<Option<Assignment>>;
    /// Assignments with `deadline >= begin` and `created <= end`, by creation.
    fn assignments_between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Assignment>>;
    /// Adds `delta` to an assignment's `spent`.
    fn add_spent(&mut self, id: &str, delta: Minutes) -> StoreResult<()>;

    /// Inserts a submission.
    fn insert_submission(&mut self, submission: &Submission) -> StoreResult<()>;
    /// Deletes a submission. Returns false when absent.
    fn delete_submission(&mut self, id: &str) -> StoreResult<bool>;
    /// Submissions of one assignment by hand-in time, referencing it by id.
    fn submissions_for_assignment(&self, id: &str) -> StoreResult<Vec<Submission>>;
    /// Submissions of one student by hand-in time, referencing assignments by id.
    fn submissions_for_student(&self, id: &str) -> StoreResult<Vec<Submission>>;

    /// Deletes every day allocation of an assignment.
    fn delete_day_allocations(&mut self, assignment: &str) -> StoreResult<usize>;
    /// Inserts one day allocation row.
    fn insert_day_allocation(&mut self, row: &DayAllocation) -> StoreResult<()>;
    /// Rows dated within `[begin, end]`, by date.
    fn day_allocations_between(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DayAllocation>>;
    /// Rows of one assignment, by date.
    fn day_allocations_for(&self, assignment: &str) -> StoreResult<Vec<DayAllocation>>;

    /// Appends a log entry, assigning its sequence.
    fn insert_log(&mut self, entry: &NewLogEntry) -> StoreResult<OperationLogEntry>;
    /// Loads one log entry.
    fn log_entry(&self, id: &str) -> StoreResult<Option<OperationLogEntry>>;
    /// Rewrites the mutable columns of a log entry.
    fn update_log(
        &mut self,
        id: &str,
        reverted: bool,
        payload_kind: PayloadKind,
        changes: &str,
    ) -> StoreResult<()>;
    /// Entries matching `query`, newest first.
    fn list_log(&self, query: &LogQuery) -> StoreResult<Vec<OperationLogEntry>>;
    /// Every entry in record order.
    fn all_log(&self) -> StoreResult<Vec<OperationLogEntry>>;
}

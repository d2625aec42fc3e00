//! SQLite-backed board store.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::Value};

use crate::{
    model::{Assignment, AssignmentRef, DayAllocation, Student, Subject, Submission, Tag},
    op::{LogQuery, NewLogEntry, OperationLogEntry, PayloadKind},
    types::{LogSeq, Minutes},
};

use super::{Entity, Store, StoreError, StoreResult};

/// Busy timeout applied to new connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SAVEPOINT: &str = "hwboard_step";
const DATE_FORMAT: &str = "%Y-%m-%d";

const ASSIGNMENT_SELECT: &str = "SELECT a.id, a.subject, a.created, a.deadline, a.estimated, a.spent, \
     a.title, a.description, a.priority, a.config, s.name, s.color, s.config \
     FROM assignments a JOIN subjects s ON a.subject = s.id";

const SUBMISSION_SELECT: &str = "SELECT sub.id, sub.assignment, sub.student, sub.created, sub.spent, \
     sub.feedback, st.name, st.\"group\" \
     FROM submissions sub JOIN students st ON st.id = sub.student";

const LOG_SELECT: &str = "SELECT seq, id, description, created, type, payload_kind, changes, reverted \
     FROM operation_logs";

/// SQLite implementation of [`crate::persist::Store`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates a store at `path`, creating parent directories.
    ///
    /// Enables foreign keys and WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`SqliteStore::open`] with an explicit busy timeout.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_connection(conn, busy_timeout)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, DEFAULT_BUSY_TIMEOUT)
    }

    fn init_connection(conn: Connection, busy_timeout: Duration) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let _journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    /// Underlying connection, for inspection in tests and tools.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn require(&self, table: &str, entity: Entity, id: &str) -> StoreResult<()> {
        if self.exists(table, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found(entity, id))
        }
    }

    fn forbid(&self, table: &str, entity: Entity, id: &str) -> StoreResult<()> {
        if self.exists(table, id)? {
            Err(StoreError::conflict(entity, id))
        } else {
            Ok(())
        }
    }

    fn query_assignments(&self, filter: &str, args: &[Value]) -> StoreResult<Vec<Assignment>> {
        let sql = format!("{ASSIGNMENT_SELECT} {filter} ORDER BY a.created, a.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), AssignmentRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_assignment()?);
        }
        Ok(out)
    }

    fn query_submissions(&self, filter: &str, id: &str) -> StoreResult<Vec<Submission>> {
        let sql = format!("{SUBMISSION_SELECT} {filter} ORDER BY sub.created, sub.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([id], SubmissionRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_submission()?);
        }
        Ok(out)
    }

    fn query_days(&self, filter: &str, args: &[Value]) -> StoreResult<Vec<DayAllocation>> {
        let sql = format!(
            "SELECT date, assignment, subject, taken FROM day_allocations {filter} ORDER BY date, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (date, assignment, subject, taken) = row?;
            out.push(DayAllocation {
                date: parse_date(&date)?,
                assignment,
                subject,
                taken,
            });
        }
        Ok(out)
    }

    fn query_log(&self, tail: &str, args: &[Value]) -> StoreResult<Vec<OperationLogEntry>> {
        let sql = format!("{LOG_SELECT} {tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), LogRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_entry()?);
        }
        Ok(out)
    }
}

impl Store for SqliteStore {
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.conn
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
            .map_err(StoreError::from)?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {SAVEPOINT}"))
                    .map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))
                {
                    tracing::warn!("savepoint rollback failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    fn insert_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        self.forbid("subjects", Entity::Subject, &subject.id)?;
        self.conn.execute(
            "INSERT INTO subjects (id, name, color, config) VALUES (?1, ?2, ?3, ?4)",
            params![
                subject.id,
                subject.name,
                subject.color,
                serde_json::to_string(&subject.config)?
            ],
        )?;
        Ok(())
    }

    fn update_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE subjects SET name = ?1, color = ?2, config = ?3 WHERE id = ?4",
            params![
                subject.name,
                subject.color,
                serde_json::to_string(&subject.config)?,
                subject.id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::Subject, &subject.id));
        }
        Ok(())
    }

    fn delete_subject(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM subjects WHERE id = ?1", [id])? > 0)
    }

    fn subject(&self, id: &str) -> StoreResult<Option<Subject>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, color, config FROM subjects WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, color, config)| {
            Ok(Subject {
                id,
                name,
                color,
                config: serde_json::from_str(&config)?,
            })
        })
        .transpose()
    }

    fn subjects(&self) -> StoreResult<Vec<Subject>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color, config FROM subjects ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, name, color, config) = row?;
            out.push(Subject {
                id,
                name,
                color,
                config: serde_json::from_str(&config)?,
            });
        }
        Ok(out)
    }

    fn insert_student(&mut self, student: &Student) -> StoreResult<()> {
        self.forbid("students", Entity::Student, &student.id)?;
        self.conn.execute(
            "INSERT INTO students (id, name, \"group\") VALUES (?1, ?2, ?3)",
            params![student.id, student.name, student.group],
        )?;
        Ok(())
    }

    fn update_student(&mut self, student: &Student) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE students SET name = ?1, \"group\" = ?2 WHERE id = ?3",
            params![student.name, student.group, student.id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::Student, &student.id));
        }
        Ok(())
    }

    fn delete_student(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM students WHERE id = ?1", [id])? > 0)
    }

    fn clear_students(&mut self) -> StoreResult<usize> {
        Ok(self.conn.execute("DELETE FROM students", [])?)
    }

    fn students(&self) -> StoreResult<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, \"group\" FROM students ORDER BY \"group\", name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Student {
                id: row.get(0)?,
                name: row.get(1)?,
                group: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn insert_tag(&mut self, tag: &Tag) -> StoreResult<()> {
        self.forbid("assignment_tags", Entity::Tag, &tag.id)?;
        self.conn.execute(
            "INSERT INTO assignment_tags (id, name, color) VALUES (?1, ?2, ?3)",
            params![tag.id, tag.name, tag.color],
        )?;
        Ok(())
    }

    fn update_tag(&mut self, tag: &Tag) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE assignment_tags SET name = ?1, color = ?2 WHERE id = ?3",
            params![tag.name, tag.color, tag.id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::Tag, &tag.id));
        }
        Ok(())
    }

    fn delete_tag(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self
            .conn
            .execute("DELETE FROM assignment_tags WHERE id = ?1", [id])?
            > 0)
    }

    fn tags(&self) -> StoreResult<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM assignment_tags ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn insert_assignment(&mut self, assignment: &Assignment) -> StoreResult<()> {
        self.forbid("assignments", Entity::Assignment, &assignment.id)?;
        self.require("subjects", Entity::Subject, &assignment.subject.id)?;
        self.conn.execute(
            "INSERT INTO assignments (id, subject, created, deadline, estimated, spent, title, description, priority, config) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                assignment.id,
                assignment.subject.id,
                assignment.created.timestamp_millis(),
                assignment.deadline.timestamp_millis(),
                assignment.estimated,
                assignment.spent,
                assignment.title,
                assignment.description,
                assignment.priority,
                serde_json::to_string(&assignment.config)?,
            ],
        )?;
        Ok(())
    }

    fn update_assignment(&mut self, assignment: &Assignment) -> StoreResult<()> {
        self.require("subjects", Entity::Subject, &assignment.subject.id)?;
        let changed = self.conn.execute(
            "UPDATE assignments SET subject = ?1, created = ?2, deadline = ?3, estimated = ?4, spent = ?5, \
             title = ?6, description = ?7, priority = ?8, config = ?9 WHERE id = ?10",
            params![
                assignment.subject.id,
                assignment.created.timestamp_millis(),
                assignment.deadline.timestamp_millis(),
                assignment.estimated,
                assignment.spent,
                assignment.title,
                assignment.description,
                assignment.priority,
                serde_json::to_string(&assignment.config)?,
                assignment.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::Assignment, &assignment.id));
        }
        Ok(())
    }

    fn delete_assignment(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM assignments WHERE id = ?1", [id])? > 0)
    }

    fn assignment(&self, id: &str) -> StoreResult<Option<Assignment>> {
        Ok(self
            .query_assignments("WHERE a.id = ?1", &[Value::Text(id.to_string())])?
            .pop())
    }

    fn assignments_between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Assignment>> {
        self.query_assignments(
            "WHERE a.deadline >= ?1 AND a.created <= ?2",
            &[
                Value::Integer(begin.timestamp_millis()),
                Value::Integer(end.timestamp_millis()),
            ],
        )
    }

    fn add_spent(&mut self, id: &str, delta: Minutes) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE assignments SET spent = spent + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::Assignment, id));
        }
        Ok(())
    }

    fn insert_submission(&mut self, submission: &Submission) -> StoreResult<()> {
        self.forbid("submissions", Entity::Submission, &submission.id)?;
        self.require("assignments", Entity::Assignment, submission.assignment.id())?;
        self.require("students", Entity::Student, &submission.student.id)?;
        self.conn.execute(
            "INSERT INTO submissions (id, assignment, student, created, spent, feedback) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                submission.id,
                submission.assignment.id(),
                submission.student.id,
                submission.created.timestamp_millis(),
                submission.spent,
                submission.feedback,
            ],
        )?;
        Ok(())
    }

    fn delete_submission(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.conn.execute("DELETE FROM submissions WHERE id = ?1", [id])? > 0)
    }

    fn submissions_for_assignment(&self, id: &str) -> StoreResult<Vec<Submission>> {
        self.query_submissions("WHERE sub.assignment = ?1", id)
    }

    fn submissions_for_student(&self, id: &str) -> StoreResult<Vec<Submission>> {
        self.query_submissions("WHERE sub.student = ?1", id)
    }

    fn delete_day_allocations(&mut self, assignment: &str) -> StoreResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM day_allocations WHERE assignment = ?1", [assignment])?)
    }

    fn insert_day_allocation(&mut self, row: &DayAllocation) -> StoreResult<()> {
        self.require("assignments", Entity::Assignment, &row.assignment)?;
        self.conn.execute(
            "INSERT INTO day_allocations (date, assignment, subject, taken) VALUES (?1, ?2, ?3, ?4)",
            params![
                row.date.format(DATE_FORMAT).to_string(),
                row.assignment,
                row.subject,
                row.taken
            ],
        )?;
        Ok(())
    }

    fn day_allocations_between(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DayAllocation>> {
        self.query_days(
            "WHERE date BETWEEN ?1 AND ?2",
            &[
                Value::Text(begin.format(DATE_FORMAT).to_string()),
                Value::Text(end.format(DATE_FORMAT).to_string()),
            ],
        )
    }

    fn day_allocations_for(&self, assignment: &str) -> StoreResult<Vec<DayAllocation>> {
        self.query_days(
            "WHERE assignment = ?1",
            &[Value::Text(assignment.to_string())],
        )
    }

    fn insert_log(&mut self, entry: &NewLogEntry) -> StoreResult<OperationLogEntry> {
        self.forbid("operation_logs", Entity::LogEntry, &entry.id)?;
        self.conn.execute(
            "INSERT INTO operation_logs (id, description, created, type, payload_kind, changes, reverted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.description,
                entry.created.timestamp_millis(),
                entry.kind.as_str(),
                entry.payload_kind.as_str(),
                entry.changes,
                entry.reverted,
            ],
        )?;
        let seq = self.conn.last_insert_rowid() as LogSeq;
        Ok(OperationLogEntry {
            seq,
            id: entry.id.clone(),
            description: entry.description.clone(),
            created: from_millis(entry.created.timestamp_millis())?,
            kind: entry.kind,
            payload_kind: entry.payload_kind,
            changes: entry.changes.clone(),
            reverted: entry.reverted,
        })
    }

    fn log_entry(&self, id: &str) -> StoreResult<Option<OperationLogEntry>> {
        Ok(self
            .query_log("WHERE id = ?1", &[Value::Text(id.to_string())])?
            .pop())
    }

    fn update_log(
        &mut self,
        id: &str,
        reverted: bool,
        payload_kind: PayloadKind,
        changes: &str,
    ) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE operation_logs SET reverted = ?1, payload_kind = ?2, changes = ?3 WHERE id = ?4",
            params![reverted, payload_kind.as_str(), changes, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(Entity::LogEntry, id));
        }
        Ok(())
    }

    fn list_log(&self, query: &LogQuery) -> StoreResult<Vec<OperationLogEntry>> {
        let mut wheres = Vec::new();
        let mut args = Vec::new();
        if let Some(since) = query.since {
            args.push(Value::Integer(since.timestamp_millis()));
            wheres.push(format!("created >= ?{}", args.len()));
        }
        if let Some(needle) = &query.description_contains {
            args.push(Value::Text(needle.clone()));
            wheres.push(format!("instr(description, ?{}) > 0", args.len()));
        }
        let filter = if wheres.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", wheres.join(" AND "))
        };
        args.push(Value::Integer(to_sql_count(query.limit)));
        args.push(Value::Integer(to_sql_count(query.offset)));
        let tail = format!(
            "{filter} ORDER BY created DESC, seq DESC LIMIT ?{} OFFSET ?{}",
            args.len() - 1,
            args.len()
        );
        self.query_log(&tail, &args)
    }

    fn all_log(&self) -> StoreResult<Vec<OperationLogEntry>> {
        self.query_log("ORDER BY seq", &[])
    }
}

struct AssignmentRow {
    id: String,
    subject: String,
    created: i64,
    deadline: i64,
    estimated: i64,
    spent: i64,
    title: String,
    description: String,
    priority: i64,
    config: String,
    subject_name: String,
    subject_color: String,
    subject_config: String,
}

impl AssignmentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            created: row.get(2)?,
            deadline: row.get(3)?,
            estimated: row.get(4)?,
            spent: row.get(5)?,
            title: row.get(6)?,
            description: row.get(7)?,
            priority: row.get(8)?,
            config: row.get(9)?,
            subject_name: row.get(10)?,
            subject_color: row.get(11)?,
            subject_config: row.get(12)?,
        })
    }

    fn into_assignment(self) -> StoreResult<Assignment> {
        Ok(Assignment {
            id: self.id,
            subject: Subject {
                id: self.subject,
                name: self.subject_name,
                color: self.subject_color,
                config: serde_json::from_str(&self.subject_config)?,
            },
            created: from_millis(self.created)?,
            deadline: from_millis(self.deadline)?,
            estimated: self.estimated,
            spent: self.spent,
            title: self.title,
            description: self.description,
            priority: self.priority,
            config: serde_json::from_str(&self.config)?,
            submissions: None,
            total_required_submissions: None,
            tags: None,
        })
    }
}

struct SubmissionRow {
    id: String,
    assignment: String,
    student: String,
    created: i64,
    spent: Option<i64>,
    feedback: Option<String>,
    student_name: String,
    student_group: String,
}

impl SubmissionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            assignment: row.get(1)?,
            student: row.get(2)?,
            created: row.get(3)?,
            spent: row.get(4)?,
            feedback: row.get(5)?,
            student_name: row.get(6)?,
            student_group: row.get(7)?,
        })
    }

    fn into_submission(self) -> StoreResult<Submission> {
        Ok(Submission {
            id: self.id,
            assignment: AssignmentRef::Id {
                id: self.assignment,
            },
            student: Student {
                id: self.student,
                name: self.student_name,
                group: self.student_group,
            },
            created: from_millis(self.created)?,
            spent: self.spent,
            feedback: self.feedback,
        })
    }
}

struct LogRow {
    seq: i64,
    id: String,
    description: String,
    created: i64,
    kind: String,
    payload_kind: String,
    changes: String,
    reverted: bool,
}

impl LogRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            description: row.get(2)?,
            created: row.get(3)?,
            kind: row.get(4)?,
            payload_kind: row.get(5)?,
            changes: row.get(6)?,
            reverted: row.get(7)?,
        })
    }

    fn into_entry(self) -> StoreResult<OperationLogEntry> {
        let kind = self
            .kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("log entry '{}': {e}", self.id)))?;
        let payload_kind = self
            .payload_kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("log entry '{}': {e}", self.id)))?;
        Ok(OperationLogEntry {
            seq: self.seq as LogSeq,
            id: self.id,
            description: self.description,
            created: from_millis(self.created)?,
            kind,
            payload_kind,
            changes: self.changes,
            reverted: self.reverted,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn parse_date(text: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("bad allocation date '{text}': {e}")))
}

fn to_sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_connection_enforces_foreign_keys() {
        let store = SqliteStore::open_in_memory().expect("open");
        let fk: i64 = store
            .connection()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("pragma");
        assert_eq!(fk, 1);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("nested").join("board.db");
        let _store = SqliteStore::open(&path).expect("open");
        assert!(path.exists());
    }

    #[test]
    fn log_rows_get_increasing_sequences() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let entry = |id: &str| NewLogEntry {
            id: id.to_string(),
            description: "d".into(),
            created: Utc::now(),
            kind: crate::op::OperationKind::FinishProgress,
            payload_kind: PayloadKind::Progress,
            changes: "[]".into(),
            reverted: true,
        };
        let first = store.insert_log(&entry("l1")).expect("insert");
        let second = store.insert_log(&entry("l2")).expect("insert");
        assert!(second.seq > first.seq);
        assert!(matches!(
            store.insert_log(&entry("l1")),
            Err(StoreError::Conflict { .. })
        ));
    }
}

//! In-memory store with the same referential rules as the SQLite backend.

use chrono::{DateTime, NaiveDate, Utc};
use hashbrown::HashMap;

use crate::{
    model::{Assignment, DayAllocation, Student, Subject, Submission, Tag},
    op::{LogQuery, NewLogEntry, OperationLogEntry, PayloadKind},
    types::{AssignmentId, LogId, LogSeq, Minutes, StudentId, SubjectId, SubmissionId, TagId},
};

use super::{Entity, Store, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    subjects: HashMap<SubjectId, Subject>,
    students: HashMap<StudentId, Student>,
    tags: HashMap<TagId, Tag>,
    assignments: HashMap<AssignmentId, Assignment>,
    submissions: HashMap<SubmissionId, Submission>,
    days: Vec<DayAllocation>,
}

/// Append-only log with undo marks, so a rollback does not copy it.
#[derive(Debug, Clone)]
struct Journal {
    rows: Vec<OperationLogEntry>,
    pos: HashMap<LogId, usize>,
    next_seq: LogSeq,
    marks: Vec<Mark>,
}

/// Log state at the start of an open `atomically` block.
#[derive(Debug, Clone)]
struct Mark {
    len: usize,
    next_seq: LogSeq,
    overwritten: Vec<(usize, OperationLogEntry)>,
}

impl Journal {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            pos: HashMap::new(),
            next_seq: 1,
            marks: Vec::new(),
        }
    }

    fn begin(&mut self) {
        self.marks.push(Mark {
            len: self.rows.len(),
            next_seq: self.next_seq,
            overwritten: Vec::new(),
        });
    }

    fn commit(&mut self) {
        let Some(mark) = self.marks.pop() else {
            return;
        };
        // Rows overwritten here still belong to the enclosing block.
        if let Some(outer) = self.marks.last_mut() {
            outer
                .overwritten
                .extend(mark.overwritten.into_iter().filter(|(pos, _)| *pos < outer.len));
        }
    }

    fn rollback(&mut self) {
        let Some(mark) = self.marks.pop() else {
            return;
        };
        for (pos, row) in mark.overwritten.into_iter().rev() {
            if pos < mark.len {
                self.rows[pos] = row;
            }
        }
        for row in self.rows.drain(mark.len..) {
            self.pos.remove(&row.id);
        }
        self.next_seq = mark.next_seq;
    }

    fn row_mut(&mut self, pos: usize) -> &mut OperationLogEntry {
        if let Some(mark) = self.marks.last_mut() {
            mark.overwritten.push((pos, self.rows[pos].clone()));
        }
        &mut self.rows[pos]
    }
}

/// Store backed by process memory; nothing survives a drop.
///
/// `atomically` snapshots the board tables and journals log writes, so its
/// cost grows with the board, not with the length of the log.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Tables,
    log: Journal,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: Tables::default(),
            log: Journal::new(),
        }
    }

    fn joined_assignment(&self, row: &Assignment) -> StoreResult<Assignment> {
        let subject = self
            .tables
            .subjects
            .get(&row.subject.id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "assignment '{}' references missing subject '{}'",
                    row.id, row.subject.id
                ))
            })?;
        Ok(Assignment {
            subject,
            ..row.clone()
        })
    }

    fn joined_submission(&self, row: &Submission) -> StoreResult<Submission> {
        let student = self
            .tables
            .students
            .get(&row.student.id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "submission '{}' references missing student '{}'",
                    row.id, row.student.id
                ))
            })?;
        Ok(Submission {
            student,
            ..row.clone()
        })
    }

    fn sorted_submissions(
        &self,
        keep: impl Fn(&Submission) -> bool,
    ) -> StoreResult<Vec<Submission>> {
        let mut rows: Vec<&Submission> = self.tables.submissions.values().filter(|s| keep(s)).collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        rows.into_iter().map(|s| self.joined_submission(s)).collect()
    }

    fn cascade_assignment(&mut self, id: &str) {
        self.tables.submissions.retain(|_, s| s.assignment.id() != id);
        self.tables.days.retain(|d| d.assignment != id);
    }
}

impl Store for MemoryStore {
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        let saved = self.tables.clone();
        self.log.begin();
        let out = f(self);
        if out.is_err() {
            self.tables = saved;
            self.log.rollback();
        } else {
            self.log.commit();
        }
        out
    }

    fn insert_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        if self.tables.subjects.contains_key(&subject.id) {
            return Err(StoreError::conflict(Entity::Subject, &subject.id));
        }
        self.tables.subjects.insert(subject.id.clone(), subject.clone());
        Ok(())
    }

    fn update_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        let row = self
            .tables
            .subjects
            .get_mut(&subject.id)
            .ok_or_else(|| StoreError::not_found(Entity::Subject, &subject.id))?;
        *row = subject.clone();
        Ok(())
    }

    fn delete_subject(&mut self, id: &str) -> StoreResult<bool> {
        if self.tables.subjects.remove(id).is_none() {
            return Ok(false);
        }
        let owned: Vec<AssignmentId> = self
            .tables
            .assignments
            .values()
            .filter(|a| a.subject.id == id)
            .map(|a| a.id.clone())
            .collect();
        for assignment in owned {
            self.tables.assignments.remove(&assignment);
            self.cascade_assignment(&assignment);
        }
        Ok(true)
    }

    fn subject(&self, id: &str) -> StoreResult<Option<Subject>> {
        Ok(self.tables.subjects.get(id).cloned())
    }

    fn subjects(&self) -> StoreResult<Vec<Subject>> {
        let mut out: Vec<Subject> = self.tables.subjects.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn insert_student(&mut self, student: &Student) -> StoreResult<()> {
        if self.tables.students.contains_key(&student.id) {
            return Err(StoreError::conflict(Entity::Student, &student.id));
        }
        self.tables.students.insert(student.id.clone(), student.clone());
        Ok(())
    }

    fn update_student(&mut self, student: &Student) -> StoreResult<()> {
        let row = self
            .tables
            .students
            .get_mut(&student.id)
            .ok_or_else(|| StoreError::not_found(Entity::Student, &student.id))?;
        *row = student.clone();
        Ok(())
    }

    fn delete_student(&mut self, id: &str) -> StoreResult<bool> {
        if self.tables.students.remove(id).is_none() {
            return Ok(false);
        }
        self.tables.submissions.retain(|_, s| s.student.id != id);
        Ok(true)
    }

    fn clear_students(&mut self) -> StoreResult<usize> {
        let count = self.tables.students.len();
        self.tables.students.clear();
        self.tables.submissions.clear();
        Ok(count)
    }

    fn students(&self) -> StoreResult<Vec<Student>> {
        let mut out: Vec<Student> = self.tables.students.values().cloned().collect();
        out.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.name.cmp(&b.name)));
        Ok(out)
    }

    fn insert_tag(&mut self, tag: &Tag) -> StoreResult<()> {
        if self.tables.tags.contains_key(&tag.id) {
            return Err(StoreError::conflict(Entity::Tag, &tag.id));
        }
        self.tables.tags.insert(tag.id.clone(), tag.clone());
        Ok(())
    }

    fn update_tag(&mut self, tag: &Tag) -> StoreResult<()> {
        let row = self
            .tables
            .tags
            .get_mut(&tag.id)
            .ok_or_else(|| StoreError::not_found(Entity::Tag, &tag.id))?;
        *row = tag.clone();
        Ok(())
    }

    fn delete_tag(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.tags.remove(id).is_some())
    }

    fn tags(&self) -> StoreResult<Vec<Tag>> {
        let mut out: Vec<Tag> = self.tables.tags.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn insert_assignment(&mut self, assignment: &Assignment) -> StoreResult<()> {
        if self.tables.assignments.contains_key(&assignment.id) {
            return Err(StoreError::conflict(Entity::Assignment, &assignment.id));
        }
        if !self.tables.subjects.contains_key(&assignment.subject.id) {
            return Err(StoreError::not_found(Entity::Subject, &assignment.subject.id));
        }
        self.tables
            .assignments
            .insert(assignment.id.clone(), assignment.without_enrichment());
        Ok(())
    }

    fn update_assignment(&mut self, assignment: &Assignment) -> StoreResult<()> {
        if !self.tables.subjects.contains_key(&assignment.subject.id) {
            return Err(StoreError::not_found(Entity::Subject, &assignment.subject.id));
        }
        let row = self
            .tables
            .assignments
            .get_mut(&assignment.id)
            .ok_or_else(|| StoreError::not_found(Entity::Assignment, &assignment.id))?;
        *row = assignment.without_enrichment();
        Ok(())
    }

    fn delete_assignment(&mut self, id: &str) -> StoreResult<bool> {
        if self.tables.assignments.remove(id).is_none() {
            return Ok(false);
        }
        self.cascade_assignment(id);
        Ok(true)
    }

    fn assignment(&self, id: &str) -> StoreResult<Option<Assignment>> {
        self.tables
            .assignments
            .get(id)
            .map(|row| self.joined_assignment(row))
            .transpose()
    }

    fn assignments_between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Assignment>> {
        let mut rows: Vec<&Assignment> = self
            .tables
            .assignments
            .values()
            .filter(|a| a.deadline >= begin && a.created <= end)
            .collect();
        rows.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        rows.into_iter().map(|a| self.joined_assignment(a)).collect()
    }

    fn add_spent(&mut self, id: &str, delta: Minutes) -> StoreResult<()> {
        let row = self
            .tables
            .assignments
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(Entity::Assignment, id))?;
        row.spent += delta;
        Ok(())
    }

    fn insert_submission(&mut self, submission: &Submission) -> StoreResult<()> {
        if self.tables.submissions.contains_key(&submission.id) {
            return Err(StoreError::conflict(Entity::Submission, &submission.id));
        }
        let assignment = submission.assignment.id();
        if !self.tables.assignments.contains_key(assignment) {
            return Err(StoreError::not_found(Entity::Assignment, assignment));
        }
        if !self.tables.students.contains_key(&submission.student.id) {
            return Err(StoreError::not_found(Entity::Student, &submission.student.id));
        }
        let row = Submission {
            assignment: submission.assignment.to_id_only(),
            ..submission.clone()
        };
        self.tables.submissions.insert(submission.id.clone(), row);
        Ok(())
    }

    fn delete_submission(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.submissions.remove(id).is_some())
    }

    fn submissions_for_assignment(&self, id: &str) -> StoreResult<Vec<Submission>> {
        self.sorted_submissions(|s| s.assignment.id() == id)
    }

    fn submissions_for_student(&self, id: &str) -> StoreResult<Vec<Submission>> {
        self.sorted_submissions(|s| s.student.id == id)
    }

    fn delete_day_allocations(&mut self, assignment: &str) -> StoreResult<usize> {
        let before = self.tables.days.len();
        self.tables.days.retain(|d| d.assignment != assignment);
        Ok(before - self.tables.days.len())
    }

    fn insert_day_allocation(&mut self, row: &DayAllocation) -> StoreResult<()> {
        if !self.tables.assignments.contains_key(&row.assignment) {
            return Err(StoreError::not_found(Entity::Assignment, &row.assignment));
        }
        self.tables.days.push(row.clone());
        Ok(())
    }

    fn day_allocations_between(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DayAllocation>> {
        let mut out: Vec<DayAllocation> = self
            .tables
            .days
            .iter()
            .filter(|d| d.date >= begin && d.date <= end)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(out)
    }

    fn day_allocations_for(&self, assignment: &str) -> StoreResult<Vec<DayAllocation>> {
        let mut out: Vec<DayAllocation> = self
            .tables
            .days
            .iter()
            .filter(|d| d.assignment == assignment)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(out)
    }

    fn insert_log(&mut self, entry: &NewLogEntry) -> StoreResult<OperationLogEntry> {
        if self.log.pos.contains_key(&entry.id) {
            return Err(StoreError::conflict(Entity::LogEntry, &entry.id));
        }
        let seq = self.log.next_seq;
        self.log.next_seq += 1;
        let stored = OperationLogEntry {
            seq,
            id: entry.id.clone(),
            description: entry.description.clone(),
            created: entry.created,
            kind: entry.kind,
            payload_kind: entry.payload_kind,
            changes: entry.changes.clone(),
            reverted: entry.reverted,
        };
        self.log.pos.insert(entry.id.clone(), self.log.rows.len());
        self.log.rows.push(stored.clone());
        Ok(stored)
    }

    fn log_entry(&self, id: &str) -> StoreResult<Option<OperationLogEntry>> {
        Ok(self
            .log
            .pos
            .get(id)
            .and_then(|pos| self.log.rows.get(*pos))
            .cloned())
    }

    fn update_log(
        &mut self,
        id: &str,
        reverted: bool,
        payload_kind: PayloadKind,
        changes: &str,
    ) -> StoreResult<()> {
        let pos = *self
            .log
            .pos
            .get(id)
            .ok_or_else(|| StoreError::not_found(Entity::LogEntry, id))?;
        let row = self.log.row_mut(pos);
        row.reverted = reverted;
        row.payload_kind = payload_kind;
        row.changes = changes.to_string();
        Ok(())
    }

    fn list_log(&self, query: &LogQuery) -> StoreResult<Vec<OperationLogEntry>> {
        let mut rows: Vec<&OperationLogEntry> =
            self.log.rows.iter().filter(|e| query.matches(e)).collect();
        rows.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.seq.cmp(&a.seq)));
        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    fn all_log(&self) -> StoreResult<Vec<OperationLogEntry>> {
        Ok(self.log.rows.clone())
    }
}

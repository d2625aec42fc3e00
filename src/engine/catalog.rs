//! Subjects, students and tags are edited directly, outside the operation
//! log. Each committed write fires the bus.

use chrono::{DateTime, Utc};

use crate::{
    model::{Assignment, Student, Subject, Submission, Tag},
    persist::Store,
};

use super::{Engine, EngineError};

impl<S: Store + 'static> Engine<S> {
    /// Inserts a subject.
    pub fn add_subject(&mut self, subject: &Subject) -> Result<(), EngineError> {
        self.store.insert_subject(subject)?;
        self.bus.emit();
        Ok(())
    }

    /// Overwrites a subject.
    pub fn update_subject(&mut self, subject: &Subject) -> Result<(), EngineError> {
        self.store.update_subject(subject)?;
        self.bus.emit();
        Ok(())
    }

    /// Deletes a subject together with its assignments.
    pub fn remove_subject(&mut self, id: &str) -> Result<bool, EngineError> {
        let removed = self.store.atomically(|store| store.delete_subject(id))?;
        if removed {
            self.bus.emit();
        }
        Ok(removed)
    }

    /// All subjects.
    pub fn list_subjects(&self) -> Result<Vec<Subject>, EngineError> {
        Ok(self.store.subjects()?)
    }

    /// Inserts a student.
    pub fn add_student(&mut self, student: &Student) -> Result<(), EngineError> {
        self.store.insert_student(student)?;
        self.bus.emit();
        Ok(())
    }

    /// Overwrites a student.
    pub fn update_student(&mut self, student: &Student) -> Result<(), EngineError> {
        self.store.update_student(student)?;
        self.bus.emit();
        Ok(())
    }

    /// Deletes a student together with their submissions.
    pub fn remove_student(&mut self, id: &str) -> Result<bool, EngineError> {
        let removed = self.store.atomically(|store| store.delete_student(id))?;
        if removed {
            self.bus.emit();
        }
        Ok(removed)
    }

    /// Deletes every student. Returns how many were removed.
    pub fn clear_students(&mut self) -> Result<usize, EngineError> {
        let removed = self.store.atomically(|store| store.clear_students())?;
        self.bus.emit();
        Ok(removed)
    }

    /// All students by group, then name.
    pub fn list_students(&self) -> Result<Vec<Student>, EngineError> {
        Ok(self.store.students()?)
    }

    /// Inserts a tag.
    pub fn add_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        self.store.insert_tag(tag)?;
        self.bus.emit();
        Ok(())
    }

    /// Overwrites a tag.
    pub fn update_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        self.store.update_tag(tag)?;
        self.bus.emit();
        Ok(())
    }

    /// Deletes a tag.
    pub fn remove_tag(&mut self, id: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete_tag(id)?;
        if removed {
            self.bus.emit();
        }
        Ok(removed)
    }

    /// All tags.
    pub fn list_tags(&self) -> Result<Vec<Tag>, EngineError> {
        Ok(self.store.tags()?)
    }

    /// One assignment with its submissions, required count and tags.
    pub fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, EngineError> {
        let Some(assignment) = self.store.assignment(id)? else {
            return Ok(None);
        };
        let context = Enrichment::load(&self.store)?;
        Ok(Some(context.apply(&self.store, assignment)?))
    }

    /// Enriched assignments overlapping `[begin, end]`; open bounds are unbounded.
    pub fn list_assignments(
        &self,
        begin: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Assignment>, EngineError> {
        let rows = self.store.assignments_between(
            begin.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )?;
        let context = Enrichment::load(&self.store)?;
        rows.into_iter()
            .map(|assignment| context.apply(&self.store, assignment))
            .collect()
    }

    /// Submissions handed in by one student.
    pub fn submissions_for_student(&self, id: &str) -> Result<Vec<Submission>, EngineError> {
        Ok(self.store.submissions_for_student(id)?)
    }
}

struct Enrichment {
    students: usize,
    tags: Vec<Tag>,
}

impl Enrichment {
    fn load<S: Store>(store: &S) -> Result<Self, EngineError> {
        Ok(Self {
            students: store.students()?.len(),
            tags: store.tags()?,
        })
    }

    fn apply<S: Store>(&self, store: &S, mut assignment: Assignment) -> Result<Assignment, EngineError> {
        assignment.submissions = Some(store.submissions_for_assignment(&assignment.id)?);
        assignment.total_required_submissions = Some(self.students);
        // Unknown tag ids are dropped.
        assignment.tags = Some(
            assignment
                .config
                .tags
                .iter()
                .filter_map(|id| self.tags.iter().find(|tag| &tag.id == id).cloned())
                .collect(),
        );
        Ok(assignment)
    }
}

//! Homework-board domain records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssignmentId, Minutes, StudentId, SubjectId, SubmissionId, TagId};

/// Template offered when creating an assignment for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPreset {
    /// Preset title.
    pub name: String,
    /// Preset description text.
    pub description: String,
    /// Default duration in days.
    pub duration: u32,
    /// Default estimated effort.
    pub estimated: Minutes,
    /// Default priority.
    pub priority: i64,
}

/// Per-subject configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectConfig {
    /// Presets offered for new assignments.
    #[serde(default)]
    pub assignment_presets: Vec<AssignmentPreset>,
}

impl SubjectConfig {
    /// Returns true when no configuration is set.
    pub fn is_empty(&self) -> bool {
        self.assignment_presets.is_empty()
    }
}

/// School subject owning assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable subject identifier.
    pub id: SubjectId,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Subject configuration.
    #[serde(default)]
    pub config: SubjectConfig,
}

/// Student who hands in submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Stable student identifier.
    pub id: StudentId,
    /// Display name.
    pub name: String,
    /// Class group label.
    pub group: String,
}

/// Label attachable to assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Stable tag identifier.
    pub id: TagId,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
}

/// Per-assignment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Tag ids attached to the assignment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagId>,
}

/// Homework assignment.
///
/// `submissions`, `total_required_submissions` and `tags` are read-side
/// enrichment filled by assignment queries; they are never written to the
/// assignments table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Stable assignment identifier.
    pub id: AssignmentId,
    /// Owning subject.
    pub subject: Subject,
    /// Instant the assignment was handed out.
    pub created: DateTime<Utc>,
    /// Instant the assignment is due.
    pub deadline: DateTime<Utc>,
    /// Total effort budget.
    pub estimated: Minutes,
    /// Effort consumed so far.
    pub spent: Minutes,
    /// Title text.
    pub title: String,
    /// Free description text.
    pub description: String,
    /// Priority, higher first.
    pub priority: i64,
    /// Assignment configuration.
    #[serde(default)]
    pub config: AssignmentConfig,
    /// Submissions handed in so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submissions: Option<Vec<Submission>>,
    /// Number of submissions expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_required_submissions: Option<usize>,
    /// Resolved tags from `config.tags`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl Assignment {
    /// Returns a copy without read-side enrichment.
    pub fn without_enrichment(&self) -> Self {
        Self {
            submissions: None,
            total_required_submissions: None,
            tags: None,
            ..self.clone()
        }
    }
}

/// Reference from a submission to its assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentRef {
    /// Fully materialized assignment.
    Full(Box<Assignment>),
    /// Identifier only.
    Id {
        /// Referenced assignment id.
        id: AssignmentId,
    },
}

impl AssignmentRef {
    /// Referenced assignment id.
    pub fn id(&self) -> &str {
        match self {
            Self::Full(assignment) => &assignment.id,
            Self::Id { id } => id,
        }
    }

    /// Reduces the reference to its id.
    pub fn to_id_only(&self) -> Self {
        Self::Id {
            id: self.id().to_string(),
        }
    }
}

impl From<Assignment> for AssignmentRef {
    fn from(value: Assignment) -> Self {
        Self::Full(Box::new(value))
    }
}

/// Homework handed in by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Stable submission identifier.
    pub id: SubmissionId,
    /// Assignment the submission belongs to.
    pub assignment: AssignmentRef,
    /// Submitting student.
    pub student: Student,
    /// Instant of hand-in.
    pub created: DateTime<Utc>,
    /// Effort reported by the student.
    pub spent: Option<Minutes>,
    /// Teacher feedback.
    pub feedback: Option<String>,
}

/// One derived day of an assignment's effort distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAllocation {
    /// Calendar day.
    pub date: NaiveDate,
    /// Assignment the effort belongs to.
    pub assignment: AssignmentId,
    /// Subject of the assignment.
    pub subject: SubjectId,
    /// Effort share for this day.
    pub taken: f64,
}

/// Additive change to one assignment's `spent` effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDelta {
    /// Minutes to add.
    pub delta: Minutes,
    /// Target assignment.
    pub assignment: AssignmentId,
}

impl ProgressDelta {
    /// Builds a delta for `assignment`.
    pub fn new(delta: Minutes, assignment: impl Into<AssignmentId>) -> Self {
        Self {
            delta,
            assignment: assignment.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_only_reference_parses_from_stripped_json() {
        let parsed: AssignmentRef = serde_json::from_str(r#"{"id":"a1"}"#).expect("parse");
        assert_eq!(parsed, AssignmentRef::Id { id: "a1".into() });
        assert_eq!(parsed.id(), "a1");
    }
}

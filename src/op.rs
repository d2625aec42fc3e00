//! Operation kinds, typed change payloads, and log entry records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::{Assignment, ProgressDelta, Submission},
    types::{AssignmentId, LogId, LogSeq},
};

/// Registered operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Insert an assignment and its day allocation.
    CreateAssignment,
    /// Overwrite an assignment and recompute its day allocation.
    ModifyAssignment,
    /// Delete an assignment and its day allocation.
    RemoveAssignment,
    /// Insert a submission.
    CreateSubmission,
    /// Add effort deltas to several assignments.
    FinishProgress,
}

impl OperationKind {
    /// All kinds in registration order.
    pub const ALL: [Self; 5] = [
        Self::CreateAssignment,
        Self::ModifyAssignment,
        Self::RemoveAssignment,
        Self::CreateSubmission,
        Self::FinishProgress,
    ];

    /// Stable name stored in the log.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateAssignment => "create-assignment",
            Self::ModifyAssignment => "modify-assignment",
            Self::RemoveAssignment => "remove-assignment",
            Self::CreateSubmission => "create-submission",
            Self::FinishProgress => "finish-progress",
        }
    }

    /// Payload shape stored while the entry is in the given state.
    ///
    /// A reverted entry holds the forward input; an active entry holds what
    /// the forward transition returned.
    pub const fn payload_kind(self, reverted: bool) -> PayloadKind {
        match (self, reverted) {
            (Self::RemoveAssignment, true) => PayloadKind::AssignmentId,
            (Self::CreateAssignment | Self::ModifyAssignment | Self::RemoveAssignment, _) => {
                PayloadKind::Assignment
            }
            (Self::CreateSubmission, _) => PayloadKind::Submission,
            (Self::FinishProgress, _) => PayloadKind::Progress,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an operation name that matches no [`OperationKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation type '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Shape of a serialized changes payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadKind {
    /// A full assignment.
    Assignment,
    /// An assignment id.
    AssignmentId,
    /// A submission.
    Submission,
    /// A list of progress deltas.
    Progress,
}

impl PayloadKind {
    /// Stable name stored in the log.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::AssignmentId => "assignment-id",
            Self::Submission => "submission",
            Self::Progress => "progress",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Assignment,
            Self::AssignmentId,
            Self::Submission,
            Self::Progress,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Changes payload attached to a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Changes {
    /// Assignment-shaped payload.
    Assignment(Assignment),
    /// Assignment id payload.
    AssignmentId(AssignmentId),
    /// Submission-shaped payload.
    Submission(Submission),
    /// Bulk progress payload.
    Progress(Vec<ProgressDelta>),
}

impl Changes {
    /// Shape of this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Assignment(_) => PayloadKind::Assignment,
            Self::AssignmentId(_) => PayloadKind::AssignmentId,
            Self::Submission(_) => PayloadKind::Submission,
            Self::Progress(_) => PayloadKind::Progress,
        }
    }

    /// Serializes the payload body without its kind tag.
    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            Self::Assignment(v) => serde_json::to_string(v),
            Self::AssignmentId(v) => serde_json::to_string(v),
            Self::Submission(v) => serde_json::to_string(v),
            Self::Progress(v) => serde_json::to_string(v),
        }
    }

    /// Parses a payload body whose shape is `kind`.
    pub fn decode(kind: PayloadKind, json: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            PayloadKind::Assignment => Self::Assignment(serde_json::from_str(json)?),
            PayloadKind::AssignmentId => Self::AssignmentId(serde_json::from_str(json)?),
            PayloadKind::Submission => Self::Submission(serde_json::from_str(json)?),
            PayloadKind::Progress => Self::Progress(serde_json::from_str(json)?),
        })
    }
}

/// Typed value convertible to and from [`Changes`].
pub trait Payload: Sized {
    /// Shape tag of this payload type.
    const KIND: PayloadKind;

    /// Wraps the value.
    fn into_changes(self) -> Changes;

    /// Unwraps the value, returning the actual shape on mismatch.
    fn from_changes(changes: Changes) -> Result<Self, PayloadKind>;
}

impl Payload for Assignment {
    const KIND: PayloadKind = PayloadKind::Assignment;

    fn into_changes(self) -> Changes {
        Changes::Assignment(self)
    }

    fn from_changes(changes: Changes) -> Result<Self, PayloadKind> {
        match changes {
            Changes::Assignment(v) => Ok(v),
            other => Err(other.kind()),
        }
    }
}

impl Payload for AssignmentId {
    const KIND: PayloadKind = PayloadKind::AssignmentId;

    fn into_changes(self) -> Changes {
        Changes::AssignmentId(self)
    }

    fn from_changes(changes: Changes) -> Result<Self, PayloadKind> {
        match changes {
            Changes::AssignmentId(v) => Ok(v),
            other => Err(other.kind()),
        }
    }
}

impl Payload for Submission {
    const KIND: PayloadKind = PayloadKind::Submission;

    fn into_changes(self) -> Changes {
        Changes::Submission(self)
    }

    fn from_changes(changes: Changes) -> Result<Self, PayloadKind> {
        match changes {
            Changes::Submission(v) => Ok(v),
            other => Err(other.kind()),
        }
    }
}

impl Payload for Vec<ProgressDelta> {
    const KIND: PayloadKind = PayloadKind::Progress;

    fn into_changes(self) -> Changes {
        Changes::Progress(self)
    }

    fn from_changes(changes: Changes) -> Result<Self, PayloadKind> {
        match changes {
            Changes::Progress(v) => Ok(v),
            other => Err(other.kind()),
        }
    }
}

/// Row of the operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    /// Record order, assigned by the store.
    pub seq: LogSeq,
    /// Opaque entry id.
    pub id: LogId,
    /// Caller-supplied audit text.
    pub description: String,
    /// First application instant.
    pub created: DateTime<Utc>,
    /// Registered operation type.
    pub kind: OperationKind,
    /// Shape of `changes`.
    pub payload_kind: PayloadKind,
    /// JSON payload for the next transition.
    pub changes: String,
    /// True when the forward effect is currently undone.
    pub reverted: bool,
}

impl OperationLogEntry {
    /// Parses `changes` according to `payload_kind`.
    pub fn decode_changes(&self) -> serde_json::Result<Changes> {
        Changes::decode(self.payload_kind, &self.changes)
    }
}

/// Log row as inserted by the engine, before a sequence is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    /// Opaque entry id.
    pub id: LogId,
    /// Caller-supplied audit text.
    pub description: String,
    /// First application instant.
    pub created: DateTime<Utc>,
    /// Registered operation type.
    pub kind: OperationKind,
    /// Shape of `changes`.
    pub payload_kind: PayloadKind,
    /// JSON payload.
    pub changes: String,
    /// Initial state.
    pub reverted: bool,
}

/// Pagination and filters for listing the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Maximum number of rows.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
    /// Only entries created at or after this instant, compared at
    /// millisecond precision.
    pub since: Option<DateTime<Utc>>,
    /// Only entries whose description contains this text.
    pub description_contains: Option<String>,
}

impl LogQuery {
    /// Unfiltered page.
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            since: None,
            description_contains: None,
        }
    }

    /// Adds a lower bound on `created`.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Adds a description substring filter.
    pub fn containing(mut self, needle: impl Into<String>) -> Self {
        self.description_contains = Some(needle.into());
        self
    }

    /// Returns true when `entry` passes the filters.
    pub fn matches(&self, entry: &OperationLogEntry) -> bool {
        self.since
            .is_none_or(|since| entry.created >= since.trunc_subsecs(3))
            && self
                .description_contains
                .as_deref()
                .is_none_or(|needle| entry.description.contains(needle))
    }
}

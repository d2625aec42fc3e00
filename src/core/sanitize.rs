//! Strips bulky nested data from payloads before they enter the log.
//!
//! Registry operations only use logged payloads to identify rows and to
//! restore assignment columns, so the stripped parts are never needed to
//! undo or redo. Instants are cut to the millisecond precision the SQLite
//! columns hold, so both stores round-trip the same values. Stripping is
//! idempotent.

use chrono::{DateTime, SubsecRound, Utc};

use crate::{
    model::{Assignment, Submission, SubjectConfig},
    op::Changes,
};

/// Returns `changes` with nested enrichment removed.
pub fn sanitize(changes: Changes) -> Changes {
    match changes {
        Changes::Assignment(assignment) => Changes::Assignment(strip_assignment(assignment)),
        Changes::Submission(submission) => Changes::Submission(strip_submission(submission)),
        other @ (Changes::AssignmentId(_) | Changes::Progress(_)) => other,
    }
}

/// Drops read-side enrichment and the subject's configuration.
pub fn strip_assignment(mut assignment: Assignment) -> Assignment {
    assignment.submissions = None;
    assignment.total_required_submissions = None;
    assignment.tags = None;
    assignment.subject.config = SubjectConfig::default();
    assignment.created = to_millis(assignment.created);
    assignment.deadline = to_millis(assignment.deadline);
    assignment
}

/// Reduces the nested assignment to its id.
pub fn strip_submission(mut submission: Submission) -> Submission {
    submission.assignment = submission.assignment.to_id_only();
    submission.created = to_millis(submission.created);
    submission
}

/// Drops precision below one millisecond.
pub fn to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

//! Even per-day distribution of an assignment's estimated effort.
//!
//! Every calendar day touched by `[created, deadline]` gets one row carrying
//! `estimated / day_count`, regardless of how many hours of a boundary day
//! the assignment actually covers. Rows are always regenerated wholesale.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::{Assignment, DayAllocation},
    persist::{Store, StoreError},
};

/// Time zone used to map instants onto calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    /// Host local time zone.
    #[default]
    Local,
    /// Fixed offset from UTC.
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Fixed boundary `minutes` east of UTC, if the offset is valid.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Fixed)
    }

    /// UTC day boundary.
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Calendar day containing `instant`.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }
}

/// Handling of assignments whose deadline precedes their creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedSchedule {
    /// One row on the creation day holding the full estimate.
    #[default]
    Clamp,
    /// Refuse to allocate.
    Reject,
}

/// Rejected allocation input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("assignment '{id}' has its deadline before its creation")]
pub struct InvalidSchedule {
    /// Offending assignment.
    pub id: String,
}

/// Computes and persists day allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Planner {
    /// Calendar used to assign instants to days.
    pub boundary: DayBoundary,
    /// Policy for `deadline < created`.
    pub malformed: MalformedSchedule,
}

impl Planner {
    /// Planner with the given calendar and policy.
    pub fn new(boundary: DayBoundary, malformed: MalformedSchedule) -> Self {
        Self {
            boundary,
            malformed,
        }
    }

    /// Allocation rows for `assignment`, one per calendar day in order.
    pub fn plan(&self, assignment: &Assignment) -> Result<Vec<DayAllocation>, InvalidSchedule> {
        let first = self.boundary.date_of(assignment.created);
        let last = if assignment.deadline < assignment.created {
            match self.malformed {
                MalformedSchedule::Clamp => {
                    tracing::warn!(
                        assignment = %assignment.id,
                        "deadline precedes creation; allocating a single day"
                    );
                    first
                }
                MalformedSchedule::Reject => {
                    return Err(InvalidSchedule {
                        id: assignment.id.clone(),
                    });
                }
            }
        } else {
            self.boundary.date_of(assignment.deadline)
        };

        let day_count = (last - first).num_days().max(0) + 1;
        let taken = assignment.estimated as f64 / day_count as f64;
        Ok(first
            .iter_days()
            .take(day_count as usize)
            .map(|date| DayAllocation {
                date,
                assignment: assignment.id.clone(),
                subject: assignment.subject.id.clone(),
                taken,
            })
            .collect())
    }

    /// Replaces every stored row of `assignment` with a fresh plan.
    ///
    /// Returns the number of rows written. The caller owns the transaction.
    pub fn recompute<S, E>(&self, store: &mut S, assignment: &Assignment) -> Result<usize, E>
    where
        S: Store,
        E: From<StoreError> + From<InvalidSchedule>,
    {
        let rows = self.plan(assignment)?;
        let removed = store.delete_day_allocations(&assignment.id)?;
        for row in &rows {
            store.insert_day_allocation(row)?;
        }
        tracing::debug!(
            assignment = %assignment.id,
            removed,
            written = rows.len(),
            "day allocation recomputed"
        );
        Ok(rows.len())
    }
}

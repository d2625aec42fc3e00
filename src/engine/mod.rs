//! Operation log engine.
//!
//! Every logged mutation is a row in the operation log whose `changes`
//! column always holds the input of the row's next transition:
//!
//! ```text
//! reverted = true   changes = forward input   --redo-->  reverted = false
//! reverted = false  changes = inverse input   --undo-->  reverted = true
//! ```
//!
//! [`Engine::apply`] inserts the row as reverted and then redoes it, so a
//! fresh operation and a re-applied one share one code path.

/// Direct CRUD and read queries.
pub mod catalog;

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    core::{
        allocation::{InvalidSchedule, Planner},
        registry::{Operation, Registry},
        sanitize::{sanitize, to_millis},
    },
    events::ChangeBus,
    model::{Assignment, DayAllocation, ProgressDelta, Submission},
    op::{Changes, LogQuery, NewLogEntry, OperationKind, OperationLogEntry, PayloadKind, UnknownKind},
    persist::{Entity, Store, StoreError},
    types::{AssignmentId, LogId, random_id},
};

/// Engine-level failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation kind absent from this engine's registry.
    #[error("operation '{0}' is not registered")]
    Unregistered(OperationKind),
    /// Operation kind registered twice.
    #[error("operation '{0}' is already registered")]
    AlreadyRegistered(OperationKind),
    /// Operation name that names no known kind.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    /// Payload shape does not fit the operation.
    #[error("operation '{kind}' expects a {expected} payload, got {found}")]
    PayloadMismatch {
        /// Operation being run.
        kind: OperationKind,
        /// Shape the operation accepts.
        expected: PayloadKind,
        /// Shape that was supplied.
        found: PayloadKind,
    },
    /// Allocation refused under the reject policy.
    #[error(transparent)]
    InvalidSchedule(#[from] InvalidSchedule),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Logged payload could not be encoded or decoded.
    #[error("log payload: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<UnknownKind> for EngineError {
    fn from(value: UnknownKind) -> Self {
        Self::UnknownOperation(value.0)
    }
}

/// Source of log timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns a store and applies, undoes and redoes logged operations on it.
pub struct Engine<S: Store> {
    store: S,
    registry: Registry<S>,
    bus: ChangeBus,
    planner: Planner,
    clock: Clock,
}

impl<S: Store + 'static> Engine<S> {
    /// Engine with the standard registry, default planner and a fresh bus.
    pub fn new(store: S) -> Self {
        Self::with_parts(store, Registry::standard(), ChangeBus::new(), Planner::default())
    }

    /// Engine from explicit parts.
    pub fn with_parts(store: S, registry: Registry<S>, bus: ChangeBus, planner: Planner) -> Self {
        tracing::info!(
            operations = registry.len(),
            boundary = ?planner.boundary,
            malformed = ?planner.malformed,
            "board engine ready"
        );
        Self {
            store,
            registry,
            bus,
            planner,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the planner.
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Replaces the bus.
    pub fn with_bus(mut self, bus: ChangeBus) -> Self {
        self.bus = bus;
        self
    }

    /// Replaces the clock used for the `created` column. Readings are kept
    /// to millisecond precision.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Registers an extra operation.
    pub fn register<O: Operation<S>>(&mut self, op: O) -> Result<(), EngineError> {
        self.registry.register(op)
    }

    /// Operation registry.
    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    /// Change bus fired after every committed mutation.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Allocation planner.
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying store, mutable. Writes made here bypass the log and the bus.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consumes the engine and returns its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Records and performs a new operation; returns its log id.
    ///
    /// The log row and the forward mutation commit together or not at all.
    pub fn apply(
        &mut self,
        kind: OperationKind,
        changes: Changes,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        let op = self
            .registry
            .get(kind)
            .ok_or(EngineError::Unregistered(kind))?;
        let expected = op.forward_kind();
        if changes.kind() != expected {
            return Err(EngineError::PayloadMismatch {
                kind,
                expected,
                found: changes.kind(),
            });
        }

        let entry = NewLogEntry {
            id: random_id(),
            description: description.into(),
            created: to_millis((self.clock)()),
            kind,
            payload_kind: expected,
            changes: sanitize(changes).encode()?,
            reverted: true,
        };
        let Self {
            store,
            registry,
            planner,
            ..
        } = self;
        let id = store.atomically(|store| {
            let row = store.insert_log(&entry)?;
            redo_entry(store, registry, planner, &row)?;
            Ok::<_, EngineError>(row.id)
        })?;
        tracing::debug!(%kind, log = %id, "operation applied");
        self.bus.emit();
        Ok(id)
    }

    /// Logs `create-assignment`.
    pub fn create_assignment(
        &mut self,
        assignment: Assignment,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        self.apply(
            OperationKind::CreateAssignment,
            Changes::Assignment(assignment),
            description,
        )
    }

    /// Logs `modify-assignment`.
    pub fn modify_assignment(
        &mut self,
        assignment: Assignment,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        self.apply(
            OperationKind::ModifyAssignment,
            Changes::Assignment(assignment),
            description,
        )
    }

    /// Logs `remove-assignment`.
    pub fn remove_assignment(
        &mut self,
        id: impl Into<AssignmentId>,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        self.apply(
            OperationKind::RemoveAssignment,
            Changes::AssignmentId(id.into()),
            description,
        )
    }

    /// Logs `create-submission`.
    pub fn create_submission(
        &mut self,
        submission: Submission,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        self.apply(
            OperationKind::CreateSubmission,
            Changes::Submission(submission),
            description,
        )
    }

    /// Logs `finish-progress`.
    pub fn finish_progress(
        &mut self,
        progress: Vec<ProgressDelta>,
        description: impl Into<String>,
    ) -> Result<LogId, EngineError> {
        self.apply(
            OperationKind::FinishProgress,
            Changes::Progress(progress),
            description,
        )
    }

    /// Reverts an active entry. `Ok(false)` when absent or already reverted.
    pub fn undo(&mut self, id: &str) -> Result<bool, EngineError> {
        self.transition(id, undo_entry)
    }

    /// Re-applies a reverted entry. `Ok(false)` when absent or already active.
    pub fn redo(&mut self, id: &str) -> Result<bool, EngineError> {
        self.transition(id, redo_entry)
    }

    fn transition(
        &mut self,
        id: &str,
        step: fn(&mut S, &Registry<S>, &Planner, &OperationLogEntry) -> Result<bool, EngineError>,
    ) -> Result<bool, EngineError> {
        let Self {
            store,
            registry,
            planner,
            ..
        } = self;
        let changed = store.atomically(|store: &mut S| -> Result<bool, EngineError> {
            let Some(entry) = store.log_entry(id)? else {
                tracing::debug!(log = %id, "no such log entry");
                return Ok(false);
            };
            step(store, registry, planner, &entry)
        })?;
        if changed {
            self.bus.emit();
        }
        Ok(changed)
    }

    /// Toggles one entry without disturbing the ones recorded after it.
    ///
    /// Later active entries are undone newest first, the target is toggled,
    /// then the undone entries are redone oldest first, all in one
    /// transaction. Returns whether the target changed state.
    pub fn toggle_linear(&mut self, id: &str) -> Result<bool, EngineError> {
        let Self {
            store,
            registry,
            planner,
            ..
        } = self;
        let toggled = store.atomically(|store: &mut S| -> Result<bool, EngineError> {
            let Some(target) = store.log_entry(id)? else {
                return Ok(false);
            };
            let later: Vec<OperationLogEntry> = store
                .all_log()?
                .into_iter()
                .filter(|entry| entry.seq > target.seq && !entry.reverted)
                .collect();

            let mut unwound = Vec::with_capacity(later.len());
            for entry in later.iter().rev() {
                if undo_entry(store, registry, planner, entry)? {
                    unwound.push(entry.id.clone());
                }
            }

            let toggled = if target.reverted {
                redo_entry(store, registry, planner, &target)?
            } else {
                undo_entry(store, registry, planner, &target)?
            };

            for entry_id in unwound.iter().rev() {
                let entry = store
                    .log_entry(entry_id)?
                    .ok_or_else(|| StoreError::not_found(Entity::LogEntry, entry_id.as_str()))?;
                redo_entry(store, registry, planner, &entry)?;
            }
            tracing::debug!(log = %id, replayed = unwound.len(), toggled, "linear toggle");
            Ok(toggled)
        })?;
        if toggled {
            self.bus.emit();
        }
        Ok(toggled)
    }

    /// Log entries matching `query`, newest first.
    pub fn list(&self, query: &LogQuery) -> Result<Vec<OperationLogEntry>, EngineError> {
        Ok(self.store.list_log(query)?)
    }

    /// One log entry.
    pub fn get_log(&self, id: &str) -> Result<Option<OperationLogEntry>, EngineError> {
        Ok(self.store.log_entry(id)?)
    }

    /// Re-sanitizes every stored payload. Returns the number of rows rewritten.
    pub fn compact_log(&mut self) -> Result<usize, EngineError> {
        let rewritten = self.store.atomically(|store: &mut S| -> Result<usize, EngineError> {
            let mut rewritten = 0;
            for entry in store.all_log()? {
                let compacted = sanitize(entry.decode_changes()?).encode()?;
                if compacted != entry.changes {
                    store.update_log(&entry.id, entry.reverted, entry.payload_kind, &compacted)?;
                    rewritten += 1;
                }
            }
            Ok(rewritten)
        })?;
        tracing::info!(rewritten, "operation log compacted");
        if rewritten > 0 {
            self.bus.emit();
        }
        Ok(rewritten)
    }

    /// Regenerates the day allocation of `assignment`. Returns the row count.
    pub fn recompute_day_allocation(&mut self, assignment: &Assignment) -> Result<usize, EngineError> {
        let planner = self.planner;
        let rows = self
            .store
            .atomically(|store| planner.recompute::<S, EngineError>(store, assignment))?;
        self.bus.emit();
        Ok(rows)
    }

    /// Day allocation rows dated within `[begin, end]`, grouped by date.
    pub fn day_allocations(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<DayAllocation>>, EngineError> {
        let mut days: BTreeMap<NaiveDate, Vec<DayAllocation>> = BTreeMap::new();
        for row in self.store.day_allocations_between(begin, end)? {
            days.entry(row.date).or_default().push(row);
        }
        Ok(days)
    }
}

fn redo_entry<S: Store + 'static>(
    store: &mut S,
    registry: &Registry<S>,
    planner: &Planner,
    entry: &OperationLogEntry,
) -> Result<bool, EngineError> {
    if !entry.reverted {
        return Ok(false);
    }
    let Some(op) = registry.get(entry.kind) else {
        tracing::warn!(log = %entry.id, kind = %entry.kind, "skipping entry of unregistered operation");
        return Ok(false);
    };
    let inverse = sanitize(op.apply_changes(store, planner, entry.decode_changes()?)?);
    store.update_log(&entry.id, false, inverse.kind(), &inverse.encode()?)?;
    tracing::debug!(log = %entry.id, kind = %entry.kind, "redo");
    Ok(true)
}

fn undo_entry<S: Store + 'static>(
    store: &mut S,
    registry: &Registry<S>,
    planner: &Planner,
    entry: &OperationLogEntry,
) -> Result<bool, EngineError> {
    if entry.reverted {
        return Ok(false);
    }
    let Some(op) = registry.get(entry.kind) else {
        tracing::warn!(log = %entry.id, kind = %entry.kind, "skipping entry of unregistered operation");
        return Ok(false);
    };
    let forward = sanitize(op.revert_changes(store, planner, entry.decode_changes()?)?);
    store.update_log(&entry.id, true, forward.kind(), &forward.encode()?)?;
    tracing::debug!(log = %entry.id, kind = %entry.kind, "undo");
    Ok(true)
}

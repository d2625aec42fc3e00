//! Registry of reversible operations.
//!
//! | Operation | `apply` | `revert` |
//! |---|---|---|
//! | `create-assignment` | insert row, allocate days, return assignment | delete row and days, return assignment |
//! | `modify-assignment` | overwrite, reallocate, return previous | overwrite, reallocate, return previous |
//! | `remove-assignment` | delete row and days, return deleted assignment | reinsert, reallocate, return id |
//! | `create-submission` | insert, return submission | delete, return submission |
//! | `finish-progress` | add each delta to `spent` | subtract each delta |
//!
//! For every operation `revert(apply(x))` restores the rows it governs and
//! returns `x`, and `apply(revert(y))` returns `y`.

use hashbrown::HashMap;

use crate::{
    engine::EngineError,
    model::{Assignment, ProgressDelta, Submission},
    op::{Changes, OperationKind, Payload, PayloadKind},
    persist::{Entity, Store, StoreError},
    types::AssignmentId,
};

use super::allocation::Planner;

/// Forward and inverse transition over a store.
pub trait Operation<S: Store>: Send + Sync + 'static {
    /// Input of `apply`, output of `revert`.
    type Forward: Payload;
    /// Output of `apply`, input of `revert`.
    type Inverse: Payload;

    /// Registered name.
    const KIND: OperationKind;

    /// Performs the forward mutation and returns what `revert` needs.
    fn apply(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Self::Forward,
    ) -> Result<Self::Inverse, EngineError>;

    /// Performs the inverse mutation and returns what `apply` needs.
    fn revert(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Self::Inverse,
    ) -> Result<Self::Forward, EngineError>;
}

/// Object-safe view of an [`Operation`] over untyped [`Changes`].
pub trait DynOperation<S>: Send + Sync {
    /// Registered name.
    fn kind(&self) -> OperationKind;
    /// Payload shape accepted by `apply_changes`.
    fn forward_kind(&self) -> PayloadKind;
    /// Type-checks `changes` and runs the forward transition.
    fn apply_changes(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Changes,
    ) -> Result<Changes, EngineError>;
    /// Type-checks `changes` and runs the inverse transition.
    fn revert_changes(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Changes,
    ) -> Result<Changes, EngineError>;
}

impl<S: Store, O: Operation<S>> DynOperation<S> for O {
    fn kind(&self) -> OperationKind {
        O::KIND
    }

    fn forward_kind(&self) -> PayloadKind {
        <O::Forward as Payload>::KIND
    }

    fn apply_changes(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Changes,
    ) -> Result<Changes, EngineError> {
        let input = unwrap_payload::<O::Forward>(O::KIND, changes)?;
        Ok(self.apply(store, planner, input)?.into_changes())
    }

    fn revert_changes(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Changes,
    ) -> Result<Changes, EngineError> {
        let input = unwrap_payload::<O::Inverse>(O::KIND, changes)?;
        Ok(self.revert(store, planner, input)?.into_changes())
    }
}

fn unwrap_payload<P: Payload>(kind: OperationKind, changes: Changes) -> Result<P, EngineError> {
    P::from_changes(changes).map_err(|found| EngineError::PayloadMismatch {
        kind,
        expected: P::KIND,
        found,
    })
}

/// Append-only table from operation kind to implementation.
pub struct Registry<S> {
    ops: HashMap<OperationKind, Box<dyn DynOperation<S>>>,
}

impl<S: Store + 'static> Registry<S> {
    /// Registry with no operations.
    pub fn empty() -> Self {
        Self {
            ops: HashMap::new(),
        }
    }

    /// Registry holding the five board operations.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.insert(CreateAssignment);
        registry.insert(ModifyAssignment);
        registry.insert(RemoveAssignment);
        registry.insert(CreateSubmission);
        registry.insert(FinishProgress);
        registry
    }

    fn insert<O: Operation<S>>(&mut self, op: O) {
        self.ops.insert(O::KIND, Box::new(op));
    }

    /// Adds `op`; a kind can be registered only once.
    pub fn register<O: Operation<S>>(&mut self, op: O) -> Result<(), EngineError> {
        if self.ops.contains_key(&O::KIND) {
            return Err(EngineError::AlreadyRegistered(O::KIND));
        }
        self.insert(op);
        Ok(())
    }

    /// Looks up the implementation of `kind`.
    pub fn get(&self, kind: OperationKind) -> Option<&dyn DynOperation<S>> {
        self.ops.get(&kind).map(|op| op.as_ref())
    }

    /// Returns true when `kind` is registered.
    pub fn contains(&self, kind: OperationKind) -> bool {
        self.ops.contains_key(&kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl<S: Store + 'static> Default for Registry<S> {
    fn default() -> Self {
        Self::standard()
    }
}

fn fetch_assignment<S: Store>(store: &S, id: &str) -> Result<Assignment, EngineError> {
    store
        .assignment(id)?
        .ok_or_else(|| StoreError::not_found(Entity::Assignment, id).into())
}

fn delete_assignment_rows<S: Store>(store: &mut S, id: &str) -> Result<(), EngineError> {
    store.delete_day_allocations(id)?;
    if !store.delete_assignment(id)? {
        tracing::debug!(assignment = %id, "assignment already absent");
    }
    Ok(())
}

/// Overwrites the stored assignment with `next` and returns what it replaced.
fn swap_assignment<S: Store>(
    store: &mut S,
    planner: &Planner,
    next: Assignment,
) -> Result<Assignment, EngineError> {
    let previous = fetch_assignment(store, &next.id)?;
    store.update_assignment(&next)?;
    planner.recompute::<S, EngineError>(store, &next)?;
    Ok(previous)
}

/// `create-assignment`.
pub struct CreateAssignment;

/// `modify-assignment`.
pub struct ModifyAssignment;

/// `remove-assignment`.
pub struct RemoveAssignment;

/// `create-submission`.
pub struct CreateSubmission;

/// `finish-progress`.
pub struct FinishProgress;

impl<S: Store> Operation<S> for CreateAssignment {
    type Forward = Assignment;
    type Inverse = Assignment;

    const KIND: OperationKind = OperationKind::CreateAssignment;

    fn apply(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Assignment,
    ) -> Result<Assignment, EngineError> {
        let assignment = changes.without_enrichment();
        store.insert_assignment(&assignment)?;
        planner.recompute::<S, EngineError>(store, &assignment)?;
        Ok(assignment)
    }

    fn revert(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: Assignment,
    ) -> Result<Assignment, EngineError> {
        delete_assignment_rows(store, &changes.id)?;
        Ok(changes)
    }
}

impl<S: Store> Operation<S> for ModifyAssignment {
    type Forward = Assignment;
    type Inverse = Assignment;

    const KIND: OperationKind = OperationKind::ModifyAssignment;

    fn apply(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Assignment,
    ) -> Result<Assignment, EngineError> {
        swap_assignment(store, planner, changes)
    }

    fn revert(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Assignment,
    ) -> Result<Assignment, EngineError> {
        swap_assignment(store, planner, changes)
    }
}

impl<S: Store> Operation<S> for RemoveAssignment {
    type Forward = AssignmentId;
    type Inverse = Assignment;

    const KIND: OperationKind = OperationKind::RemoveAssignment;

    fn apply(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: AssignmentId,
    ) -> Result<Assignment, EngineError> {
        let removed = fetch_assignment(store, &changes)?;
        delete_assignment_rows(store, &changes)?;
        Ok(removed)
    }

    fn revert(
        &self,
        store: &mut S,
        planner: &Planner,
        changes: Assignment,
    ) -> Result<AssignmentId, EngineError> {
        store.insert_assignment(&changes)?;
        planner.recompute::<S, EngineError>(store, &changes)?;
        Ok(changes.id)
    }
}

impl<S: Store> Operation<S> for CreateSubmission {
    type Forward = Submission;
    type Inverse = Submission;

    const KIND: OperationKind = OperationKind::CreateSubmission;

    fn apply(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: Submission,
    ) -> Result<Submission, EngineError> {
        store.insert_submission(&changes)?;
        Ok(changes)
    }

    fn revert(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: Submission,
    ) -> Result<Submission, EngineError> {
        if !store.delete_submission(&changes.id)? {
            tracing::debug!(submission = %changes.id, "submission already absent");
        }
        Ok(changes)
    }
}

impl<S: Store> Operation<S> for FinishProgress {
    type Forward = Vec<ProgressDelta>;
    type Inverse = Vec<ProgressDelta>;

    const KIND: OperationKind = OperationKind::FinishProgress;

    fn apply(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: Vec<ProgressDelta>,
    ) -> Result<Vec<ProgressDelta>, EngineError> {
        for step in &changes {
            store.add_spent(&step.assignment, step.delta)?;
        }
        Ok(changes)
    }

    fn revert(
        &self,
        store: &mut S,
        _planner: &Planner,
        changes: Vec<ProgressDelta>,
    ) -> Result<Vec<ProgressDelta>, EngineError> {
        for step in &changes {
            store.add_spent(&step.assignment, -step.delta)?;
        }
        Ok(changes)
    }
}

//! # Optimistic Mutator
//!
//! Applies mutations to a [`Collection`] before the server has seen them, and settles
//! them once it has.
//!
//! The failure policy depends on what was mutated:
//!
//! | Mutation | On failure | Message |
//! |----------|------------|---------|
//! | Create | placeholder stays, flagged [`RecordState::Unconfirmed`] | warning |
//! | Edit of a confirmed record | last confirmed value restored | error |
//!
//! A user who just added something keeps seeing it (it can be retried later), while
//! an edit never leaves the screen showing a value the server does not have.
//!
//! [`RecordState::Unconfirmed`]: crate::view::RecordState::Unconfirmed

use tracing::debug;

use crate::commands::SyncMessage;
use crate::error::{PlannerError, Result};
use crate::model::{FieldPatch, Record, RecordId, Schema};
use crate::view::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the local record visible, flagged as not saved.
    KeepUnconfirmed,
    /// Restore the last authoritative value and report an error.
    Revert,
}

impl MutationKind {
    /// Placeholders are always creations, whatever was edited on them since.
    pub fn of(id: &RecordId) -> Self {
        if id.is_placeholder() {
            MutationKind::Create
        } else {
            MutationKind::Edit
        }
    }

    pub fn failure_policy(self) -> FailurePolicy {
        match self {
            MutationKind::Create => FailurePolicy::KeepUnconfirmed,
            MutationKind::Edit => FailurePolicy::Revert,
        }
    }
}

pub struct OptimisticMutator<'a, S> {
    view: &'a mut Collection<S>,
}

impl<'a, S: Schema> OptimisticMutator<'a, S> {
    pub fn new(view: &'a mut Collection<S>) -> Self {
        Self { view }
    }

    /// Show a new record under a placeholder id right away.
    pub fn apply_create(&mut self, fields: S) -> Result<RecordId> {
        fields.validate()?;
        let id = RecordId::placeholder();
        debug!(resource = %S::KIND, id = %id, "optimistic create");
        self.view.insert_placeholder(Record::new(id.clone(), fields));
        Ok(id)
    }

    /// Show an edit right away. The patch is checked against the schema first, so an
    /// invalid edit changes nothing.
    pub fn apply_edit(&mut self, id: &RecordId, patch: &FieldPatch) -> Result<()> {
        let current = self
            .view
            .get(id)
            .ok_or_else(|| PlannerError::RecordNotFound(id.to_string()))?;
        let patched = patch.apply(&current.fields)?;
        self.view.set_local(id, patched);
        debug!(resource = %S::KIND, id = %id, fields = patch.len(), "optimistic edit");
        Ok(())
    }

    /// Replace the optimistic version with the server's.
    pub fn confirm(&mut self, local_id: &RecordId, record: Record<S>) {
        debug!(resource = %S::KIND, local = %local_id, id = %record.id, "confirmed");
        self.view.confirm(local_id, record);
    }

    /// Settle a failed save according to its [`FailurePolicy`].
    pub fn fail(&mut self, id: &RecordId, error: &PlannerError) -> SyncMessage {
        let label = S::KIND.label();
        let summary = self
            .view
            .get(id)
            .map(|r| r.fields.summary())
            .unwrap_or_else(|| id.to_string());

        match MutationKind::of(id).failure_policy() {
            FailurePolicy::KeepUnconfirmed => {
                self.view.mark_unconfirmed(id);
                SyncMessage::warning(format!(
                    "Could not save new {} \"{}\" ({}). It is kept locally and will be retried.",
                    label, summary, error
                ))
                .for_record(id)
            }
            FailurePolicy::Revert => {
                if !self.view.revert(id) {
                    self.view.mark_unconfirmed(id);
                }
                SyncMessage::error(format!(
                    "Could not save changes to {} \"{}\" ({}). The last saved version was restored.",
                    label, summary, error
                ))
                .for_record(id)
            }
        }
    }
}

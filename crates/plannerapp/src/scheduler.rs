//! # Debounced Persistence Scheduler
//!
//! Coalesces a burst of edits into one deferred save.
//!
//! ```text
//!            edit                      edit (any record)
//!   Idle ──────────► Armed(deadline) ◄──────────────┐
//!    ▲                 │        │                    │ deadline = now + delay
//!    │   deadline hit  │        └────────────────────┘
//!    └─────────────────┘  or flush
//!        (edits handed out for dispatch)
//! ```
//!
//! Every edit re-arms the single deadline at the full delay. Edits to the same
//! record coalesce into one [`PendingEdit`] with last-write-wins per field, so a
//! superseded value is never handed out after a newer one.
//!
//! The scheduler owns no timer. Callers ask [`DebounceScheduler::take_due`] with the
//! current time, which keeps it deterministic under a manual clock.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::time::Duration;

use crate::clock::after;
use crate::model::{FieldPatch, RecordId};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub record_id: RecordId,
    pub fields: FieldPatch,
    /// When the latest edit for this record arrived.
    pub armed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Armed {
        deadline: DateTime<Utc>,
        edits: IndexMap<RecordId, PendingEdit>,
    },
}

#[derive(Debug)]
pub struct DebounceScheduler {
    delay: Duration,
    state: State,
}

impl DebounceScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: State::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed { .. })
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            State::Idle => None,
            State::Armed { deadline, .. } => Some(*deadline),
        }
    }

    /// Queue an edit and re-arm. Returns the new deadline.
    pub fn edit(&mut self, id: RecordId, patch: FieldPatch, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = after(now, self.delay);
        if let State::Idle = self.state {
            self.state = State::Armed {
                deadline,
                edits: IndexMap::new(),
            };
        }
        let State::Armed {
            deadline: current,
            edits,
        } = &mut self.state
        else {
            return deadline;
        };
        *current = deadline;

        match edits.get_mut(&id) {
            Some(pending) => {
                pending.fields.merge(patch);
                pending.armed_at = now;
            }
            None => {
                edits.insert(
                    id.clone(),
                    PendingEdit {
                        record_id: id,
                        fields: patch,
                        armed_at: now,
                    },
                );
            }
        }
        deadline
    }

    /// Hand out every queued edit if the deadline has passed, returning to Idle.
    /// Empty while Idle or before the deadline.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PendingEdit> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.flush(),
            _ => Vec::new(),
        }
    }

    /// Cancel the deadline and hand out every queued edit now.
    pub fn flush(&mut self) -> Vec<PendingEdit> {
        match std::mem::take(&mut self.state) {
            State::Idle => Vec::new(),
            State::Armed { edits, .. } => edits.into_values().collect(),
        }
    }

    /// Drop the queued edit for one record. The scheduler goes Idle when nothing is
    /// left.
    pub fn cancel(&mut self, id: &RecordId) -> Option<PendingEdit> {
        let State::Armed { edits, .. } = &mut self.state else {
            return None;
        };
        let removed = edits.shift_remove(id);
        if edits.is_empty() {
            self.state = State::Idle;
        }
        removed
    }

    pub fn pending(&self, id: &RecordId) -> Option<&PendingEdit> {
        match &self.state {
            State::Idle => None,
            State::Armed { edits, .. } => edits.get(id),
        }
    }

    pub fn pending_count(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Armed { edits, .. } => edits.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{to_delta, Clock, ManualClock};
    use serde_json::json;

    const DELAY: Duration = Duration::from_secs(2);

    #[test]
    fn test_edit_arms_from_idle() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        assert!(!scheduler.is_armed());

        let deadline = scheduler.edit("7".into(), FieldPatch::new().set("text", "a"), clock.now());
        assert!(scheduler.is_armed());
        assert_eq!(deadline, clock.now() + to_delta(DELAY));
    }

    #[test]
    fn test_huge_delay_does_not_overflow() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(Duration::from_millis(u64::MAX));
        let deadline = scheduler.edit("7".into(), FieldPatch::new().set("text", "a"), clock.now());
        assert_eq!(deadline, DateTime::<Utc>::MAX_UTC);
        assert!(scheduler.take_due(clock.now()).is_empty());
        assert_eq!(scheduler.flush().len(), 1);
    }

    #[test]
    fn test_edits_coalesce_per_record() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        scheduler.edit(
            "1".into(),
            FieldPatch::new().set("title", "Draft").set("category", "Academic"),
            clock.now(),
        );
        clock.advance(Duration::from_millis(500));
        scheduler.edit("1".into(), FieldPatch::new().set("title", "Final"), clock.now());

        let edits = scheduler.flush();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].fields.get("title"), Some(&json!("Final")));
        assert_eq!(edits[0].fields.get("category"), Some(&json!("Academic")));
        assert_eq!(edits[0].armed_at, clock.now());
    }

    #[test]
    fn test_new_edit_restarts_full_delay() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        scheduler.edit("1".into(), FieldPatch::new().set("text", "a"), clock.now());

        clock.advance(Duration::from_millis(1500));
        scheduler.edit("2".into(), FieldPatch::new().set("text", "b"), clock.now());

        clock.advance(Duration::from_millis(1000));
        assert!(scheduler.take_due(clock.now()).is_empty());

        clock.advance(Duration::from_millis(1000));
        let due = scheduler.take_due(clock.now());
        assert_eq!(due.len(), 2);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_due_exactly_at_deadline() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        scheduler.edit("1".into(), FieldPatch::new().set("text", "a"), clock.now());
        clock.advance(DELAY);
        assert_eq!(scheduler.take_due(clock.now()).len(), 1);
    }

    #[test]
    fn test_flush_while_idle_is_empty() {
        let mut scheduler = DebounceScheduler::new(DELAY);
        assert!(scheduler.flush().is_empty());
        assert_eq!(scheduler.deadline(), None);
    }

    #[test]
    fn test_cancel_last_edit_goes_idle() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        scheduler.edit("1".into(), FieldPatch::new().set("text", "a"), clock.now());
        scheduler.edit("2".into(), FieldPatch::new().set("text", "b"), clock.now());

        assert!(scheduler.cancel(&"1".into()).is_some());
        assert!(scheduler.is_armed());
        assert!(scheduler.cancel(&"2".into()).is_some());
        assert!(!scheduler.is_armed());
        assert!(scheduler.cancel(&"3".into()).is_none());
    }

    #[test]
    fn test_flush_preserves_first_edit_order() {
        let clock = ManualClock::at_epoch();
        let mut scheduler = DebounceScheduler::new(DELAY);
        for id in ["3", "1", "2"] {
            scheduler.edit(id.into(), FieldPatch::new().set("text", id), clock.now());
        }
        scheduler.edit("3".into(), FieldPatch::new().set("text", "again"), clock.now());
        let order: Vec<String> = scheduler
            .flush()
            .into_iter()
            .map(|e| e.record_id.to_string())
            .collect();
        assert_eq!(order, vec!["3", "1", "2"]);
    }
}

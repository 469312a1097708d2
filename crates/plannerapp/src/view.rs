//! # Visible Collection
//!
//! [`Collection`] is what one UI surface shows for one resource: records in display
//! order, each with a [`RecordState`], plus the pagination state of the last page.
//!
//! Every slot remembers the last authoritative version of its record (the
//! *confirmed* copy). Local edits change the visible value only; a failed edit puts
//! the confirmed copy back. Placeholders have no confirmed copy.
//!
//! ## Absorbing pages
//!
//! [`Collection::absorb`] installs a reconciled result. Records that were part of
//! the incoming page replace whatever is visible, even a pending local edit: a page
//! fetched before an edit was confirmed can overwrite it. The pending edit itself is
//! still queued and will land when it is dispatched. Records not in the incoming
//! page keep their local state. Placeholders stay at the top, and records with
//! unsaved local changes survive a reset (a refresh or a new query) at the bottom
//! until their save settles.
//!
//! ## Fetch generations
//!
//! Each fetch takes a [`FetchTicket`]. Only the ticket of the most recent fetch is
//! accepted, and nothing is accepted once the collection is closed, so a late or
//! superseded response can be dropped.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::model::{Record, RecordId, Schema};
use crate::reconcile::Merged;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Matches the server as far as we know.
    Confirmed,
    /// Changed locally; a save is queued or in flight.
    Pending,
    /// A creation the server never confirmed. Visible, flagged, retried on resync.
    Unconfirmed,
}

#[derive(Debug, Clone)]
struct Slot<S> {
    record: Record<S>,
    state: RecordState,
    confirmed: Option<S>,
    // Kept across a reset only for its unsaved changes; not part of the query.
    carried: bool,
}

impl<S: Clone> Slot<S> {
    fn confirmed(record: Record<S>) -> Self {
        Self {
            confirmed: Some(record.fields.clone()),
            record,
            state: RecordState::Confirmed,
            carried: false,
        }
    }
}

/// Proof that a fetch was started; see [`Collection::accepts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// A removed slot and where it was, so a failed delete can put it back.
#[derive(Debug, Clone)]
pub struct Removed<S> {
    index: usize,
    slot: Slot<S>,
}

#[derive(Debug, Clone)]
pub struct Collection<S> {
    slots: IndexMap<RecordId, Slot<S>>,
    cursor: Option<String>,
    has_more: bool,
    loaded: bool,
    generation: u64,
    closed: bool,
}

impl<S> Default for Collection<S> {
    fn default() -> Self {
        Self {
            slots: IndexMap::new(),
            cursor: None,
            has_more: false,
            loaded: false,
            generation: 0,
            closed: false,
        }
    }
}

impl<S: Schema> Collection<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record<S>> {
        self.slots.values().map(|slot| &slot.record)
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record<S>> {
        self.slots.get(id).map(|slot| &slot.record)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn state(&self, id: &RecordId) -> Option<RecordState> {
        self.slots.get(id).map(|slot| slot.state)
    }

    /// Last authoritative field values of a record.
    pub fn confirmed(&self, id: &RecordId) -> Option<&S> {
        self.slots.get(id).and_then(|slot| slot.confirmed.as_ref())
    }

    /// Whether the record is only shown because it still has unsaved changes from
    /// before the last reset.
    pub fn is_carried(&self, id: &RecordId) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.carried)
    }

    /// Authoritative versions of every server-known record of the current query, in
    /// display order. This is what the cache is allowed to hold.
    pub fn confirmed_records(&self) -> Vec<Record<S>> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.carried)
            .filter_map(|(id, slot)| {
                slot.confirmed
                    .as_ref()
                    .map(|fields| Record::new(id.clone(), fields.clone()))
            })
            .collect()
    }

    pub fn ids_in_state(&self, state: RecordState) -> Vec<RecordId> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.state == state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether any page has been installed yet.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // --- Fetch generations ---

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket(self.generation)
    }

    pub fn accepts(&self, ticket: FetchTicket) -> bool {
        !self.closed && ticket.0 == self.generation
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Install a reconciled result. `incoming` names the ids the server just sent.
    pub fn absorb(&mut self, merged: Merged<S>, incoming: &HashSet<RecordId>) {
        let mut previous = std::mem::take(&mut self.slots);
        let mut next = IndexMap::with_capacity(merged.records.len() + previous.len());

        for (id, slot) in previous.iter() {
            if id.is_placeholder() {
                next.insert(id.clone(), slot.clone());
            }
        }
        for record in merged.records {
            let local = previous.shift_remove(&record.id);
            let slot = match local {
                Some(slot) if !incoming.contains(&record.id) => slot,
                _ => Slot::confirmed(record),
            };
            next.insert(slot.record.id.clone(), slot);
        }
        for (id, mut slot) in previous {
            if !id.is_placeholder() && slot.state != RecordState::Confirmed {
                slot.carried = true;
                next.insert(id, slot);
            }
        }

        self.slots = next;
        self.cursor = merged.next_cursor;
        self.has_more = merged.has_more;
        self.loaded = true;
    }

    // --- Optimistic mutation hooks (driven by the mutator) ---

    pub(crate) fn insert_placeholder(&mut self, record: Record<S>) {
        let slot = Slot {
            record,
            state: RecordState::Pending,
            confirmed: None,
            carried: false,
        };
        self.slots.shift_insert(0, slot.record.id.clone(), slot);
    }

    /// Show new local field values. Returns false for unknown ids.
    pub(crate) fn set_local(&mut self, id: &RecordId, fields: S) -> bool {
        match self.slots.get_mut(id) {
            Some(slot) => {
                slot.record.fields = fields;
                slot.state = RecordState::Pending;
                true
            }
            None => false,
        }
    }

    /// Install the server's version of a record, under its authoritative id. When
    /// `local_id` differs (a placeholder), the record takes over its position.
    pub(crate) fn confirm(&mut self, local_id: &RecordId, record: Record<S>) {
        let mut slot = Slot::confirmed(record);
        match self.slots.shift_remove_full(local_id) {
            Some((index, _, previous)) => {
                slot.carried = previous.carried;
                self.place(index, slot)
            }
            None => {
                self.slots.insert(slot.record.id.clone(), slot);
            }
        }
    }

    pub(crate) fn mark_unconfirmed(&mut self, id: &RecordId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.state = RecordState::Unconfirmed;
        }
    }

    pub(crate) fn mark_pending(&mut self, id: &RecordId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.state = RecordState::Pending;
        }
    }

    /// Put the confirmed copy back. Returns false when there is none.
    pub(crate) fn revert(&mut self, id: &RecordId) -> bool {
        let Some(slot) = self.slots.get_mut(id) else {
            return false;
        };
        match &slot.confirmed {
            Some(fields) => {
                slot.record.fields = fields.clone();
                slot.state = RecordState::Confirmed;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> Option<Removed<S>> {
        self.slots
            .shift_remove_full(id)
            .map(|(index, _, slot)| Removed { index, slot })
    }

    pub(crate) fn restore(&mut self, removed: Removed<S>) {
        self.place(removed.index, removed.slot);
    }

    // Insert at `index`, or move there when the id is already present.
    fn place(&mut self, index: usize, slot: Slot<S>) {
        let last = if self.slots.contains_key(&slot.record.id) {
            self.slots.len().saturating_sub(1)
        } else {
            self.slots.len()
        };
        self.slots
            .shift_insert(index.min(last), slot.record.id.clone(), slot);
    }
}

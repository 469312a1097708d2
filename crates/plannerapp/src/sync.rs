//! # Resource Sync
//!
//! [`ResourceSync`] is what one UI surface holds for one resource: it owns the
//! visible [`Collection`], the [`DebounceScheduler`] for its edits, and shares the
//! remote client and the cache with every other surface.
//!
//! ## Read path
//!
//! ```text
//! load(query) ──► cache hit? ──yes──► show entry            (LoadOutcome::Cache)
//!                    │ no
//!                    ▼
//!               fetch page 1 ──ok──► reconcile ► show        (LoadOutcome::Remote)
//!                    │ err
//!                    ▼
//!               keep what is shown, log                      (LoadOutcome::Degraded)
//! ```
//!
//! Read failures never produce a message; the caller offers a retry (`refresh`).
//!
//! ## Write path
//!
//! `create` and `edit` are synchronous: the mutation is visible on return and a
//! save is scheduled. The save happens in `tick` (deadline passed), `flush` (save
//! now) or `close`. Placeholders are sent as creations with their full current
//! fields, everything else as one partial update per record.
//!
//! A failed save is retried after a fixed backoff when the server said it was
//! overloaded, and also on plain network failures for schemas that opt in with
//! [`Schema::RETRY_TRANSIENT`]. What still fails is settled by the
//! [`OptimisticMutator`] and always reported in the returned [`SyncReport`].
//!
//! ## Known race
//!
//! A page fetched before an edit was confirmed can arrive after the confirmation
//! and show the older server value. The fetch is not cancelled by the edit; see
//! [`Collection::absorb`].

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::{CacheKey, LocalCache};
use crate::clock::{elapsed, Clock};
use crate::commands::{LoadOutcome, SyncMessage, SyncReport};
use crate::config::SyncConfig;
use crate::error::{PlannerError, Result};
use crate::model::{FieldPatch, Page, PageQuery, Record, RecordId, Schema};
use crate::mutator::OptimisticMutator;
use crate::reconcile::{Merged, Reconciler};
use crate::remote::RemoteStore;
use crate::scheduler::{DebounceScheduler, PendingEdit};
use crate::view::{Collection, FetchTicket, RecordState};

/// One surface's view of one resource.
///
/// Call [`close`](Self::close) when the surface goes away: it flushes queued
/// edits before it stops accepting responses. Dropping the value without closing
/// it cannot send anything, and queued edits are lost.
pub struct ResourceSync<S, R, B> {
    remote: Arc<R>,
    reconciler: Reconciler<B>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    query: PageQuery,
    key: CacheKey,
    view: Collection<S>,
    scheduler: DebounceScheduler,
}

impl<S: Schema, R: RemoteStore, B: CacheBackend> ResourceSync<S, R, B> {
    pub fn new(
        remote: Arc<R>,
        cache: Arc<LocalCache<B>>,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            remote,
            reconciler: Reconciler::new(cache, clock.clone()),
            clock,
            query: PageQuery::new().with_limit(config.page_size),
            key: CacheKey::resource(S::KIND),
            view: Collection::new(),
            scheduler: DebounceScheduler::new(config.debounce_for(S::SAVE_MODE)),
            config: config.clone(),
        }
    }

    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn view(&self) -> &Collection<S> {
        &self.view
    }

    pub fn records(&self) -> impl Iterator<Item = &Record<S>> {
        self.view.records()
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record<S>> {
        self.view.get(id)
    }

    pub fn state(&self, id: &RecordId) -> Option<RecordState> {
        self.view.state(id)
    }

    pub fn cache(&self) -> &LocalCache<B> {
        self.reconciler.cache()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// When the next scheduled save is due, if one is armed.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.scheduler.deadline()
    }

    /// Queued edits or saves that failed and are waiting for `resync`.
    pub fn has_unsaved_changes(&self) -> bool {
        self.scheduler.pending_count() > 0
            || !self.view.ids_in_state(RecordState::Unconfirmed).is_empty()
    }

    // --- Read path ---

    /// Show the first page for `query`, from the cache when it is fresh.
    pub async fn load(&mut self, query: PageQuery) -> LoadOutcome {
        let limit = query.limit.unwrap_or(self.config.page_size);
        self.query = query.with_limit(limit).with_cursor(None);
        self.key = CacheKey::new(S::KIND, &self.query);

        match self.reconciler.cache().get::<S>(&self.key) {
            Ok(Some(entry)) => {
                // Anything still in flight is older than this.
                self.view.begin_fetch();
                let incoming: HashSet<RecordId> =
                    entry.records.iter().map(|r| r.id.clone()).collect();
                let merged = Merged {
                    records: entry.records,
                    next_cursor: entry.cursor,
                    has_more: entry.has_more,
                };
                self.view.absorb(merged, &incoming);
                return LoadOutcome::Cache;
            }
            Ok(None) => {}
            Err(e) => warn!(key = %self.key, error = %e, "cache read failed"),
        }
        self.fetch(None, true).await
    }

    /// Drop the cached entry and fetch the first page again.
    pub async fn refresh(&mut self) -> LoadOutcome {
        if let Err(e) = self.reconciler.cache().invalidate(&self.key) {
            warn!(key = %self.key, error = %e, "cache invalidation failed");
        }
        self.fetch(None, true).await
    }

    /// Fetch the page after the last one shown.
    pub async fn load_more(&mut self) -> LoadOutcome {
        if self.view.is_loaded() && !self.view.has_more() {
            return LoadOutcome::Exhausted;
        }
        // Continuing from nothing is a first load.
        let reset = !self.view.is_loaded();
        let cursor = self.view.cursor().map(str::to_string);
        self.fetch(cursor, reset).await
    }

    /// First half of a fetch: a ticket and the query to send.
    ///
    /// Callers running the request themselves hand the outcome to
    /// [`apply_fetch`](Self::apply_fetch) with the same ticket.
    pub fn prepare_fetch(&mut self, cursor: Option<String>) -> (FetchTicket, PageQuery) {
        let ticket = self.view.begin_fetch();
        (ticket, self.query.clone().with_cursor(cursor))
    }

    /// Second half of a fetch. `reset` replaces the shown records instead of
    /// appending to them.
    pub fn apply_fetch(
        &mut self,
        ticket: FetchTicket,
        reset: bool,
        result: Result<Page<S>>,
    ) -> LoadOutcome {
        if !self.view.accepts(ticket) {
            debug!(key = %self.key, "discarding superseded response");
            return LoadOutcome::Discarded;
        }
        match result {
            Ok(page) => {
                let existing = if reset {
                    Vec::new()
                } else {
                    self.view.confirmed_records()
                };
                let incoming: HashSet<RecordId> =
                    page.records.iter().map(|r| r.id.clone()).collect();
                let merged = self.reconciler.apply_page(&self.key, &existing, &page);
                self.view.absorb(merged, &incoming);
                LoadOutcome::Remote
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "fetch failed, keeping current records");
                LoadOutcome::Degraded
            }
        }
    }

    async fn fetch(&mut self, cursor: Option<String>, reset: bool) -> LoadOutcome {
        let (ticket, query) = self.prepare_fetch(cursor);
        let result = self.remote.fetch_page::<S>(&query).await;
        self.apply_fetch(ticket, reset, result)
    }

    // --- Write path ---

    /// Show a new record now and schedule its creation.
    pub fn create(&mut self, fields: S) -> Result<RecordId> {
        let id = OptimisticMutator::new(&mut self.view).apply_create(fields)?;
        self.scheduler
            .edit(id.clone(), FieldPatch::new(), self.clock.now());
        Ok(id)
    }

    /// Show an edit now and schedule it, coalescing with earlier edits to the
    /// same record.
    pub fn edit(&mut self, id: &RecordId, patch: FieldPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        OptimisticMutator::new(&mut self.view).apply_edit(id, &patch)?;
        let deadline = self.scheduler.edit(id.clone(), patch, self.clock.now());
        debug!(resource = %S::KIND, id = %id, deadline = %deadline, "save scheduled");
        Ok(())
    }

    /// Dispatch the queued edits if their deadline has passed.
    pub async fn tick(&mut self) -> SyncReport {
        let due = self.scheduler.take_due(self.clock.now());
        self.dispatch(due).await
    }

    /// Dispatch the queued edits now.
    pub async fn flush(&mut self) -> SyncReport {
        let edits = self.scheduler.flush();
        self.dispatch(edits).await
    }

    /// Wait out the debounce and dispatch, until nothing is armed.
    pub async fn settle(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        while let Some(deadline) = self.scheduler.deadline() {
            self.clock.sleep(elapsed(self.clock.now(), deadline)).await;
            report.absorb(self.tick().await);
        }
        report
    }

    /// Requeue creations that failed earlier and dispatch them now.
    pub async fn resync(&mut self) -> SyncReport {
        let now = self.clock.now();
        for id in self.view.ids_in_state(RecordState::Unconfirmed) {
            self.view.mark_pending(&id);
            self.scheduler.edit(id, FieldPatch::new(), now);
        }
        self.flush().await
    }

    /// Save what is pending, then stop accepting responses.
    pub async fn close(&mut self) -> SyncReport {
        let report = self.flush().await;
        self.view.close();
        report
    }

    /// Remove a record now and delete it on the server. A failed delete puts the
    /// record back where it was.
    pub async fn remove(&mut self, id: &RecordId) -> Result<SyncReport> {
        let cancelled = self.scheduler.cancel(id);
        let Some(removed) = self.view.remove(id) else {
            return Err(PlannerError::RecordNotFound(id.to_string()));
        };
        let label = S::KIND.label();
        let mut report = SyncReport::default();

        if id.is_placeholder() {
            report.confirmed.push(id.clone());
            report.add_message(
                SyncMessage::info(format!("Discarded unsaved {}", label)).for_record(id),
            );
            return Ok(report);
        }

        report.requests += 1;
        let remote = &self.remote;
        let first = remote.delete::<S>(id).await;
        let result = self
            .retry(&mut report, first, move || remote.delete::<S>(id))
            .await;

        match result {
            Ok(existed) => {
                if !existed {
                    debug!(resource = %S::KIND, id = %id, "already gone on the server");
                }
                self.reconciler.remove::<S>(id);
                report.confirmed.push(id.clone());
                report.add_message(
                    SyncMessage::success(format!("Removed {} {}", label, id)).for_record(id),
                );
            }
            Err(e) => {
                warn!(resource = %S::KIND, id = %id, error = %e, "delete failed, restoring");
                self.view.restore(removed);
                if let Some(pending) = cancelled {
                    self.scheduler
                        .edit(pending.record_id, pending.fields, self.clock.now());
                }
                report.failed.push(id.clone());
                report.add_message(
                    SyncMessage::error(format!("Could not remove {} {} ({})", label, id, e))
                        .for_record(id),
                );
            }
        }
        Ok(report)
    }

    async fn dispatch(&mut self, edits: Vec<PendingEdit>) -> SyncReport {
        let mut report = SyncReport::default();
        if edits.is_empty() {
            return report;
        }
        info!(resource = %S::KIND, count = edits.len(), "dispatching saves");

        let (creates, updates): (Vec<_>, Vec<_>) = edits
            .into_iter()
            .partition(|edit| edit.record_id.is_placeholder());

        for edit in creates {
            self.dispatch_create(edit.record_id, &mut report).await;
        }

        let batch: Vec<(RecordId, FieldPatch)> = updates
            .into_iter()
            .map(|edit| (edit.record_id, edit.fields))
            .collect();
        if batch.is_empty() {
            return report;
        }
        report.requests += batch.len();
        let results = self.remote.update_many::<S>(&batch).await;
        for ((id, patch), first) in batch.into_iter().zip(results) {
            let remote = &self.remote;
            let (rid, rpatch) = (&id, &patch);
            let result = self
                .retry(&mut report, first, move || remote.update::<S>(rid, rpatch))
                .await;
            self.settle_update(id, result, &mut report);
        }
        report
    }

    async fn dispatch_create(&mut self, local_id: RecordId, report: &mut SyncReport) {
        let Some(fields) = self.view.get(&local_id).map(|r| r.fields.clone()) else {
            warn!(resource = %S::KIND, id = %local_id, "queued creation has no local record");
            return;
        };
        report.requests += 1;
        let (remote, fields) = (&self.remote, &fields);
        let first = remote.create::<S>(fields).await;
        let result = self
            .retry(report, first, move || remote.create::<S>(fields))
            .await;

        match result {
            Ok(record) => {
                self.reconciler.upsert(&self.key, &record, Some(&local_id));
                report.add_message(
                    SyncMessage::success(format!(
                        "Saved {} \"{}\"",
                        S::KIND.label(),
                        record.fields.summary()
                    ))
                    .for_record(&record.id),
                );
                report.confirmed.push(record.id.clone());
                OptimisticMutator::new(&mut self.view).confirm(&local_id, record);
            }
            Err(e) => {
                warn!(resource = %S::KIND, id = %local_id, error = %e, "create failed");
                let message = OptimisticMutator::new(&mut self.view).fail(&local_id, &e);
                report.failed.push(local_id);
                report.add_message(message);
            }
        }
    }

    fn settle_update(&mut self, id: RecordId, result: Result<Record<S>>, report: &mut SyncReport) {
        match result {
            Ok(record) => {
                // Only records of the current query may be added to its entry.
                if self.view.contains(&id) && !self.view.is_carried(&id) {
                    self.reconciler.upsert(&self.key, &record, None);
                } else {
                    self.reconciler.replace(&record);
                }
                report.confirmed.push(record.id.clone());
                if self.view.contains(&id) {
                    OptimisticMutator::new(&mut self.view).confirm(&id, record);
                }
            }
            Err(PlannerError::RecordNotFound(_)) => {
                warn!(resource = %S::KIND, id = %id, "record vanished on the server");
                self.view.remove(&id);
                self.reconciler.remove::<S>(&id);
                report.add_message(
                    SyncMessage::error(format!(
                        "{} {} no longer exists on the server",
                        capitalize(S::KIND.label()),
                        id
                    ))
                    .for_record(&id),
                );
                report.failed.push(id);
            }
            Err(e) => {
                warn!(resource = %S::KIND, id = %id, error = %e, "update failed");
                let message = OptimisticMutator::new(&mut self.view).fail(&id, &e);
                report.failed.push(id);
                report.add_message(message);
            }
        }
    }

    fn should_retry(&self, error: &PlannerError) -> bool {
        error.is_unavailable() || (S::RETRY_TRANSIENT && error.is_transient())
    }

    /// Resend while the outcome is retryable, up to `max_retries` times, sleeping
    /// the fixed backoff before each attempt.
    async fn retry<T, F, Fut>(
        &self,
        report: &mut SyncReport,
        mut outcome: Result<T>,
        mut again: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match outcome {
                Err(e) if attempt < self.config.max_retries && self.should_retry(&e) => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff();
                    warn!(
                        resource = %S::KIND,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "save failed, retrying"
                    );
                    self.clock.sleep(backoff).await;
                    report.requests += 1;
                    outcome = again().await;
                }
                other => return other,
            }
        }
    }
}

impl<S, R, B> Drop for ResourceSync<S, R, B> {
    fn drop(&mut self) {
        let pending = self.scheduler.pending_count();
        if pending > 0 {
            warn!(
                pending,
                "sync surface dropped without close(); its queued edits are lost"
            );
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! # Reconciler
//!
//! Folds authoritative server data into cached and visible state.
//!
//! [`merge`] is the pure algorithm: concatenate the records we already hold with an
//! incoming page and deduplicate by id, the later occurrence winning. A record keeps
//! the position of its first appearance so a list does not jump around when a
//! refreshed version arrives. Pagination state (`next_cursor`, `has_more`) is taken
//! from the incoming page unconditionally; the server owns it.
//!
//! Merging the same page twice gives the same result as merging it once.
//!
//! [`Reconciler`] is the only writer of the [`LocalCache`]. Cache writes are best
//! effort: a failed write is logged and the merged result is still returned, since
//! the visible state must not depend on the disk.

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::{CacheEntry, CacheKey, LocalCache};
use crate::clock::Clock;
use crate::error::Result;
use crate::model::{Page, Record, RecordId, Schema};

#[derive(Debug, Clone)]
pub struct Merged<S> {
    pub records: Vec<Record<S>>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

pub fn merge<S: Clone>(existing: &[Record<S>], page: &Page<S>) -> Merged<S> {
    let mut by_id: IndexMap<RecordId, Record<S>> =
        IndexMap::with_capacity(existing.len() + page.records.len());
    for record in existing.iter().chain(page.records.iter()) {
        by_id.insert(record.id.clone(), record.clone());
    }
    Merged {
        records: by_id.into_values().collect(),
        next_cursor: page.cursor.clone(),
        has_more: page.has_more,
    }
}

pub struct Reconciler<B> {
    cache: Arc<LocalCache<B>>,
    clock: Arc<dyn Clock>,
}

impl<B: CacheBackend> Reconciler<B> {
    pub fn new(cache: Arc<LocalCache<B>>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    pub fn cache(&self) -> &LocalCache<B> {
        &self.cache
    }

    /// Merge a fetched page into `existing` and store the result under `key` with a
    /// fresh fetch time. Pass an empty `existing` for a first page or a refetch.
    pub fn apply_page<S: Schema>(
        &self,
        key: &CacheKey,
        existing: &[Record<S>],
        page: &Page<S>,
    ) -> Merged<S> {
        let merged = merge(existing, page);
        let entry = CacheEntry {
            resource_key: S::KIND.key().to_string(),
            records: merged.records.clone(),
            cursor: merged.next_cursor.clone(),
            has_more: merged.has_more,
            fetched_at: self.clock.now(),
        };
        debug!(
            key = %key,
            incoming = page.records.len(),
            total = merged.records.len(),
            has_more = merged.has_more,
            "page reconciled"
        );
        self.persist(key, &entry);
        merged
    }

    /// Fold a confirmed record into the cache.
    ///
    /// `key` is the entry the change was made through; the record is inserted there
    /// when missing (a confirmed creation), replacing `replaces` if given. Every
    /// other cached variant of the resource only gets in-place replacement, since
    /// we cannot tell whether the record matches its filters.
    pub fn upsert<S: Schema>(&self, key: &CacheKey, record: &Record<S>, replaces: Option<&RecordId>) {
        let result = self.rewrite::<S, _>(|entry_key, records| {
            let target = replaces.unwrap_or(&record.id);
            let position = records
                .iter()
                .position(|r| &r.id == target)
                .or_else(|| records.iter().position(|r| r.id == record.id));
            match position {
                Some(index) => {
                    records[index] = record.clone();
                    // A placeholder swap may leave a second copy under either id.
                    let mut i = 0;
                    records.retain(|r| {
                        let keep = i == index || (r.id != record.id && &r.id != target);
                        i += 1;
                        keep
                    });
                    true
                }
                None if entry_key == key => {
                    records.push(record.clone());
                    true
                }
                None => false,
            }
        });
        if let Err(e) = result {
            warn!(key = %key, id = %record.id, error = %e, "could not update cache");
        }
    }

    /// Replace a confirmed record wherever it is already cached, without adding it to
    /// any entry.
    pub fn replace<S: Schema>(&self, record: &Record<S>) {
        let result = self.rewrite::<S, _>(|_, records| {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => {
                    *slot = record.clone();
                    true
                }
                None => false,
            }
        });
        if let Err(e) = result {
            warn!(resource = %S::KIND, id = %record.id, error = %e, "could not update cache");
        }
    }

    /// Drop a record from every cached variant of its resource.
    pub fn remove<S: Schema>(&self, id: &RecordId) {
        let result = self.rewrite::<S, _>(|_, records| {
            let before = records.len();
            records.retain(|r| &r.id != id);
            records.len() != before
        });
        if let Err(e) = result {
            warn!(resource = %S::KIND, id = %id, error = %e, "could not update cache");
        }
    }

    /// Run `edit` over the records of every stored entry of `S::KIND`, writing back
    /// those it reports as changed. Fetch times are left alone.
    fn rewrite<S, F>(&self, mut edit: F) -> Result<()>
    where
        S: Schema,
        F: FnMut(&CacheKey, &mut Vec<Record<S>>) -> bool,
    {
        for key in self.cache.keys_for(S::KIND)? {
            let Some(mut entry) = self.cache.peek::<S>(&key)? else {
                continue;
            };
            if edit(&key, &mut entry.records) {
                self.cache.put(&key, &entry)?;
            }
        }
        Ok(())
    }

    fn persist<S: Schema>(&self, key: &CacheKey, entry: &CacheEntry<S>) {
        if let Err(e) = self.cache.put(key, entry) {
            warn!(key = %key, error = %e, "could not write cache entry");
        }
    }
}

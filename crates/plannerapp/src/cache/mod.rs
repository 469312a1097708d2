//! # Local Cache
//!
//! A TTL-bounded key-value cache holding the last-known server view of a resource,
//! persisted through a pluggable [`CacheBackend`] so a hit survives restarts.
//!
//! ## Keys
//!
//! A [`CacheKey`] is the resource key plus its non-empty filters in name order:
//!
//! ```text
//! goals
//! goals?category=Academic&status=completed
//! notes?search=fafsa
//! ```
//!
//! Names and values are percent-encoded, so a value containing `&` or `=` cannot
//! pass for a second filter. Cursor and limit are not part of the key: an entry
//! holds every page loaded so far for one filter combination.
//!
//! ## Freshness
//!
//! An entry fetched at `T` is served until `T + ttl` inclusive and is a miss
//! afterwards. A miss never serves stale data; the entry stays on disk until the
//! next write replaces it.
//!
//! ## Corruption
//!
//! Anything that does not parse back into a [`CacheEntry`] of the requested schema
//! (truncated JSON, records with duplicate ids, records failing validation) is
//! deleted and reported as a miss.
//!
//! ## Writers
//!
//! Readers call [`LocalCache::get`] and the invalidation methods. Entries are only
//! written by the [`Reconciler`](crate::reconcile::Reconciler), which is why `put`
//! is crate-private. All access goes through one mutex so a reader sees either the
//! previous entry or the next one, never a mix.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{to_delta, Clock};
use crate::error::Result;
use crate::model::{PageQuery, Record, ResourceKind, Schema};

pub mod backend;
pub mod fs_backend;
pub mod mem_backend;

use backend::CacheBackend;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: ResourceKind, query: &PageQuery) -> Self {
        let filters = query.filters();
        if filters.is_empty() {
            return Self(kind.key().to_string());
        }
        let params: Vec<String> = filters
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect();
        Self(format!("{}?{}", kind.key(), params.join("&")))
    }

    /// The unfiltered key of a resource.
    pub fn resource(kind: ResourceKind) -> Self {
        Self(kind.key().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw stored key belongs to `kind`, filtered or not.
    pub fn is_for(raw: &str, kind: ResourceKind) -> bool {
        match raw.strip_prefix(kind.key()) {
            Some(rest) => rest.is_empty() || rest.starts_with('?'),
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The cached, deduplicated view of one resource under one filter combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<S> {
    pub resource_key: String,
    pub records: Vec<Record<S>>,
    pub cursor: Option<String>,
    pub has_more: bool,
    pub fetched_at: DateTime<Utc>,
}

impl<S: Schema> CacheEntry<S> {
    fn check(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for record in &self.records {
            if !seen.insert(&record.id) {
                return Err(format!("duplicate id {}", record.id));
            }
            record.fields.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// One line of `cache status`: what is stored, without knowing its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    pub key: String,
    pub records: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub fresh: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    records: Vec<Value>,
    fetched_at: DateTime<Utc>,
}

pub struct LocalCache<B> {
    backend: B,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl<B: CacheBackend> LocalCache<B> {
    pub fn new(backend: B, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            ttl,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>) -> bool {
        self.clock.now() - fetched_at <= to_delta(self.ttl)
    }

    /// The entry under `key`, or `None` when absent, stale or corrupt.
    pub fn get<S: Schema>(&self, key: &CacheKey) -> Result<Option<CacheEntry<S>>> {
        let _guard = self.lock.lock();
        match self.load::<S>(key)? {
            Some(entry) if self.is_fresh(entry.fetched_at) => {
                debug!(key = %key, records = entry.records.len(), "cache hit");
                Ok(Some(entry))
            }
            Some(entry) => {
                debug!(key = %key, fetched_at = %entry.fetched_at, "cache stale");
                Ok(None)
            }
            None => {
                debug!(key = %key, "cache miss");
                Ok(None)
            }
        }
    }

    /// The stored entry regardless of age. Used when folding a confirmed write into
    /// an entry without touching its fetch time.
    pub(crate) fn peek<S: Schema>(&self, key: &CacheKey) -> Result<Option<CacheEntry<S>>> {
        let _guard = self.lock.lock();
        self.load(key)
    }

    pub(crate) fn put<S: Schema>(&self, key: &CacheKey, entry: &CacheEntry<S>) -> Result<()> {
        let raw = serde_json::to_string(entry)?;
        let _guard = self.lock.lock();
        self.backend.write(key.as_str(), &raw)?;
        debug!(key = %key, records = entry.records.len(), "cache put");
        Ok(())
    }

    /// Keys currently stored for `kind`, any filters.
    pub(crate) fn keys_for(&self, kind: ResourceKind) -> Result<Vec<CacheKey>> {
        let _guard = self.lock.lock();
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter(|raw| CacheKey::is_for(raw, kind))
            .map(CacheKey)
            .collect())
    }

    pub fn invalidate(&self, key: &CacheKey) -> Result<()> {
        let _guard = self.lock.lock();
        self.backend.remove(key.as_str())?;
        debug!(key = %key, "cache invalidated");
        Ok(())
    }

    /// Drop every filter variant of a resource. Returns how many entries went.
    pub fn invalidate_resource(&self, kind: ResourceKind) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut removed = 0;
        for raw in self.backend.keys()? {
            if CacheKey::is_for(&raw, kind) {
                self.backend.remove(&raw)?;
                removed += 1;
            }
        }
        debug!(resource = %kind, removed, "resource invalidated");
        Ok(removed)
    }

    /// Drop everything.
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let keys = self.backend.keys()?;
        for raw in &keys {
            self.backend.remove(raw)?;
        }
        Ok(keys.len())
    }

    /// Summaries of every stored entry, sorted by key.
    pub fn summaries(&self) -> Result<Vec<EntrySummary>> {
        let _guard = self.lock.lock();
        let mut summaries = Vec::new();
        for key in self.backend.keys()? {
            let raw = self.backend.read(&key)?;
            let parsed = raw.and_then(|raw| serde_json::from_str::<RawEntry>(&raw).ok());
            summaries.push(match parsed {
                Some(entry) => EntrySummary {
                    fresh: self.is_fresh(entry.fetched_at),
                    records: entry.records.len(),
                    fetched_at: Some(entry.fetched_at),
                    key,
                },
                None => EntrySummary {
                    key,
                    records: 0,
                    fetched_at: None,
                    fresh: false,
                },
            });
        }
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }

    // Caller holds the lock.
    fn load<S: Schema>(&self, key: &CacheKey) -> Result<Option<CacheEntry<S>>> {
        let Some(raw) = self.backend.read(key.as_str())? else {
            return Ok(None);
        };
        let parsed = serde_json::from_str::<CacheEntry<S>>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|entry| entry.check().map(|()| entry));
        match parsed {
            Ok(entry) => Ok(Some(entry)),
            Err(reason) => {
                warn!(key = %key, reason = %reason, "discarding corrupt cache entry");
                self.backend.remove(key.as_str())?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mem_backend::MemBackend;
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Goal, Note};

    fn cache(clock: &ManualClock) -> LocalCache<MemBackend> {
        LocalCache::new(
            MemBackend::new(),
            Duration::from_secs(300),
            Arc::new(clock.clone()),
        )
    }

    fn goal_entry(clock: &ManualClock, ids: &[&str]) -> CacheEntry<Goal> {
        CacheEntry {
            resource_key: "goals".into(),
            records: ids
                .iter()
                .map(|id| Record::new(*id, Goal::new(format!("Goal {}", id), "Academic")))
                .collect(),
            cursor: Some("c1".into()),
            has_more: true,
            fetched_at: clock.now(),
        }
    }

    #[test]
    fn test_key_includes_sorted_filters() {
        let query = PageQuery::new()
            .with_status("completed")
            .with_category("Academic")
            .with_cursor(Some("c9".into()))
            .with_limit(5);
        let key = CacheKey::new(ResourceKind::Goals, &query);
        assert_eq!(key.as_str(), "goals?category=Academic&status=completed");
        assert_eq!(
            CacheKey::new(ResourceKind::Notes, &PageQuery::new()).as_str(),
            "notes"
        );
    }

    #[test]
    fn test_key_escapes_filter_values() {
        let smuggled = CacheKey::new(
            ResourceKind::Goals,
            &PageQuery::new().with_search("Goal&status=not_started"),
        );
        let separate = CacheKey::new(
            ResourceKind::Goals,
            &PageQuery::new().with_search("Goal").with_status("not_started"),
        );
        assert_ne!(smuggled, separate);
        assert_eq!(smuggled.as_str(), "goals?search=Goal%26status%3Dnot_started");
        assert_eq!(separate.as_str(), "goals?search=Goal&status=not_started");
        assert!(CacheKey::is_for(smuggled.as_str(), ResourceKind::Goals));
    }

    #[test]
    fn test_key_ownership() {
        assert!(CacheKey::is_for("goals", ResourceKind::Goals));
        assert!(CacheKey::is_for("goals?search=x", ResourceKind::Goals));
        assert!(!CacheKey::is_for("notes", ResourceKind::Goals));
        assert!(!CacheKey::is_for("savedPrograms", ResourceKind::ProfileFields));
    }

    #[test]
    fn test_ttl_boundary() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        let key = CacheKey::resource(ResourceKind::Goals);
        cache.put(&key, &goal_entry(&clock, &["1", "2"])).unwrap();

        clock.advance(Duration::from_secs(300) - Duration::from_millis(1));
        let hit = cache.get::<Goal>(&key).unwrap();
        assert_eq!(hit.map(|e| e.records.len()), Some(2));

        clock.advance(Duration::from_millis(2));
        assert!(cache.get::<Goal>(&key).unwrap().is_none());
        // Stale is not corrupt: the entry is still there for peek.
        assert!(cache.peek::<Goal>(&key).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_is_deleted() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        let key = CacheKey::resource(ResourceKind::Goals);
        cache.backend().write_raw("goals", "{not json");

        assert!(cache.get::<Goal>(&key).unwrap().is_none());
        assert!(cache.backend().is_empty());
    }

    #[test]
    fn test_entry_with_duplicate_ids_is_corrupt() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        let key = CacheKey::resource(ResourceKind::Goals);
        cache.put(&key, &goal_entry(&clock, &["1", "1"])).unwrap();

        assert!(cache.get::<Goal>(&key).unwrap().is_none());
        assert!(cache.backend().is_empty());
    }

    #[test]
    fn test_wrong_schema_is_corrupt() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        let key = CacheKey::resource(ResourceKind::Goals);
        cache.put(&key, &goal_entry(&clock, &["1"])).unwrap();

        // Goals have no "text" field, so they do not read back as notes.
        assert!(cache.get::<Note>(&key).unwrap().is_none());
        assert!(cache.backend().is_empty());
    }

    #[test]
    fn test_invalidate_resource_drops_every_filter_variant() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        let plain = CacheKey::resource(ResourceKind::Goals);
        let filtered = CacheKey::new(
            ResourceKind::Goals,
            &PageQuery::new().with_category("Career"),
        );
        cache.put(&plain, &goal_entry(&clock, &["1"])).unwrap();
        cache.put(&filtered, &goal_entry(&clock, &["2"])).unwrap();
        cache.backend().write_raw("notes", "{}");

        assert_eq!(cache.invalidate_resource(ResourceKind::Goals).unwrap(), 2);
        assert_eq!(cache.backend().keys().unwrap(), vec!["notes".to_string()]);
    }

    #[test]
    fn test_summaries_report_freshness() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        cache
            .put(&CacheKey::resource(ResourceKind::Goals), &goal_entry(&clock, &["1", "2"]))
            .unwrap();
        clock.advance(Duration::from_secs(301));
        cache.backend().write_raw("notes", "garbage");

        let summaries = cache.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "goals");
        assert_eq!(summaries[0].records, 2);
        assert!(!summaries[0].fresh);
        assert_eq!(summaries[1].fetched_at, None);
    }

    #[test]
    fn test_write_failure_propagates() {
        let clock = ManualClock::at_epoch();
        let cache = cache(&clock);
        cache.backend().set_simulate_write_error(true);
        let result = cache.put(&CacheKey::resource(ResourceKind::Goals), &goal_entry(&clock, &["1"]));
        assert!(result.is_err());
    }
}

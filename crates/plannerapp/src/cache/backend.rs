use crate::error::Result;

/// Abstract interface for durable key-value storage.
///
/// This trait handles the "how" of persistence (filesystem vs memory) while
/// [`LocalCache`](super::LocalCache) handles the "what" (entries, freshness,
/// corruption). Values are opaque strings; there are no transactions.
pub trait CacheBackend: Send + Sync {
    /// Raw stored value. `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    /// MUST be atomic (e.g. write to tmp then rename) so readers never see a torn write.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Every stored key, in no particular order.
    fn keys(&self) -> Result<Vec<String>>;
}

use super::backend::CacheBackend;
use crate::error::{PlannerError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory cache backend for tests.
///
/// A `Mutex` keeps the trait's `&self` signatures while letting the backend be shared
/// across tasks.
#[derive(Default)]
pub struct MemBackend {
    entries: Mutex<HashMap<String, String>>,
    simulate_write_error: Mutex<bool>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        *self.simulate_write_error.lock() = simulate;
    }

    /// Test helper to plant an arbitrary raw value, e.g. a corrupt entry.
    pub fn write_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheBackend for MemBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        if *self.simulate_write_error.lock() {
            return Err(PlannerError::Store("Simulated write error".to_string()));
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

//! # Remote Store Client
//!
//! The Data Store is an ordinary REST API: one route per resource, list responses
//! with a cursor, and create/update/delete verbs. [`RemoteStore`] is the only way the
//! sync core reaches it, and it treats every resource the same way:
//!
//! - `fetch_page(query) → Page`
//! - `create(fields) → Record`
//! - `update(id, patch) → Record`
//! - `delete(id) → bool`
//!
//! Implementations hold no sync state. Every call may fail; classification of the
//! failure (overload vs. transient vs. permanent) lives on
//! [`PlannerError`](crate::error::PlannerError) so callers can pick a retry policy.
//!
//! ## Implementations
//!
//! - [`http::HttpRemote`]: Production client over `reqwest`.
//! - [`memory::MemoryRemote`]: In-process Data Store with fault injection and a call
//!   log, for tests and offline demos.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{FieldPatch, Page, PageQuery, Record, RecordId, Schema};

pub mod http;
pub mod memory;

/// Abstract interface to the Data Store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one page of a resource. `query.cursor` selects the page.
    async fn fetch_page<S: Schema>(&self, query: &PageQuery) -> Result<Page<S>>;

    /// Create a record; the server assigns the authoritative id.
    async fn create<S: Schema>(&self, fields: &S) -> Result<Record<S>>;

    /// Apply a partial update and return the stored record.
    async fn update<S: Schema>(&self, id: &RecordId, patch: &FieldPatch) -> Result<Record<S>>;

    /// Delete a record. `Ok(false)` when the server no longer had it.
    async fn delete<S: Schema>(&self, id: &RecordId) -> Result<bool>;

    /// Several updates at once. Stores with a bulk endpoint override this; the default
    /// sends independent requests in order.
    async fn update_many<S: Schema>(
        &self,
        edits: &[(RecordId, FieldPatch)],
    ) -> Vec<Result<Record<S>>> {
        let mut results = Vec::with_capacity(edits.len());
        for (id, patch) in edits {
            results.push(self.update::<S>(id, patch).await);
        }
        results
    }
}

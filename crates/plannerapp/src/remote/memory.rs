use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};

use super::RemoteStore;
use crate::error::{PlannerError, Result};
use crate::model::{
    parse_record, FieldPatch, Page, PageQuery, Record, RecordId, ResourceKind, Schema,
};

/// One request as seen by the store, for asserting what was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    FetchPage {
        kind: ResourceKind,
        cursor: Option<String>,
    },
    Create {
        kind: ResourceKind,
        fields: FieldPatch,
    },
    Update {
        kind: ResourceKind,
        id: RecordId,
        patch: FieldPatch,
    },
    Delete {
        kind: ResourceKind,
        id: RecordId,
    },
}

/// A scripted failure for the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request never reaches the server.
    Offline,
    /// The server answers "temporarily unavailable".
    Unavailable,
    /// The server answers with this status.
    Status(u16),
}

impl Fault {
    fn into_error(self) -> PlannerError {
        match self {
            Fault::Offline => PlannerError::Network("connection refused".to_string()),
            Fault::Unavailable => {
                PlannerError::Unavailable("service temporarily unavailable".to_string())
            }
            Fault::Status(status) => PlannerError::Server {
                status,
                message: "simulated failure".to_string(),
            },
        }
    }
}

struct MemState {
    collections: HashMap<ResourceKind, Vec<(RecordId, Map<String, Value>)>>,
    next_id: u64,
    page_size: usize,
    offline: bool,
    faults: VecDeque<Fault>,
    calls: Vec<RemoteCall>,
}

/// In-process Data Store.
///
/// Records are kept as JSON objects per resource, ids are sequential integers, and
/// cursors are offsets. Failures are injected with [`MemoryRemote::set_offline`] and
/// [`MemoryRemote::push_fault`]; every request is appended to a call log, failed or
/// not.
pub struct MemoryRemote {
    state: Mutex<MemState>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemState {
                collections: HashMap::new(),
                next_id: 1,
                page_size: 20,
                offline: false,
                faults: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().page_size = page_size.max(1);
        self
    }

    /// Id the server will hand out for the next creation.
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.state.lock().next_id = next_id;
        self
    }

    /// Store a record directly, bypassing the call log.
    pub fn insert<S: Schema>(&self, record: Record<S>) -> Result<()> {
        let fields = FieldPatch::from_fields(&record.fields)?.into_map();
        let mut state = self.state.lock();
        let collection = state.collections.entry(S::KIND).or_default();
        match collection.iter_mut().find(|(id, _)| *id == record.id) {
            Some(existing) => existing.1 = fields,
            None => collection.push((record.id, fields)),
        }
        Ok(())
    }

    /// Store new fields under the next server id.
    pub fn seed<S: Schema>(&self, fields: S) -> Result<RecordId> {
        let id = self.allocate_id();
        self.insert(Record::new(id.clone(), fields))?;
        Ok(id)
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn update_calls(&self) -> Vec<(RecordId, FieldPatch)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Update { id, patch, .. } => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Create { .. }))
            .count()
    }

    pub fn records<S: Schema>(&self) -> Result<Vec<Record<S>>> {
        let state = self.state.lock();
        let records = state
            .collections
            .get(&S::KIND)
            .map(|c| c.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|(id, fields)| to_record(id, fields))
            .collect();
        records
    }

    pub fn get<S: Schema>(&self, id: &RecordId) -> Result<Option<Record<S>>> {
        let state = self.state.lock();
        let record = state
            .collections
            .get(&S::KIND)
            .and_then(|c| c.iter().find(|(rid, _)| rid == id))
            .map(|(rid, fields)| to_record(rid, fields))
            .transpose();
        record
    }

    fn allocate_id(&self) -> RecordId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        RecordId::new(id.to_string())
    }

    /// Log the call, then fail it if the network is down or a fault is queued.
    fn begin(&self, call: RemoteCall) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.offline {
            return Err(Fault::Offline.into_error());
        }
        match state.faults.pop_front() {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }
}

fn to_record<S: Schema>(id: &RecordId, fields: &Map<String, Value>) -> Result<Record<S>> {
    let mut object = fields.clone();
    object.insert("id".to_string(), Value::String(id.to_string()));
    parse_record(Value::Object(object))
}

fn matches_query(fields: &Map<String, Value>, query: &PageQuery) -> bool {
    let field_is = |name: &str, expected: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case(expected))
    };
    let filters = query.filters();
    if let Some(category) = filters.get("category") {
        if !field_is("category", *category) {
            return false;
        }
    }
    if let Some(status) = filters.get("status") {
        if !field_is("status", *status) {
            return false;
        }
    }
    if let Some(search) = filters.get("search") {
        let needle = search.to_lowercase();
        return fields
            .values()
            .filter_map(Value::as_str)
            .any(|v| v.to_lowercase().contains(&needle));
    }
    true
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_page<S: Schema>(&self, query: &PageQuery) -> Result<Page<S>> {
        self.begin(RemoteCall::FetchPage {
            kind: S::KIND,
            cursor: query.cursor.clone(),
        })?;

        let state = self.state.lock();
        let matching: Vec<&(RecordId, Map<String, Value>)> = state
            .collections
            .get(&S::KIND)
            .map(|c| c.iter().filter(|(_, f)| matches_query(f, query)).collect())
            .unwrap_or_default();

        let offset = match &query.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| PlannerError::Server {
                    status: 400,
                    message: format!("bad cursor '{}'", cursor),
                })?,
            None => 0,
        };
        let limit = query
            .limit
            .map(|l| l as usize)
            .unwrap_or(state.page_size)
            .max(1);
        let end = (offset + limit).min(matching.len());

        let records = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|(id, fields)| to_record(id, fields))
            .collect::<Result<Vec<_>>>()?;
        let has_more = end < matching.len();
        let mut page = Page::new(records, has_more.then(|| end.to_string()), has_more);
        page.total = Some(matching.len() as u64);
        Ok(page)
    }

    async fn create<S: Schema>(&self, fields: &S) -> Result<Record<S>> {
        let patch = FieldPatch::from_fields(fields)?;
        self.begin(RemoteCall::Create {
            kind: S::KIND,
            fields: patch,
        })?;
        fields.validate()?;
        let id = self.allocate_id();
        let record = Record::new(id, fields.clone());
        self.insert(record.clone())?;
        Ok(record)
    }

    async fn update<S: Schema>(&self, id: &RecordId, patch: &FieldPatch) -> Result<Record<S>> {
        self.begin(RemoteCall::Update {
            kind: S::KIND,
            id: id.clone(),
            patch: patch.clone(),
        })?;
        let current = self
            .get::<S>(id)?
            .ok_or_else(|| PlannerError::RecordNotFound(id.to_string()))?;
        let record = Record::new(id.clone(), patch.apply(&current.fields)?);
        self.insert(record.clone())?;
        Ok(record)
    }

    async fn delete<S: Schema>(&self, id: &RecordId) -> Result<bool> {
        self.begin(RemoteCall::Delete {
            kind: S::KIND,
            id: id.clone(),
        })?;
        let mut state = self.state.lock();
        let Some(collection) = state.collections.get_mut(&S::KIND) else {
            return Ok(false);
        };
        let before = collection.len();
        collection.retain(|(rid, _)| rid != id);
        Ok(collection.len() != before)
    }
}

// --- Test Fixtures ---

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures {
    use super::*;
    use crate::model::{Goal, Note};

    /// A store holding goals "Goal 1".."Goal n" with ids "1".."n".
    pub fn with_goals(count: usize) -> MemoryRemote {
        let remote = MemoryRemote::new();
        for i in 0..count {
            let category = if i % 2 == 0 { "Academic" } else { "Career" };
            remote
                .seed(Goal::new(format!("Goal {}", i + 1), category))
                .unwrap();
        }
        remote
    }

    /// A store holding a single note under `id`.
    pub fn with_note(id: &str, text: &str) -> MemoryRemote {
        let remote = MemoryRemote::new();
        remote.insert(Record::new(id, Note::new(text))).unwrap();
        remote
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::model::{Goal, Note};

    #[tokio::test]
    async fn pages_through_a_collection() {
        let remote = with_goals(5).with_page_size(2);
        let first: Page<Goal> = remote.fetch_page(&PageQuery::new()).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("2"));
        assert!(first.has_more);

        let last: Page<Goal> = remote
            .fetch_page(&PageQuery::new().with_cursor(Some("4".into())))
            .await
            .unwrap();
        assert_eq!(last.records.len(), 1);
        assert!(!last.has_more);
        assert_eq!(last.cursor, None);
        assert_eq!(last.total, Some(5));
    }

    #[tokio::test]
    async fn filters_by_category_and_search() {
        let remote = with_goals(4);
        let academic: Page<Goal> = remote
            .fetch_page(&PageQuery::new().with_category("academic"))
            .await
            .unwrap();
        assert_eq!(academic.records.len(), 2);

        let searched: Page<Goal> = remote
            .fetch_page(&PageQuery::new().with_search("goal 3"))
            .await
            .unwrap();
        assert_eq!(searched.records.len(), 1);
        assert_eq!(searched.records[0].fields.title, "Goal 3");
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let remote = MemoryRemote::new().with_next_id(42);
        let record = remote.create(&Goal::new("Finish FAFSA", "Academic")).await.unwrap();
        assert_eq!(record.id.as_str(), "42");
        assert_eq!(remote.create_count(), 1);
    }

    #[tokio::test]
    async fn update_applies_patch() {
        let remote = with_note("7", "Check in");
        let patch = FieldPatch::new().set("text", "Check in next week");
        let record: Record<Note> = remote.update(&RecordId::new("7"), &patch).await.unwrap();
        assert_eq!(record.fields.text, "Check in next week");
        assert_eq!(remote.update_calls().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_record_fails() {
        let remote = MemoryRemote::new();
        let result: Result<Record<Note>> = remote
            .update(&RecordId::new("9"), &FieldPatch::new().set("text", "x"))
            .await;
        assert!(matches!(result, Err(PlannerError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn faults_are_consumed_in_order_and_logged() {
        let remote = with_goals(1);
        remote.push_fault(Fault::Unavailable);
        remote.push_fault(Fault::Status(500));

        let first: Result<Page<Goal>> = remote.fetch_page(&PageQuery::new()).await;
        assert!(first.unwrap_err().is_unavailable());
        let second: Result<Page<Goal>> = remote.fetch_page(&PageQuery::new()).await;
        assert!(matches!(second, Err(PlannerError::Server { status: 500, .. })));
        let third: Result<Page<Goal>> = remote.fetch_page(&PageQuery::new()).await;
        assert!(third.is_ok());
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let remote = with_goals(1);
        remote.set_offline(true);
        let result = remote.delete::<Goal>(&RecordId::new("1")).await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(remote.records::<Goal>().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_missing_records() {
        let remote = with_goals(1);
        assert!(remote.delete::<Goal>(&RecordId::new("1")).await.unwrap());
        assert!(!remote.delete::<Goal>(&RecordId::new("1")).await.unwrap());
    }
}

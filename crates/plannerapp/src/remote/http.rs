//! HTTP client for the planner Data Store.
//!
//! Every resource lives under one route (see [`ResourceKind::route`]) and uses the
//! method to pick the operation:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | fetch page | `GET {route}?cursor=&limit=&search=&category=&status=` |
//! | create | `POST {route}` with the record fields |
//! | update | `PUT {route}` with `{ "id": …, …changed fields }` |
//! | delete | `DELETE {route}?id=…` |
//!
//! List responses look like `{ "goals": [...], "pagination": { "nextCursor": "c1",
//! "hasMore": true, "totalGoals": 57 } }`. A bare array, or a single object with an
//! `id` (the profile route), is accepted as a one-page collection.
//!
//! Status handling: 503 and 429 become [`PlannerError::Unavailable`], 401/403 become
//! [`PlannerError::Unauthenticated`], other non-2xx responses become
//! [`PlannerError::Server`] carrying the body's `error`/`message` text.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::RemoteStore;
use crate::config::SyncConfig;
use crate::error::{PlannerError, Result};
use crate::model::{
    parse_record, FieldPatch, Page, PageQuery, Record, RecordId, ResourceKind, Schema,
};
use crate::session::Session;

pub struct HttpRemote {
    base_url: String,
    client: Client,
    session: Session,
}

impl HttpRemote {
    pub fn new(config: &SyncConfig, session: Session) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url().to_string(),
            client,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.base_url, kind.route())
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        self.session.require_user()?;
        Ok(match self.session.access_token() {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        })
    }

    /// Send a request and decode the JSON body. An empty body decodes to `Null`.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let response = self.authorize(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                PlannerError::Timeout
            } else {
                PlannerError::Http(e)
            }
        })?;
        let status = response.status();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) if status.is_success() => {
                    return Err(PlannerError::InvalidResponse(format!(
                        "body is not JSON: {}",
                        e
                    )))
                }
                Err(_) => Value::String(text),
            }
        };

        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok((status, body));
        }
        Err(status_error(status, &body))
    }
}

fn status_error(status: StatusCode, body: &Value) -> PlannerError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });
    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            PlannerError::Unavailable(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlannerError::Unauthenticated,
        _ => PlannerError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

fn error_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => ["error", "message"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Decode a list response into a page. Records that fail validation are dropped.
pub fn parse_page<S: Schema>(body: Value) -> Result<Page<S>> {
    let kind = S::KIND;
    let (items, pagination) = match body {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => match map.remove(kind.collection_field()) {
            Some(Value::Array(items)) => (items, map.remove("pagination")),
            Some(other) => {
                return Err(PlannerError::InvalidResponse(format!(
                    "'{}' is {} instead of a list",
                    kind.collection_field(),
                    type_name(&other)
                )))
            }
            None if map.contains_key("id") => (vec![Value::Object(map)], None),
            None => {
                return Err(PlannerError::InvalidResponse(format!(
                    "no '{}' in {} response",
                    kind.collection_field(),
                    kind
                )))
            }
        },
        other => {
            return Err(PlannerError::InvalidResponse(format!(
                "{} response is {}",
                kind,
                type_name(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match parse_record::<S>(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!(resource = %kind, error = %e, "Dropping invalid record"),
        }
    }

    let mut page = Page::new(records, None, false);
    if let Some(Value::Object(pagination)) = pagination {
        page.cursor = cursor_value(pagination.get("nextCursor"));
        page.has_more = pagination
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(page.cursor.is_some());
        page.total = total_value(&pagination);
    }
    Ok(page)
}

/// Decode a create/update response: either the record itself or `{ "<item>": record }`.
pub fn parse_single<S: Schema>(body: Value) -> Result<Record<S>> {
    let kind = S::KIND;
    match body {
        Value::Object(map) if map.contains_key("id") => parse_record(Value::Object(map)),
        Value::Object(mut map) => match map.remove(kind.item_field()) {
            Some(item) => parse_record(item),
            None => Err(PlannerError::InvalidResponse(format!(
                "no {} in response",
                kind.item_field()
            ))),
        },
        other => Err(PlannerError::InvalidResponse(format!(
            "{} response is {}",
            kind,
            type_name(&other)
        ))),
    }
}

fn cursor_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// `totalGoals`, `totalNotes`, ... or plain `total`.
fn total_value(pagination: &Map<String, Value>) -> Option<u64> {
    pagination
        .iter()
        .find(|(k, _)| k.starts_with("total"))
        .and_then(|(_, v)| v.as_u64())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_page<S: Schema>(&self, query: &PageQuery) -> Result<Page<S>> {
        let kind = S::KIND;
        debug!(resource = %kind, cursor = ?query.cursor, "GET page");
        let request = self.client.get(self.url(kind)).query(&query.params());
        let (status, body) = self.send(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Page::end());
        }
        parse_page(body)
    }

    async fn create<S: Schema>(&self, fields: &S) -> Result<Record<S>> {
        let kind = S::KIND;
        debug!(resource = %kind, "POST record");
        let body = FieldPatch::from_fields(fields)?;
        let request = self.client.post(self.url(kind)).json(&body);
        let (status, body) = self.send(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(status_error(status, &body));
        }
        parse_single(body)
    }

    async fn update<S: Schema>(&self, id: &RecordId, patch: &FieldPatch) -> Result<Record<S>> {
        let kind = S::KIND;
        debug!(resource = %kind, %id, fields = patch.len(), "PUT record");
        let mut body = patch.clone().into_map();
        body.insert("id".to_string(), Value::String(id.to_string()));
        let request = self.client.put(self.url(kind)).json(&body);
        let (status, body) = self.send(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(PlannerError::RecordNotFound(id.to_string()));
        }
        parse_single(body)
    }

    async fn delete<S: Schema>(&self, id: &RecordId) -> Result<bool> {
        let kind = S::KIND;
        debug!(resource = %kind, %id, "DELETE record");
        let request = self
            .client
            .delete(self.url(kind))
            .query(&[("id", id.as_str())]);
        let (status, _) = self.send(request).await?;
        Ok(status != StatusCode::NOT_FOUND)
    }
}

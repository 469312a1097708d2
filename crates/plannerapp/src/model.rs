//! # Domain Model: Resources, Records and Patches
//!
//! This module defines what travels between the planner UI, the local cache and the
//! Data Store: [`Record`], [`Page`], [`FieldPatch`] and the per-resource schemas.
//!
//! ## Typed Records
//!
//! The server hands back loose JSON objects. We do not pass those around as untyped
//! maps; every collection has a schema ([`Goal`], [`Note`], [`SavedProgram`],
//! [`ProfileFields`]) implementing [`Schema`], and a [`Record<S>`] is an id plus one of
//! those schemas. Parsing into the schema *is* the validation step at the client
//! boundary: a payload that does not fit is rejected as [`PlannerError::InvalidRecord`]
//! instead of leaking into the UI.
//!
//! ## Identity
//!
//! Two records are the same record when their ids match, whatever their fields say.
//! `PartialEq` on [`Record`] compares ids only; use [`Record::content_eq`] when the
//! field values matter.
//!
//! Ids come from the server (SQL serials, so often JSON numbers) or from the client as
//! placeholders (`tmp-…`) for creations that have not been confirmed yet.
//!
//! ## Patches
//!
//! Edits are partial: a [`FieldPatch`] names only the fields it changes. Patches
//! coalesce with [`FieldPatch::merge`] (last write wins per field) and are applied with
//! [`FieldPatch::apply`], which re-validates the result against the schema.
//!
//! ## Resource Routes
//!
//! | Kind | Key | Route | Collection field |
//! |------|-----|-------|------------------|
//! | Goals | `goals` | `/api/counselor-goals` | `goals` |
//! | Notes | `notes` | `/api/counselor-notes` | `notes` |
//! | SavedPrograms | `savedPrograms` | `/api/saved-programs` | `programs` |
//! | ProfileFields | `profileFields` | `/api/user-profile` | `profiles` |

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{PlannerError, Result};

pub const PLACEHOLDER_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Goals,
    Notes,
    SavedPrograms,
    ProfileFields,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Goals,
        ResourceKind::Notes,
        ResourceKind::SavedPrograms,
        ResourceKind::ProfileFields,
    ];

    /// Stable name used in cache keys and logs.
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::Goals => "goals",
            ResourceKind::Notes => "notes",
            ResourceKind::SavedPrograms => "savedPrograms",
            ResourceKind::ProfileFields => "profileFields",
        }
    }

    pub fn route(&self) -> &'static str {
        match self {
            ResourceKind::Goals => "/api/counselor-goals",
            ResourceKind::Notes => "/api/counselor-notes",
            ResourceKind::SavedPrograms => "/api/saved-programs",
            ResourceKind::ProfileFields => "/api/user-profile",
        }
    }

    /// Field of a list response holding the records.
    pub fn collection_field(&self) -> &'static str {
        match self {
            ResourceKind::Goals => "goals",
            ResourceKind::Notes => "notes",
            ResourceKind::SavedPrograms => "programs",
            ResourceKind::ProfileFields => "profiles",
        }
    }

    /// Field of a single-record response wrapping the record.
    pub fn item_field(&self) -> &'static str {
        match self {
            ResourceKind::Goals => "goal",
            ResourceKind::Notes => "note",
            ResourceKind::SavedPrograms => "program",
            ResourceKind::ProfileFields => "profile",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Goals => "goal",
            ResourceKind::Notes => "note",
            ResourceKind::SavedPrograms => "program",
            ResourceKind::ProfileFields => "profile",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How eagerly edits to a resource are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Inline field edits (short debounce).
    Inline,
    /// Multi-section wizard background auto-save (long debounce).
    Autosave,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh client-side id for an optimistic creation.
    pub fn placeholder() -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Server ids are SQL serials and usually arrive as JSON numbers.
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(s) if s.is_empty() => Err(serde::de::Error::custom("empty record id")),
            RawId::Text(s) => Ok(RecordId(s)),
            RawId::Number(n) => Ok(RecordId(n.to_string())),
        }
    }
}

/// A resource-specific field schema.
///
/// Implementors describe one collection of the Data Store. Parsing into the schema
/// plus [`Schema::validate`] is the only validation records get on their way in.
pub trait Schema:
    Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync + 'static
{
    const KIND: ResourceKind;
    const SAVE_MODE: SaveMode = SaveMode::Inline;
    /// Retry plain network failures too, not only server overload.
    const RETRY_TRANSIENT: bool = false;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// One-line description for messages and listings.
    fn summary(&self) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record<S> {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: S,
}

impl<S> Record<S> {
    pub fn new(id: impl Into<RecordId>, fields: S) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

impl<S: PartialEq> Record<S> {
    /// Same id *and* same field values.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.id == other.id && self.fields == other.fields
    }
}

impl<S> PartialEq for Record<S> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<S> Eq for Record<S> {}

/// Parse and validate one record coming from the Data Store.
pub fn parse_record<S: Schema>(value: Value) -> Result<Record<S>> {
    let record: Record<S> = serde_json::from_value(value)
        .map_err(|e| PlannerError::InvalidRecord(format!("{}: {}", S::KIND, e)))?;
    record.fields.validate()?;
    Ok(record)
}

// --- Schemas ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Goal {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            status: GoalStatus::NotStarted,
            description: None,
            due_date: None,
        }
    }
}

impl Schema for Goal {
    const KIND: ResourceKind = ResourceKind::Goals;

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(PlannerError::InvalidRecord(
                "goal title cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn summary(&self) -> String {
        if self.category.is_empty() {
            self.title.clone()
        } else {
            format!("{} [{}]", self.title, self.category)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            student_id: None,
        }
    }
}

impl Schema for Note {
    const KIND: ResourceKind = ResourceKind::Notes;

    fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(PlannerError::InvalidRecord(
                "note text cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn summary(&self) -> String {
        self.text.lines().next().unwrap_or_default().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProgram {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SavedProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            institution: None,
            url: None,
        }
    }
}

impl Schema for SavedProgram {
    const KIND: ResourceKind = ResourceKind::SavedPrograms;

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PlannerError::InvalidRecord(
                "program name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn summary(&self) -> String {
        match &self.institution {
            Some(inst) => format!("{} ({})", self.name, inst),
            None => self.name.clone(),
        }
    }
}

/// The student snapshot filled in by the profile wizard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_major: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
}

impl Schema for ProfileFields {
    const KIND: ResourceKind = ResourceKind::ProfileFields;
    const SAVE_MODE: SaveMode = SaveMode::Autosave;
    const RETRY_TRANSIENT: bool = true;

    fn validate(&self) -> Result<()> {
        match self.gpa {
            Some(gpa) if !(0.0..=5.0).contains(&gpa) => Err(PlannerError::InvalidRecord(
                format!("gpa {} is outside 0.0-5.0", gpa),
            )),
            _ => Ok(()),
        }
    }

    fn summary(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "Student profile".to_string()
        } else {
            name
        }
    }
}

// --- Patches ---

/// A partial record: only the fields an edit touches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPatch(Map<String, Value>);

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        // Identity is never patchable.
        if field != "id" {
            self.0.insert(field, value.into());
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every field of a full record, as a patch (used to send creations).
    pub fn from_fields<S: Schema>(fields: &S) -> Result<Self> {
        match serde_json::to_value(fields)? {
            Value::Object(mut map) => {
                map.remove("id");
                Ok(Self(map))
            }
            other => Err(PlannerError::InvalidRecord(format!(
                "{} fields serialize to {} instead of an object",
                S::KIND,
                other
            ))),
        }
    }

    /// Fold a newer patch into this one; the newer value wins per field.
    pub fn merge(&mut self, newer: FieldPatch) {
        for (field, value) in newer.0 {
            self.0.insert(field, value);
        }
    }

    /// Overlay the patch on `fields`, re-parsing and validating the result.
    pub fn apply<S: Schema>(&self, fields: &S) -> Result<S> {
        let mut base = Self::from_fields(fields)?;
        base.merge(self.clone());
        let patched: S = serde_json::from_value(Value::Object(base.0))
            .map_err(|e| PlannerError::InvalidRecord(format!("{}: {}", S::KIND, e)))?;
        patched.validate()?;
        Ok(patched)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FieldPatch {
    fn from(mut map: Map<String, Value>) -> Self {
        map.remove("id");
        Self(map)
    }
}

// --- Pages ---

#[derive(Debug, Clone)]
pub struct Page<S> {
    pub records: Vec<Record<S>>,
    pub cursor: Option<String>,
    pub has_more: bool,
    /// Total size of the collection, when the server reports it.
    pub total: Option<u64>,
}

impl<S> Page<S> {
    pub fn new(records: Vec<Record<S>>, cursor: Option<String>, has_more: bool) -> Self {
        Self {
            records,
            cursor,
            has_more,
            total: None,
        }
    }

    /// Empty page signalling the end of the stream.
    pub fn end() -> Self {
        Self::new(Vec::new(), None, false)
    }

    pub fn is_end(&self) -> bool {
        self.records.is_empty() && !self.has_more
    }
}

/// Filters and pagination for a page fetch.
///
/// The filters (search, category, status) are part of the cache key; the cursor and
/// limit are not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl PageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Non-empty filters, sorted by name.
    pub fn filters(&self) -> BTreeMap<&'static str, &str> {
        let mut filters = BTreeMap::new();
        for (name, value) in [
            ("category", &self.category),
            ("search", &self.search),
            ("status", &self.status),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                filters.insert(name, v);
            }
        }
        filters
    }

    /// Query string parameters, cursor and limit included.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = self
            .filters()
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = &self.cursor {
            params.push(("cursor", cursor.clone()));
        }
        params
    }
}

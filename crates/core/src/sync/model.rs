//! Table sync domain models.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SyncError;

/// Key under which a record's own identifier is injected into its properties.
pub const RECORD_ID_KEY: &str = "guid";

/// Attempts per page request before the sync gives up.
pub const MAX_PAGE_ATTEMPTS: usize = 5;

/// Fixed delay between page request attempts.
pub const PAGE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// One remote table plus its optional server-side filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl DataSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Opaque "last modified" marker supplied by the remote for a data source.
///
/// Two syncs observing the same token assume the remote data is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessToken(String);

impl FreshnessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FreshnessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An untyped row returned by the remote API.
///
/// The record identifier is also injected into `properties` under [`RECORD_ID_KEY`]
/// so transforms that only see the property map can find it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    id: String,
    properties: Map<String, Value>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, mut properties: Map<String, Value>) -> Self {
        let id = id.into();
        properties.insert(RECORD_ID_KEY.to_string(), Value::String(id.clone()));
        Self { id, properties }
    }

    /// Build a record from a page object `{"id": ..., "properties": {...}}`.
    ///
    /// Returns `None` when the page has no id or no `properties` object.
    pub fn from_page(page: &Value) -> Option<Self> {
        let id = page.get("id")?.as_str()?;
        let properties = page.get("properties")?.as_object()?.clone();
        Some(Self::new(id, properties))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn into_properties(self) -> Map<String, Value> {
        self.properties
    }
}

/// Persisted raw payload plus the freshness token it was downloaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub payload: String,
    pub token: Option<FreshnessToken>,
}

/// How a table load was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
    /// Already present in the typed cache; nothing was contacted.
    Memory,
    /// Freshness token unchanged; records rebuilt from the persisted snapshot.
    Snapshot,
    /// Downloaded page by page from the remote API.
    Remote,
}

impl LoadOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Snapshot => "snapshot",
            Self::Remote => "remote",
        }
    }
}

/// Phases of a single table sync, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    CheckingFreshness,
    Skipping,
    Fallback,
    Fetching,
    Paginating,
    Done,
    Failed,
}

/// Result of synchronizing one data source.
#[derive(Debug)]
pub struct TableLoad<T> {
    pub source_id: String,
    /// Typed records in remote order.
    pub records: Vec<Arc<T>>,
    pub origin: LoadOrigin,
    /// Token observed on the remote during this load (None for memory hits).
    pub token: Option<FreshnessToken>,
    /// Malformed pages encountered while paginating. Records from other pages are kept.
    pub page_errors: Vec<SyncError>,
}

impl<T> TableLoad<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when every page was parsed without a structural error.
    pub fn is_complete(&self) -> bool {
        self.page_errors.is_empty()
    }
}

/// Knobs for a table synchronizer.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Populate the typed cache (`tables` and `items`) with loaded records.
    pub allow_caching: bool,
    /// Return an already cached table without contacting the remote.
    pub reuse_cached_table: bool,
    pub max_page_attempts: usize,
    pub retry_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            allow_caching: true,
            reuse_cached_table: true,
            max_page_attempts: MAX_PAGE_ATTEMPTS,
            retry_delay: PAGE_RETRY_DELAY,
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_caching(mut self, allow: bool) -> Self {
        self.allow_caching = allow;
        self
    }

    pub fn reuse_cached_table(mut self, reuse: bool) -> Self {
        self.reuse_cached_table = reuse;
        self
    }

    pub fn with_retry(mut self, max_page_attempts: usize, retry_delay: Duration) -> Self {
        self.max_page_attempts = max_page_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }
}

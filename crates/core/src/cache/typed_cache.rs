//! In-memory typed cache for loaded tables and individual records.
//!
//! Tables are stored under their data source key together with the element type
//! they were inserted with; reads for a different element type fail with
//! [`CacheError::TypeMismatch`] instead of silently returning nothing.
//! Items are keyed by record identifier across all data sources (last write wins).

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error};

use crate::errors::{CacheError, TransformError};
use crate::sync::RawRecord;

type ErasedValue = Arc<dyn Any + Send + Sync>;

const RAW_RECORDS_TYPE: &str = "raw records";

/// Runtime tag for the element type of a cached table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementType {
    id: TypeId,
    name: &'static str,
}

impl ElementType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

enum TableRows {
    /// Holds a `Vec<Arc<T>>` where `T` matches `element`.
    Typed {
        element: ElementType,
        rows: ErasedValue,
        len: usize,
    },
    /// Untyped rows awaiting a transform on first typed read.
    Raw(Arc<Vec<RawRecord>>),
}

impl TableRows {
    fn typed<T: Send + Sync + 'static>(rows: Vec<Arc<T>>) -> Self {
        let len = rows.len();
        Self::Typed {
            element: ElementType::of::<T>(),
            rows: Arc::new(rows),
            len,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Typed { element, .. } => element.name(),
            Self::Raw(_) => RAW_RECORDS_TYPE,
        }
    }

    fn downcast<T: Send + Sync + 'static>(&self, key: &str) -> Result<Vec<Arc<T>>, CacheError> {
        let mismatch = || CacheError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
            actual: self.type_name(),
        };
        match self {
            Self::Typed { element, rows, .. } if element.is::<T>() => rows
                .downcast_ref::<Vec<Arc<T>>>()
                .cloned()
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }
}

/// Process-wide cache of typed tables (per data source) and items (per record id).
///
/// Entries are only ever replaced, never evicted.
#[derive(Default)]
pub struct TypedCache {
    tables: RwLock<HashMap<String, TableRows>>,
    items: RwLock<HashMap<String, ErasedValue>>,
}

impl TypedCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, HashMap<String, TableRows>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, HashMap<String, TableRows>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_items(&self) -> RwLockReadGuard<'_, HashMap<String, ErasedValue>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_items(&self) -> RwLockWriteGuard<'_, HashMap<String, ErasedValue>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tables
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached table for `key` as `T`.
    ///
    /// `Ok(None)` when nothing is cached for the key; `Err` when the table was stored
    /// with another element type (or is still raw, see [`Self::materialize_table`]).
    pub fn get_table<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<Vec<Arc<T>>>, CacheError> {
        self.read_tables()
            .get(key)
            .map(|rows| rows.downcast::<T>(key))
            .transpose()
    }

    /// Replace the cached table for `key`.
    pub fn set_table<T: Send + Sync + 'static>(&self, key: impl Into<String>, rows: Vec<Arc<T>>) {
        let key = key.into();
        debug!(
            "[TypedCache] Caching table {} ({} x {})",
            key,
            rows.len(),
            type_name::<T>()
        );
        self.write_tables().insert(key, TableRows::typed(rows));
    }

    /// Store untyped rows for `key`; they are converted on the first
    /// [`Self::materialize_table`] call.
    pub fn set_raw_table(&self, key: impl Into<String>, rows: Vec<RawRecord>) {
        self.write_tables()
            .insert(key.into(), TableRows::Raw(Arc::new(rows)));
    }

    /// Typed view of the table for `key`, converting raw rows once with `transform`
    /// and replacing the entry in place with the typed result.
    ///
    /// Rows whose transform fails are dropped and logged.
    pub fn materialize_table<T, F>(
        &self,
        key: &str,
        transform: F,
    ) -> Result<Option<Vec<Arc<T>>>, CacheError>
    where
        T: Send + Sync + 'static,
        F: Fn(&RawRecord) -> Result<T, TransformError>,
    {
        let raw = match self.read_tables().get(key) {
            None => return Ok(None),
            Some(TableRows::Raw(raw)) => Arc::clone(raw),
            Some(typed) => return typed.downcast::<T>(key).map(Some),
        };

        let rows: Vec<Arc<T>> = raw
            .iter()
            .filter_map(|record| match transform(record) {
                Ok(value) => Some(Arc::new(value)),
                Err(err) => {
                    error!(
                        "[TypedCache] Dropping record {} of {}: {}",
                        record.id(),
                        key,
                        err
                    );
                    None
                }
            })
            .collect();

        let mut tables = self.write_tables();
        // Replaced by another typed write while converting; that one wins.
        if let Some(existing @ TableRows::Typed { .. }) = tables.get(key) {
            return existing.downcast::<T>(key).map(Some);
        }
        tables.insert(key.to_string(), TableRows::typed(rows.clone()));
        Ok(Some(rows))
    }

    pub fn has_table(&self, key: &str) -> bool {
        self.read_tables().contains_key(key)
    }

    /// Element type recorded for a typed table.
    pub fn element_type(&self, key: &str) -> Option<ElementType> {
        match self.read_tables().get(key)? {
            TableRows::Typed { element, .. } => Some(*element),
            TableRows::Raw(_) => None,
        }
    }

    pub fn table_keys(&self) -> Vec<String> {
        self.read_tables().keys().cloned().collect()
    }

    /// Rows of table `key` matching `predicate`, in stored order.
    pub fn find_items<T, P>(
        &self,
        key: &str,
        predicate: P,
    ) -> Result<Option<Vec<Arc<T>>>, CacheError>
    where
        T: Send + Sync + 'static,
        P: Fn(&T) -> bool,
    {
        Ok(self
            .get_table::<T>(key)?
            .map(|rows| rows.into_iter().filter(|row| predicate(row)).collect()))
    }

    /// Rows matching `predicate` from the first non-empty table holding `T`.
    ///
    /// Tables are visited in unspecified order and only one table is searched; when
    /// more than one table holds `T`, prefer [`Self::find_items`] with an explicit key.
    pub fn find_items_any<T, P>(&self, predicate: P) -> Option<Vec<Arc<T>>>
    where
        T: Send + Sync + 'static,
        P: Fn(&T) -> bool,
    {
        let tables = self.read_tables();
        let (key, rows) = tables.iter().find(|(_, rows)| {
            matches!(rows, TableRows::Typed { element, len, .. } if element.is::<T>() && *len > 0)
        })?;
        let rows = rows.downcast::<T>(key).ok()?;
        Some(rows.into_iter().filter(|row| predicate(row)).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Items
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached record for `id`, or `None` if missing or not a `T`.
    pub fn get_item<T: Send + Sync + 'static>(&self, id: &str) -> Option<Arc<T>> {
        let item = self.read_items().get(id).cloned()?;
        item.downcast::<T>().ok()
    }

    /// Insert or overwrite the record for `id`.
    pub fn put_item<T: Send + Sync + 'static>(&self, id: impl Into<String>, item: Arc<T>) {
        self.write_items().insert(id.into(), item);
    }

    pub fn has_item(&self, id: &str) -> bool {
        self.read_items().contains_key(id)
    }

    pub fn item_count(&self) -> usize {
        self.read_items().len()
    }
}

impl std::fmt::Debug for TypedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache")
            .field("tables", &self.read_tables().len())
            .field("items", &self.read_items().len())
            .finish()
    }
}

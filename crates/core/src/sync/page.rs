//! Single record download outside of a table load.

use std::sync::Arc;

use log::{debug, error};
use serde_json::Value;

use super::deserializer::RecordDeserializer;
use super::model::RawRecord;
use super::remote::RemoteTableApi;
use crate::cache::TypedCache;
use crate::errors::{Result, SyncError};

/// Download one page by id and transform it.
///
/// With `cache_item` the record lands in the typed cache's item map only; no table entry
/// is touched. Returns `Ok(None)` when the page has no properties.
pub async fn fetch_record<D: RecordDeserializer>(
    api: &dyn RemoteTableApi,
    cache: &TypedCache,
    page_id: &str,
    deserializer: &D,
    cache_item: bool,
) -> Result<Option<Arc<D::Record>>> {
    let body = api.fetch_page(page_id).await?;
    let page: Value = serde_json::from_str(&body)
        .map_err(|e| SyncError::malformed(format!("invalid page {}: {}", page_id, e)))?;

    // Some page payloads omit the id; the requested one is authoritative.
    let Some(properties) = page.get("properties").and_then(Value::as_object) else {
        debug!("[TableSync] Page {} has no properties", page_id);
        return Ok(None);
    };
    let raw = RawRecord::new(page_id, properties.clone());

    let record = Arc::new(deserializer.create(&raw).map_err(|err| {
        error!("[TableSync] Failed to read page {}: {}", page_id, err);
        SyncError::from(err)
    })?);
    if cache_item {
        cache.put_item(page_id, Arc::clone(&record));
    }
    Ok(Some(record))
}

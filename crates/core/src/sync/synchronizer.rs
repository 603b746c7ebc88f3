//! Table synchronizer: freshness check, paginated fetch with retry, snapshot fallback.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;

use super::cancel::CancelSignal;
use super::deserializer::RecordDeserializer;
use super::model::{
    DataSource, FreshnessToken, LoadOrigin, RawRecord, SyncOptions, SyncPhase, TableLoad,
};
use super::remote::{QueryPage, RemoteTableApi};
use crate::cache::TypedCache;
use crate::errors::{Result, SyncError};
use crate::snapshot::PersistentSnapshotStore;

/// Loads one data source at a time into the shared caches.
///
/// Cheap to clone; clones share the API client, the typed cache and the snapshot store.
/// Two concurrent syncs of the same data source are not supported.
#[derive(Clone)]
pub struct TableSynchronizer {
    api: Arc<dyn RemoteTableApi>,
    cache: Arc<TypedCache>,
    snapshots: PersistentSnapshotStore,
    options: SyncOptions,
}

impl TableSynchronizer {
    pub fn new(
        api: Arc<dyn RemoteTableApi>,
        cache: Arc<TypedCache>,
        snapshots: PersistentSnapshotStore,
    ) -> Self {
        Self {
            api,
            cache,
            snapshots,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<TypedCache> {
        &self.cache
    }

    pub fn snapshots(&self) -> &PersistentSnapshotStore {
        &self.snapshots
    }

    pub fn api(&self) -> &Arc<dyn RemoteTableApi> {
        &self.api
    }

    /// Produce the typed records of `source`, from memory, the persisted snapshot or the remote.
    ///
    /// Records whose transform fails are logged and left out. Network failures while
    /// paging are retried up to `max_page_attempts`; a failing freshness check is not.
    pub async fn sync<D: RecordDeserializer>(
        &self,
        source: &DataSource,
        deserializer: &D,
        cancel: &CancelSignal,
    ) -> Result<TableLoad<D::Record>> {
        let result = self.sync_inner(source, deserializer, cancel).await;
        match &result {
            Ok(load) => {
                trace_phase(&source.id, SyncPhase::Done);
                debug!(
                    "[TableSync] {} loaded {} records from {}",
                    source.id,
                    load.len(),
                    load.origin.as_str()
                );
            }
            Err(SyncError::Cancelled) => {
                info!("[TableSync] {} cancelled", source.id);
            }
            Err(err) => {
                trace_phase(&source.id, SyncPhase::Failed);
                error!("[TableSync] Failed to load {}: {}", source.id, err);
            }
        }
        result
    }

    async fn sync_inner<D: RecordDeserializer>(
        &self,
        source: &DataSource,
        deserializer: &D,
        cancel: &CancelSignal,
    ) -> Result<TableLoad<D::Record>> {
        if self.options.allow_caching && self.options.reuse_cached_table {
            let cached = self
                .cache
                .materialize_table(&source.id, |raw| deserializer.create(raw))?;
            if let Some(records) = cached {
                debug!("[TableSync] {} served from memory", source.id);
                return Ok(TableLoad {
                    source_id: source.id.clone(),
                    records,
                    origin: LoadOrigin::Memory,
                    token: None,
                    page_errors: Vec::new(),
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        trace_phase(&source.id, SyncPhase::CheckingFreshness);
        let remote_token = race_cancel(cancel, self.api.fetch_freshness_token(&source.id)).await?;
        let stored_token = self.snapshots.load_freshness_token(&source.id)?;

        if remote_token.is_some() && remote_token == stored_token {
            trace_phase(&source.id, SyncPhase::Skipping);
            warn!(
                "[TableSync] {} unchanged since {}, using stored snapshot",
                source.id,
                stored_token.as_ref().map(FreshnessToken::as_str).unwrap_or_default()
            );
            match self.load_from_snapshot(source, deserializer).await? {
                Some(records) => {
                    return Ok(TableLoad {
                        source_id: source.id.clone(),
                        records,
                        origin: LoadOrigin::Snapshot,
                        token: remote_token,
                        page_errors: Vec::new(),
                    });
                }
                None => warn!(
                    "[TableSync] {} has no usable snapshot, downloading instead",
                    source.id
                ),
            }
        }

        self.fetch(source, deserializer, remote_token, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fallback
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild records from the persisted payload. `None` when it is missing or unreadable.
    async fn load_from_snapshot<D: RecordDeserializer>(
        &self,
        source: &DataSource,
        deserializer: &D,
    ) -> Result<Option<Vec<Arc<D::Record>>>> {
        trace_phase(&source.id, SyncPhase::Fallback);
        let Some(payload) = self.snapshots.load_snapshot(&source.id)? else {
            return Ok(None);
        };

        let parsed = tokio::task::spawn_blocking(move || parse_snapshot(&payload))
            .await
            .map_err(|e| SyncError::malformed(format!("snapshot parse task failed: {}", e)))?;

        let pages = match parsed {
            Ok(pages) => pages,
            Err(err) => {
                warn!("[TableSync] Stored snapshot of {} is corrupt: {}", source.id, err);
                return Ok(None);
            }
        };

        let mut records = Vec::with_capacity(pages.len());
        for page in &pages {
            self.ingest(&source.id, page, deserializer, &mut records);
        }

        if self.options.allow_caching {
            self.cache.set_table(source.id.clone(), records.clone());
        }
        Ok(Some(records))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch
    // ─────────────────────────────────────────────────────────────────────────

    async fn fetch<D: RecordDeserializer>(
        &self,
        source: &DataSource,
        deserializer: &D,
        token: Option<FreshnessToken>,
        cancel: &CancelSignal,
    ) -> Result<TableLoad<D::Record>> {
        trace_phase(&source.id, SyncPhase::Fetching);

        let mut records = Vec::new();
        let mut raw_pages = Vec::new();
        let mut page_errors = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_index = 0usize;

        loop {
            let body = self.query_with_retry(source, cursor.as_deref(), cancel).await?;
            page_index += 1;

            let parsed = QueryPage::parse(&body);
            if let Some(err) = parsed.error {
                warn!(
                    "[TableSync] Page {} of {} is malformed: {}",
                    page_index, source.id, err
                );
                page_errors.push(err);
            }

            for page in &parsed.page.results {
                self.ingest(&source.id, page, deserializer, &mut records);
            }
            raw_pages.extend(parsed.page.results.iter().cloned());

            if !parsed.can_continue {
                break;
            }
            match parsed.page.continuation() {
                Some(next) => {
                    trace_phase(&source.id, SyncPhase::Paginating);
                    cursor = Some(next.to_string());
                }
                None => break,
            }
        }

        self.commit(source, raw_pages, token.as_ref(), &page_errors)?;
        if self.options.allow_caching {
            self.cache.set_table(source.id.clone(), records.clone());
        }

        Ok(TableLoad {
            source_id: source.id.clone(),
            records,
            origin: LoadOrigin::Remote,
            token,
            page_errors,
        })
    }

    /// One page request with a fixed attempt budget and a fixed delay between attempts.
    async fn query_with_retry(
        &self,
        source: &DataSource,
        cursor: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<String> {
        let max_attempts = self.options.max_page_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let request = self
                .api
                .query_page(&source.id, source.filter.as_ref(), cursor);
            match race_cancel(cancel, request).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    error!(
                        "[TableSync] Giving up on {} after {} attempts: {}",
                        source.id, attempt, err
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "[TableSync] Page request for {} failed (attempt {}/{}): {}",
                        source.id, attempt, max_attempts, err
                    );
                }
            }

            wait_or_cancel(cancel, self.options.retry_delay).await?;
            attempt += 1;
        }
    }

    fn commit(
        &self,
        source: &DataSource,
        raw_pages: Vec<Value>,
        token: Option<&FreshnessToken>,
        page_errors: &[SyncError],
    ) -> Result<()> {
        if !page_errors.is_empty() {
            warn!(
                "[TableSync] Not persisting snapshot of {}: {} malformed page(s)",
                source.id,
                page_errors.len()
            );
            return Ok(());
        }
        let Some(token) = token else {
            debug!(
                "[TableSync] {} has no freshness token, snapshot not persisted",
                source.id
            );
            return Ok(());
        };

        let payload = serde_json::to_string(&Value::Array(raw_pages))?;
        self.snapshots.commit(&source.id, &payload, token)
    }

    /// Transform one page object and append it to `records`. Failures are logged and skipped.
    fn ingest<D: RecordDeserializer>(
        &self,
        source_id: &str,
        page: &Value,
        deserializer: &D,
        records: &mut Vec<Arc<D::Record>>,
    ) {
        let Some(raw) = RawRecord::from_page(page) else {
            warn!(
                "[TableSync] Skipping entry without id or properties in {}",
                source_id
            );
            return;
        };

        match deserializer.create(&raw) {
            Ok(record) => {
                let record = Arc::new(record);
                if self.options.allow_caching {
                    self.cache.put_item(raw.id(), Arc::clone(&record));
                }
                records.push(record);
            }
            Err(err) => {
                error!(
                    "[TableSync] Failed to read record {} of {}: {}",
                    raw.id(),
                    source_id,
                    err
                );
            }
        }
    }
}

impl std::fmt::Debug for TableSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSynchronizer")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn parse_snapshot(payload: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(payload)? {
        Value::Array(pages) => Ok(pages),
        _ => Err(SyncError::malformed("snapshot is not a JSON array")),
    }
}

fn trace_phase(source_id: &str, phase: SyncPhase) {
    debug!("[TableSync] {} -> {:?}", source_id, phase);
}

/// Await `fut`, or fail with [`SyncError::Cancelled`] as soon as `cancel` fires.
pub(crate) async fn race_cancel<T, F>(cancel: &CancelSignal, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}

async fn wait_or_cancel(cancel: &CancelSignal, delay: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

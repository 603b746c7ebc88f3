//! Drives several table syncs, reports progress and runs post-processing after a barrier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use log::{error, info, warn};

use super::cancel::CancelSignal;
use super::deserializer::RecordDeserializer;
use super::model::{DataSource, FreshnessToken, LoadOrigin};
use super::progress::ProgressNotifier;
use super::synchronizer::TableSynchronizer;
use crate::errors::{Result, SyncError};

type LoadedHook<T> = Box<dyn Fn(&[Arc<T>]) + Send + Sync>;

/// How registered sources are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// All sources load at the same time.
    #[default]
    Concurrent,
    /// Sources load one after another in registration order.
    Sequential,
}

/// Which sources get their post-processing run when some sources failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostProcessPolicy {
    /// Every source that loaded successfully.
    #[default]
    SucceededSources,
    /// None at all unless every source loaded successfully.
    AllOrNothing,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorOptions {
    pub mode: SyncMode,
    pub post_process: PostProcessPolicy,
}

/// One data source, its deserializer and the actions to run on its records.
pub struct TableRegistration<D: RecordDeserializer> {
    source: DataSource,
    deserializer: D,
    hooks: Vec<LoadedHook<D::Record>>,
    loaded: Mutex<Option<Vec<Arc<D::Record>>>>,
}

impl<D: RecordDeserializer> TableRegistration<D> {
    pub fn new(source: DataSource, deserializer: D) -> Self {
        Self {
            source,
            deserializer,
            hooks: Vec::new(),
            loaded: Mutex::new(None),
        }
    }

    /// Add a post-processing action. Actions run in the order they were added, after
    /// every registered source has finished loading.
    pub fn on_loaded<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[Arc<D::Record>]) + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }
}

/// Type-erased view of a registration so sources with different record types share a list.
#[async_trait]
trait RegisteredTable: Send + Sync {
    fn source(&self) -> &DataSource;

    async fn load(
        &self,
        synchronizer: &TableSynchronizer,
        cancel: &CancelSignal,
    ) -> Result<SourceSummary>;

    fn post_process(&self);
}

#[async_trait]
impl<D: RecordDeserializer> RegisteredTable for TableRegistration<D> {
    fn source(&self) -> &DataSource {
        &self.source
    }

    async fn load(
        &self,
        synchronizer: &TableSynchronizer,
        cancel: &CancelSignal,
    ) -> Result<SourceSummary> {
        let load = synchronizer
            .sync(&self.source, &self.deserializer, cancel)
            .await?;
        let summary = SourceSummary {
            count: load.records.len(),
            origin: load.origin,
            token: load.token,
            page_errors: load.page_errors,
        };
        *self.loaded.lock().unwrap_or_else(PoisonError::into_inner) = Some(load.records);
        Ok(summary)
    }

    fn post_process(&self) {
        let Some(records) = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        for hook in &self.hooks {
            hook(&records);
        }
        self.deserializer.on_finished(&records);
    }
}

/// Summary of one successfully loaded source.
#[derive(Debug)]
pub struct SourceSummary {
    pub count: usize,
    pub origin: LoadOrigin,
    pub token: Option<FreshnessToken>,
    pub page_errors: Vec<SyncError>,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: String,
    pub result: Result<SourceSummary>,
}

/// Per-source results of one coordinator run, in registration order.
#[derive(Debug)]
pub struct CoordinatorReport {
    pub outcomes: Vec<SourceOutcome>,
    /// The run observed cancellation; post-processing and `end` were skipped.
    pub cancelled: bool,
}

impl CoordinatorReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            Ok(_) => None,
            Err(err) => Some((outcome.source_id.as_str(), err)),
        })
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn total_records(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(|summary| summary.count)
            .sum()
    }
}

/// Loads every registered source and runs post-processing once all of them are done.
pub struct SyncCoordinator {
    synchronizer: TableSynchronizer,
    tables: Vec<Box<dyn RegisteredTable>>,
    options: CoordinatorOptions,
}

impl SyncCoordinator {
    pub fn new(synchronizer: TableSynchronizer) -> Self {
        Self {
            synchronizer,
            tables: Vec::new(),
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn register<D: RecordDeserializer>(&mut self, registration: TableRegistration<D>) -> &mut Self {
        self.tables.push(Box::new(registration));
        self
    }

    pub fn synchronizer(&self) -> &TableSynchronizer {
        &self.synchronizer
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load all registered sources.
    ///
    /// Post-processing actions run only after every source has finished, in registration
    /// order. A failing source never stops the others. On cancellation nothing is
    /// post-processed and `end` is not signalled.
    pub async fn run(
        &self,
        notifier: &dyn ProgressNotifier,
        cancel: &CancelSignal,
    ) -> CoordinatorReport {
        let total = self.tables.len();
        let completed = AtomicUsize::new(0);

        notifier.start();
        notifier.update(0.0);
        info!(
            "[SyncCoordinator] Loading {} source(s) ({:?})",
            total, self.options.mode
        );

        let outcomes = match self.options.mode {
            SyncMode::Concurrent => {
                join_all(self.tables.iter().map(|table| {
                    self.load_one(table.as_ref(), notifier, cancel, &completed, total)
                }))
                .await
            }
            SyncMode::Sequential => {
                let mut outcomes = Vec::with_capacity(total);
                for table in &self.tables {
                    outcomes.push(
                        self.load_one(table.as_ref(), notifier, cancel, &completed, total)
                            .await,
                    );
                }
                outcomes
            }
        };

        let cancelled = cancel.is_cancelled()
            || outcomes
                .iter()
                .any(|o| matches!(&o.result, Err(err) if err.is_cancelled()));
        if cancelled {
            info!("[SyncCoordinator] Load cancelled, skipping post-processing");
            return CoordinatorReport {
                outcomes,
                cancelled: true,
            };
        }

        self.post_process(&outcomes);
        notifier.end();

        CoordinatorReport {
            outcomes,
            cancelled: false,
        }
    }

    async fn load_one(
        &self,
        table: &dyn RegisteredTable,
        notifier: &dyn ProgressNotifier,
        cancel: &CancelSignal,
        completed: &AtomicUsize,
        total: usize,
    ) -> SourceOutcome {
        let started = Instant::now();
        let result = table.load(&self.synchronizer, cancel).await;
        let source_id = table.source().id.clone();
        info!(
            "[SyncCoordinator] {} finished in {} ms",
            source_id,
            started.elapsed().as_millis()
        );
        if let Err(err) = &result {
            if !err.is_cancelled() {
                error!("[SyncCoordinator] Source {} failed: {}", source_id, err);
            }
        }

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        notifier.update(progress_ratio(done, total));
        SourceOutcome { source_id, result }
    }

    fn post_process(&self, outcomes: &[SourceOutcome]) {
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 && self.options.post_process == PostProcessPolicy::AllOrNothing {
            warn!(
                "[SyncCoordinator] {} source(s) failed, skipping all post-processing",
                failed
            );
            return;
        }

        for (table, outcome) in self.tables.iter().zip(outcomes) {
            if outcome.result.is_ok() {
                table.post_process();
            }
        }
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field(
                "sources",
                &self.tables.iter().map(|t| t.source().id.as_str()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

fn progress_ratio(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}

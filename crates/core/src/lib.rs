//! Remote table synchronization with a two-tier cache.
//!
//! A [`sync::TableSynchronizer`] loads one remote data source: it compares the remote
//! freshness token with the persisted one, then either rebuilds records from the stored
//! snapshot or downloads every page with retry. Typed records land in the shared
//! [`cache::TypedCache`]. A [`sync::SyncCoordinator`] drives many sources at once and
//! runs post-processing after all of them have finished.

pub mod cache;
pub mod errors;
pub mod snapshot;
pub mod sync;
pub mod values;

pub use cache::{ElementType, TypedCache};
pub use errors::{CacheError, Result, SyncError, TransformError};
pub use snapshot::{KeyValueStore, MemoryKeyValueStore, PersistentSnapshotStore};
pub use sync::{
    CancelSignal, CoordinatorOptions, CoordinatorReport, DataSource, FreshnessToken, LoadOrigin,
    ProgressNotifier, RawRecord, RecordDeserializer, RemoteTableApi, SyncCoordinator,
    SyncOptions, TableLoad, TableRegistration, TableSynchronizer,
};

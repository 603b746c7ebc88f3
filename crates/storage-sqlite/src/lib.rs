//! SQLite storage for tablesync snapshots and freshness tokens.

pub mod db;
pub mod errors;
pub mod kv_store;
pub mod model;
pub mod schema;

pub use db::{create_pool, get_connection, open, run_migrations, DbPool};
pub use errors::StorageError;
pub use kv_store::SqliteKeyValueStore;

//! [`KeyValueStore`] backed by the `kv_entries` table.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use tablesync_core::snapshot::KeyValueStore;

use crate::db::{get_connection, DbPool};
use crate::errors::StorageError;
use crate::model::KvEntryDB;
use crate::schema::kv_entries;

pub struct SqliteKeyValueStore {
    pool: Arc<DbPool>,
}

impl SqliteKeyValueStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        SqliteKeyValueStore { pool }
    }

    /// Migrate and open the database at `db_path`.
    pub fn open(db_path: &str) -> crate::errors::Result<Self> {
        Ok(Self::new(crate::db::open(db_path)?))
    }

    pub fn remove(&self, key: &str) -> tablesync_core::Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let deleted = diesel::delete(kv_entries::table.find(key))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        Ok(deleted > 0)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> tablesync_core::Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = kv_entries::table
            .find(key)
            .select(kv_entries::value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> tablesync_core::Result<()> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        let row = KvEntryDB {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now.clone(),
        };

        diesel::insert_into(kv_entries::table)
            .values(&row)
            .on_conflict(kv_entries::key)
            .do_update()
            .set((kv_entries::value.eq(value), kv_entries::updated_at.eq(now)))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn has_key(&self, key: &str) -> tablesync_core::Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = kv_entries::table
            .filter(kv_entries::key.eq(key))
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }
}

impl std::fmt::Debug for SqliteKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKeyValueStore").finish_non_exhaustive()
    }
}

//! Database models for the key-value table.

use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(key))]
#[diesel(table_name = crate::schema::kv_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KvEntryDB {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

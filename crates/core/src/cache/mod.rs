//! In-memory caches shared by table synchronizers.

mod typed_cache;

pub use typed_cache::*;

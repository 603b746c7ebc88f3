//! Record deserializers: raw record to typed record.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::errors::TransformError;

use super::model::RawRecord;

/// Maps raw records of one data source into typed records.
///
/// `create` must be pure; a failing record is logged and dropped by the caller.
pub trait RecordDeserializer: Send + Sync + 'static {
    type Record: Send + Sync + 'static;

    fn create(&self, raw: &RawRecord) -> Result<Self::Record, TransformError>;

    /// Called once with the complete table after every source of a load has finished.
    fn on_finished(&self, _records: &[Arc<Self::Record>]) {}
}

/// [`RecordDeserializer`] backed by a closure.
pub struct FnDeserializer<T, F> {
    create: F,
    _record: PhantomData<fn() -> T>,
}

/// Wrap a closure as a [`RecordDeserializer`].
pub fn deserializer_fn<T, F>(create: F) -> FnDeserializer<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&RawRecord) -> Result<T, TransformError> + Send + Sync + 'static,
{
    FnDeserializer {
        create,
        _record: PhantomData,
    }
}

impl<T, F> RecordDeserializer for FnDeserializer<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&RawRecord) -> Result<T, TransformError> + Send + Sync + 'static,
{
    type Record = T;

    fn create(&self, raw: &RawRecord) -> Result<T, TransformError> {
        (self.create)(raw)
    }
}

impl<T, F> fmt::Debug for FnDeserializer<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDeserializer")
            .field("record", &std::any::type_name::<T>())
            .finish()
    }
}

/// Passes records through as their property maps.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertiesDeserializer;

impl RecordDeserializer for PropertiesDeserializer {
    type Record = serde_json::Map<String, serde_json::Value>;

    fn create(&self, raw: &RawRecord) -> Result<Self::Record, TransformError> {
        Ok(raw.properties().clone())
    }
}

use std::sync::Arc;

use crate::{error::BackendError, DataPoint};

/// A time-series store the importer writes into.
///
/// `write_points` must be all-or-nothing for the batch it is given.
/// Timestamps carry millisecond precision.
pub trait Backend: Send + Sync {
    fn write_points(&self, points: &[DataPoint]) -> Result<(), BackendError>;
    fn database_exists(&self, name: &str) -> Result<bool, BackendError>;
    fn create_database(&self, name: &str) -> Result<(), BackendError>;
    fn switch_database(&self, name: &str) -> Result<(), BackendError>;
}
impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn write_points(&self, points: &[DataPoint]) -> Result<(), BackendError> {
        (**self).write_points(points)
    }
    fn database_exists(&self, name: &str) -> Result<bool, BackendError> {
        (**self).database_exists(name)
    }
    fn create_database(&self, name: &str) -> Result<(), BackendError> {
        (**self).create_database(name)
    }
    fn switch_database(&self, name: &str) -> Result<(), BackendError> {
        (**self).switch_database(name)
    }
}

/// Creates `name` unless it already exists, then selects it for writes.
pub fn ensure_database<B: Backend + ?Sized>(backend: &B, name: &str) -> Result<(), BackendError> {
    if backend.database_exists(name)? {
        tracing::info!(database = name, "database already exists, not creating it");
    } else {
        tracing::info!(database = name, "creating database");
        backend.create_database(name)?;
    }
    backend.switch_database(name)
}

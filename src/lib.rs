//! Buffered batch ingestion of metric samples into a time-series database.
//!
//! Producers push samples into a bounded queue, a background drain thread
//! writes whatever accumulated as one batch, and failed writes are retried
//! before the configured failure policy decides between dropping and raising.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

pub mod backend;
pub mod codec;
pub mod config;
pub mod drain;
pub mod error;
pub mod influx;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod sampler;
pub mod writer;

pub use backend::Backend;
pub use config::{ImporterConfig, InfluxConfig};
pub use error::{BackendError, ImportError};
pub use influx::InfluxClient;
pub use pipeline::{Pipeline, StopHandle};
pub use queue::{BoundedQueue, OverflowPolicy};
pub use sampler::{Producer, SampleErrorPolicy};

/// Milliseconds since the Unix epoch.
pub type Time = u64;
pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, FieldValue>;

pub fn now() -> Time {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}
impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}
impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}
impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}
impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}
impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// One reading returned by a producer callback, before the pipeline stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub measurement: String,
    pub fields: Fields,
}
impl Sample {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            fields: Fields::new(),
        }
    }
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A stamped sample as it travels through the queue to the backend.
///
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    measurement: String,
    tags: Arc<Tags>,
    timestamp: Time,
    fields: Fields,
}
impl DataPoint {
    pub fn new(measurement: String, tags: Arc<Tags>, timestamp: Time, fields: Fields) -> Self {
        Self {
            measurement,
            tags,
            timestamp,
            fields,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }
    pub fn tags(&self) -> &Tags {
        &self.tags
    }
    pub fn timestamp(&self) -> Time {
        self.timestamp
    }
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

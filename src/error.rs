use crate::{queue::PutError, DataPoint};

/// A failed backend call. Every variant is treated as recoverable and retried.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("query failed: {0}")]
    Query(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("no database selected")]
    NoDatabase,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unable to import {} points after {attempts} retries: {last_error}", .batch.len())]
    ExhaustedRetries {
        attempts: usize,
        last_error: BackendError,
        batch: Vec<DataPoint>,
    },
    #[error("failed to provision database `{database}`: {source}")]
    Provision {
        database: String,
        #[source]
        source: BackendError,
    },
    #[error("queue is full, `{}` point not queued", .0.measurement())]
    QueueFull(DataPoint),
    #[error("pipeline is not draining, `{}` point not queued", .0.measurement())]
    QueueClosed(DataPoint),
    #[error("measurement `{0}` has no fields")]
    EmptyFields(String),
    #[error("field `{field}` of `{measurement}` is not a finite number")]
    NonFiniteField { measurement: String, field: String },
    #[error("{kind} `{name}` contains a line break")]
    LineBreak { kind: &'static str, name: String },
    #[error("producer callback failed: {0}")]
    Producer(#[source] anyhow::Error),
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<PutError> for ImportError {
    fn from(e: PutError) -> Self {
        match e {
            PutError::Full(point) => Self::QueueFull(point),
            PutError::Closed(point) => Self::QueueClosed(point),
        }
    }
}

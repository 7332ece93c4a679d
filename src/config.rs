//! Importer configuration

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::{
    queue::{OverflowPolicy, DEFAULT_CAPACITY},
    sampler::SampleErrorPolicy,
    ImportError, Tags,
};

/// Connection settings for the InfluxDB HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Host name or IP, optionally with an `http://`/`https://` scheme
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Upper bound on one HTTP call, connect included
    #[serde(deserialize_with = "de_duration")]
    pub request_timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            username: "admin".to_string(),
            password: "admin".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl InfluxConfig {
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// Database the points are written into, created on start if absent
    pub database: String,

    /// Tags attached to every point
    pub tags: Tags,

    pub influx: InfluxConfig,

    /// Log and drop a batch once its retries are exhausted instead of failing the pipeline
    pub ignore_errors: bool,

    /// Maximum number of points waiting to be written
    pub queue_capacity: usize,

    /// What producers experience when the queue is full
    pub overflow: OverflowPolicy,

    /// Time between sampling ticks
    #[serde(deserialize_with = "de_duration")]
    pub sample_interval: Duration,

    /// How long the drain thread idles when the queue is empty
    #[serde(deserialize_with = "de_duration")]
    pub poll_interval: Duration,

    /// Total write attempts per batch
    pub max_retries: usize,

    /// Pause between two attempts of the same batch
    #[serde(deserialize_with = "de_duration")]
    pub retry_delay: Duration,

    /// What a failing producer callback does to the sampling thread
    pub on_sample_error: SampleErrorPolicy,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            database: "metrics".to_string(),
            tags: Tags::new(),
            influx: InfluxConfig::default(),
            ignore_errors: true,
            queue_capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::default(),
            sample_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            max_retries: 3,
            retry_delay: Duration::ZERO,
            on_sample_error: SampleErrorPolicy::default(),
        }
    }
}

impl ImporterConfig {
    pub fn builder() -> ImporterConfigBuilder {
        ImporterConfigBuilder::default()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ImportError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.database.is_empty() {
            return Err(ImportError::InvalidConfig("database name is empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ImportError::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ImportError::InvalidConfig(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.sample_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(ImportError::InvalidConfig(
                "sample_interval and poll_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ImporterConfigBuilder {
    config: ImporterConfig,
}

impl ImporterConfigBuilder {
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.config.database = name.into();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.tags.insert(key.into(), value.into());
        self
    }

    pub fn influx(mut self, influx: InfluxConfig) -> Self {
        self.config.influx = influx;
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_errors = ignore;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn on_sample_error(mut self, policy: SampleErrorPolicy) -> Self {
        self.config.on_sample_error = policy;
        self
    }

    pub fn build(self) -> ImporterConfig {
        self.config
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

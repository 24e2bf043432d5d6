use crate::error::{BulkError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of environment variables recognized by [`BulkConfig::apply_env_overrides`]
pub const ENV_PREFIX: &str = "AG_BULK_";

/// Bulk buffering configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Buffer and flush configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Adaptive controller configuration
    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    /// Durable store configuration
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Buffer, flush and estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Lower bound for the batch size (MIN_BUFFER)
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// Upper bound for the batch size (MAX_BUFFER)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Batch size at startup
    #[serde(default = "default_initial_batch_size")]
    pub initial_batch_size: usize,

    /// Lower bound for the flush interval in milliseconds (MIN_INTERVAL)
    #[serde(default = "default_min_flush_interval_ms")]
    pub min_flush_interval_ms: u64,

    /// Upper bound for the flush interval in milliseconds (MAX_INTERVAL)
    #[serde(default = "default_max_flush_interval_ms")]
    pub max_flush_interval_ms: u64,

    /// Flush interval at startup
    #[serde(default = "default_initial_flush_interval_ms")]
    pub initial_flush_interval_ms: u64,

    /// Period of the interval-flush check
    #[serde(default = "default_flush_check_interval_ms")]
    pub flush_check_interval_ms: u64,

    /// Timeout applied to every bulk submission
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Destination (index or table) records are written to
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Document field receiving the arrival timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Number of arrival instants kept for rate estimation
    #[serde(default = "default_rate_window_capacity")]
    pub rate_window_capacity: usize,

    /// Number of flush durations kept for latency estimation
    #[serde(default = "default_latency_window_capacity")]
    pub latency_window_capacity: usize,

    /// Average latency reported before any flush was measured
    #[serde(default = "default_latency_ms")]
    pub default_latency_ms: u64,
}

impl BufferConfig {
    pub fn min_flush_interval(&self) -> Duration {
        Duration::from_millis(self.min_flush_interval_ms)
    }

    pub fn max_flush_interval(&self) -> Duration {
        Duration::from_millis(self.max_flush_interval_ms)
    }

    pub fn initial_flush_interval(&self) -> Duration {
        Duration::from_millis(self.initial_flush_interval_ms)
    }

    pub fn flush_check_interval(&self) -> Duration {
        Duration::from_millis(self.flush_check_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn default_latency(&self) -> Duration {
        Duration::from_millis(self.default_latency_ms)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_batch_size: default_min_batch_size(),
            max_batch_size: default_max_batch_size(),
            initial_batch_size: default_initial_batch_size(),
            min_flush_interval_ms: default_min_flush_interval_ms(),
            max_flush_interval_ms: default_max_flush_interval_ms(),
            initial_flush_interval_ms: default_initial_flush_interval_ms(),
            flush_check_interval_ms: default_flush_check_interval_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
            destination: default_destination(),
            timestamp_field: default_timestamp_field(),
            rate_window_capacity: default_rate_window_capacity(),
            latency_window_capacity: default_latency_window_capacity(),
            default_latency_ms: default_latency_ms(),
        }
    }
}

/// Adaptive controller configuration.
///
/// Tier values are heuristics and meant to be recalibrated per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Period of the controller tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Below this rate (records/minute) both parameters target their minimum
    #[serde(default = "default_low_rate_per_min")]
    pub low_rate_per_min: f64,

    /// Rate at which the mid-tier values are reached
    #[serde(default = "default_mid_rate_per_min")]
    pub mid_rate_per_min: f64,

    /// At or above this rate both parameters target their maximum
    #[serde(default = "default_high_rate_per_min")]
    pub high_rate_per_min: f64,

    #[serde(default = "default_mid_batch_size")]
    pub mid_batch_size: usize,

    #[serde(default = "default_high_batch_size")]
    pub high_batch_size: usize,

    #[serde(default = "default_mid_flush_interval_ms")]
    pub mid_flush_interval_ms: u64,

    #[serde(default = "default_high_flush_interval_ms")]
    pub high_flush_interval_ms: u64,

    /// Average flush latency above which the batch target is inflated
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,

    /// Multiplier applied to the batch target under back-pressure
    #[serde(default = "default_backpressure_factor")]
    pub backpressure_factor: f64,

    /// Weight of the target in each smoothing step (new = (1 - w) * old + w * target)
    #[serde(default = "default_smoothing_weight")]
    pub smoothing_weight: f64,

    /// Minimum batch size change (records) counted as an adaptation
    #[serde(default = "default_batch_significance")]
    pub batch_significance: f64,

    /// Minimum flush interval change (milliseconds) counted as an adaptation
    #[serde(default = "default_interval_significance_ms")]
    pub interval_significance_ms: u64,
}

impl AdaptiveConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn latency_ceiling(&self) -> Duration {
        Duration::from_millis(self.latency_ceiling_ms)
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            low_rate_per_min: default_low_rate_per_min(),
            mid_rate_per_min: default_mid_rate_per_min(),
            high_rate_per_min: default_high_rate_per_min(),
            mid_batch_size: default_mid_batch_size(),
            high_batch_size: default_high_batch_size(),
            mid_flush_interval_ms: default_mid_flush_interval_ms(),
            high_flush_interval_ms: default_high_flush_interval_ms(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            backpressure_factor: default_backpressure_factor(),
            smoothing_weight: default_smoothing_weight(),
            batch_significance: default_batch_significance(),
            interval_significance_ms: default_interval_significance_ms(),
        }
    }
}

/// Durable store selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Elasticsearch(ElasticsearchConfig),
    Timescale(DatabaseConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Elasticsearch(ElasticsearchConfig::default())
    }
}

/// Elasticsearch bulk API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Cluster URLs, used round-robin
    #[serde(default = "default_es_hosts")]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// API key, takes precedence over basic auth
    #[serde(default)]
    pub api_key: Option<String>,

    /// PEM file of a CA to trust in addition to the system roots
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    /// HTTP request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ElasticsearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: default_es_hosts(),
            username: None,
            password: None,
            api_key: None,
            ca_cert_path: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Maximum number of connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout_sec")]
    pub connection_timeout_sec: u64,
}

impl DatabaseConfig {
    /// Build PostgreSQL connection string
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} connect_timeout={}",
            self.host,
            self.port,
            self.database,
            self.user,
            self.password,
            self.connection_timeout_sec
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "ag_telemetry".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: default_max_connections(),
            connection_timeout_sec: default_connection_timeout_sec(),
        }
    }
}

// Default value functions
fn default_min_batch_size() -> usize {
    10
}

fn default_max_batch_size() -> usize {
    200
}

fn default_initial_batch_size() -> usize {
    50
}

fn default_min_flush_interval_ms() -> u64 {
    1000
}

fn default_max_flush_interval_ms() -> u64 {
    10_000
}

fn default_initial_flush_interval_ms() -> u64 {
    3000
}

fn default_flush_check_interval_ms() -> u64 {
    500
}

fn default_flush_timeout_ms() -> u64 {
    10_000
}

fn default_destination() -> String {
    "telemetry".to_string()
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_rate_window_capacity() -> usize {
    100
}

fn default_latency_window_capacity() -> usize {
    20
}

fn default_latency_ms() -> u64 {
    100
}

fn default_tick_interval_ms() -> u64 {
    10_000
}

fn default_low_rate_per_min() -> f64 {
    10.0
}

fn default_mid_rate_per_min() -> f64 {
    60.0
}

fn default_high_rate_per_min() -> f64 {
    120.0
}

fn default_mid_batch_size() -> usize {
    50
}

fn default_high_batch_size() -> usize {
    120
}

fn default_mid_flush_interval_ms() -> u64 {
    3000
}

fn default_high_flush_interval_ms() -> u64 {
    6000
}

fn default_latency_ceiling_ms() -> u64 {
    1000
}

fn default_backpressure_factor() -> f64 {
    1.5
}

fn default_smoothing_weight() -> f64 {
    0.3
}

fn default_batch_significance() -> f64 {
    5.0
}

fn default_interval_significance_ms() -> u64 {
    500
}

fn default_es_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_connections() -> usize {
    10
}

fn default_connection_timeout_sec() -> u64 {
    5
}

impl BulkConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| BulkError::ConfigError(e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BulkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(|e| BulkError::ConfigError(e.to_string()))?;
        Ok(())
    }

    /// Defaults overridden by `AG_BULK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override options from `AG_BULK_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let buffer = &mut self.buffer;
        override_with(&lookup, "MIN_BUFFER", &mut buffer.min_batch_size)?;
        override_with(&lookup, "MAX_BUFFER", &mut buffer.max_batch_size)?;
        override_with(&lookup, "INITIAL_BUFFER", &mut buffer.initial_batch_size)?;
        override_with(&lookup, "MIN_INTERVAL_MS", &mut buffer.min_flush_interval_ms)?;
        override_with(&lookup, "MAX_INTERVAL_MS", &mut buffer.max_flush_interval_ms)?;
        override_with(&lookup, "INITIAL_INTERVAL_MS", &mut buffer.initial_flush_interval_ms)?;
        override_with(&lookup, "FLUSH_CHECK_MS", &mut buffer.flush_check_interval_ms)?;
        override_with(&lookup, "FLUSH_TIMEOUT_MS", &mut buffer.flush_timeout_ms)?;
        override_with(&lookup, "DESTINATION", &mut buffer.destination)?;

        let adaptive = &mut self.adaptive;
        override_with(&lookup, "TUNING_TICK_MS", &mut adaptive.tick_interval_ms)?;
        override_with(&lookup, "LATENCY_CEILING_MS", &mut adaptive.latency_ceiling_ms)?;
        override_with(&lookup, "SMOOTHING_WEIGHT", &mut adaptive.smoothing_weight)?;
        override_with(&lookup, "BATCH_SIGNIFICANCE", &mut adaptive.batch_significance)?;
        override_with(
            &lookup,
            "INTERVAL_SIGNIFICANCE_MS",
            &mut adaptive.interval_significance_ms,
        )?;

        self.validate()
    }

    /// Check bounds and thresholds for consistency
    pub fn validate(&self) -> Result<()> {
        let b = &self.buffer;
        let a = &self.adaptive;

        if b.min_batch_size == 0 || b.min_batch_size > b.max_batch_size {
            return Err(BulkError::ConfigError(format!(
                "batch size bounds must satisfy 0 < min <= max (min={}, max={})",
                b.min_batch_size, b.max_batch_size
            )));
        }
        if !(b.min_batch_size..=b.max_batch_size).contains(&b.initial_batch_size) {
            return Err(BulkError::ConfigError(format!(
                "initial batch size {} outside [{}, {}]",
                b.initial_batch_size, b.min_batch_size, b.max_batch_size
            )));
        }
        if b.min_flush_interval_ms == 0 || b.min_flush_interval_ms > b.max_flush_interval_ms {
            return Err(BulkError::ConfigError(format!(
                "flush interval bounds must satisfy 0 < min <= max (min={}ms, max={}ms)",
                b.min_flush_interval_ms, b.max_flush_interval_ms
            )));
        }
        if !(b.min_flush_interval_ms..=b.max_flush_interval_ms)
            .contains(&b.initial_flush_interval_ms)
        {
            return Err(BulkError::ConfigError(format!(
                "initial flush interval {}ms outside [{}ms, {}ms]",
                b.initial_flush_interval_ms, b.min_flush_interval_ms, b.max_flush_interval_ms
            )));
        }
        if b.flush_check_interval_ms == 0 || a.tick_interval_ms == 0 || b.flush_timeout_ms == 0 {
            return Err(BulkError::ConfigError(
                "tick periods and flush timeout must be non-zero".to_string(),
            ));
        }
        if b.rate_window_capacity < 2 || b.latency_window_capacity == 0 {
            return Err(BulkError::ConfigError(
                "rate window needs at least 2 slots and latency window at least 1".to_string(),
            ));
        }
        if b.destination.is_empty() || b.timestamp_field.is_empty() {
            return Err(BulkError::ConfigError(
                "destination and timestamp field must not be empty".to_string(),
            ));
        }
        if !(a.low_rate_per_min >= 0.0
            && a.low_rate_per_min < a.mid_rate_per_min
            && a.mid_rate_per_min < a.high_rate_per_min)
        {
            return Err(BulkError::ConfigError(format!(
                "rate thresholds must be ascending (low={}, mid={}, high={})",
                a.low_rate_per_min, a.mid_rate_per_min, a.high_rate_per_min
            )));
        }
        for (name, value) in [("mid", a.mid_batch_size), ("high", a.high_batch_size)] {
            if !(b.min_batch_size..=b.max_batch_size).contains(&value) {
                return Err(BulkError::ConfigError(format!(
                    "{} tier batch size {} outside [{}, {}]",
                    name, value, b.min_batch_size, b.max_batch_size
                )));
            }
        }
        for (name, value) in [
            ("mid", a.mid_flush_interval_ms),
            ("high", a.high_flush_interval_ms),
        ] {
            if !(b.min_flush_interval_ms..=b.max_flush_interval_ms).contains(&value) {
                return Err(BulkError::ConfigError(format!(
                    "{} tier flush interval {}ms outside [{}ms, {}ms]",
                    name, value, b.min_flush_interval_ms, b.max_flush_interval_ms
                )));
            }
        }
        if !(a.smoothing_weight > 0.0 && a.smoothing_weight <= 1.0) {
            return Err(BulkError::ConfigError(format!(
                "smoothing weight {} outside (0, 1]",
                a.smoothing_weight
            )));
        }
        if !(a.backpressure_factor >= 1.0) {
            return Err(BulkError::ConfigError(format!(
                "backpressure factor {} must be >= 1",
                a.backpressure_factor
            )));
        }
        if !(a.batch_significance >= 0.0) {
            return Err(BulkError::ConfigError(
                "batch significance must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

fn override_with<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e: T::Err| {
            BulkError::ConfigError(format!("{}{}={:?}: {}", ENV_PREFIX, key, raw, e))
        })?;
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Application payload of a telemetry record
pub type Document = Map<String, Value>;

/// Telemetry record owned by the buffer until it is handed to a flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub document: Document,
}

impl Record {
    /// Stamp a validated document with a server-side id and arrival time
    pub fn new(document: Document) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            document,
        }
    }

    /// Set arrival timestamp
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Convert into a bulk item, writing the arrival time into the document
    pub fn into_bulk_item(self, destination: &str, timestamp_field: &str) -> BulkItem {
        let mut document = self.document;
        document.insert(
            timestamp_field.to_string(),
            Value::String(self.received_at.to_rfc3339()),
        );

        BulkItem {
            id: self.id,
            destination: destination.to_string(),
            document: Value::Object(document),
            received_at: self.received_at,
        }
    }
}

/// One (destination, document) pair of a bulk submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkItem {
    pub id: Uuid,
    pub destination: String,
    pub document: Value,
    pub received_at: DateTime<Utc>,
}

/// Per-item result reported by the durable store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ItemOutcome {
    Written,
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ItemOutcome::Written)
    }
}

/// Result of one bulk submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    pub outcomes: Vec<ItemOutcome>,
}

impl BulkResponse {
    /// Every item written
    pub fn all_written(count: usize) -> Self {
        Self {
            outcomes: vec![ItemOutcome::Written; count],
        }
    }

    /// Every item failed with the same reason
    pub fn all_failed(count: usize, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            outcomes: (0..count)
                .map(|_| ItemOutcome::Failed {
                    reason: reason.clone(),
                })
                .collect(),
        }
    }

    /// Number of items the store durably wrote
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    /// Number of items acknowledged out of `submitted`.
    ///
    /// Items the store did not report on count as failed.
    pub fn acknowledged(&self, submitted: usize) -> usize {
        self.outcomes
            .iter()
            .take(submitted)
            .filter(|o| o.is_written())
            .count()
    }

    /// First failure reason, if any
    pub fn first_failure(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|o| match o {
            ItemOutcome::Failed { reason } => Some(reason.as_str()),
            ItemOutcome::Written => None,
        })
    }
}

/// What caused a flush
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    Size,
    Interval,
    Forced,
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushTrigger::Size => write!(f, "size"),
            FlushTrigger::Interval => write!(f, "interval"),
            FlushTrigger::Forced => write!(f, "forced"),
        }
    }
}

/// Outcome of a single flush
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub submitted: usize,
    pub acknowledged: usize,
    /// Wall time of the submission; `None` when nothing was submitted
    pub latency: Option<Duration>,
}

impl FlushReport {
    pub fn empty(trigger: FlushTrigger) -> Self {
        Self {
            trigger,
            submitted: 0,
            acknowledged: 0,
            latency: None,
        }
    }

    pub fn dropped(&self) -> usize {
        self.submitted - self.acknowledged
    }

    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }
}

/// Point-in-time snapshot of the buffering layer, exposed to health endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferStats {
    pub buffer_len: usize,
    pub batch_size: usize,
    pub flush_interval_secs: f64,
    pub total_received: u64,
    pub total_flushed: u64,
    pub pending: u64,
    pub rate_per_minute: f64,
    pub avg_flush_latency_ms: f64,
    pub adaptation_count: u64,
    pub last_flush_time: Option<DateTime<Utc>>,
    pub total_dropped: u64,
    pub failed_flushes: u64,
    pub flush_count: u64,
    pub in_flight: usize,
    pub flush_ticks: u64,
    pub tuning_ticks: u64,
}

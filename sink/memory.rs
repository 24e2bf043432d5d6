//! In-process sink for tests and local runs

use crate::error::{BulkError, Result};
use crate::sink::BulkSink;
use crate::types::{BulkItem, BulkResponse, ItemOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a [`MemorySink`] answers submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Write every item
    #[default]
    None,
    /// Report every item as rejected
    RejectAll,
    /// Reject items at odd positions of each batch
    RejectEveryOther,
    /// Fail the whole submission with an error
    Unavailable,
}

/// Sink keeping submitted batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<BulkItem>>>,
    written: Mutex<Vec<BulkItem>>,
    failure: Mutex<FailureMode>,
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink answering every submission with `failure`
    pub fn with_failure(failure: FailureMode) -> Self {
        Self {
            failure: Mutex::new(failure),
            ..Self::default()
        }
    }

    /// Delay every submission by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_failure(&self, failure: FailureMode) {
        *self.failure.lock() = failure;
    }

    /// Every submitted batch, including rejected ones
    pub fn batches(&self) -> Vec<Vec<BulkItem>> {
        self.batches.lock().clone()
    }

    /// Items the sink acknowledged, in write order
    pub fn written(&self) -> Vec<BulkItem> {
        self.written.lock().clone()
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().len()
    }

    /// Number of `bulk_write` calls
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BulkSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.batches.lock().push(items.to_vec());

        let failure = *self.failure.lock();
        let outcomes: Vec<ItemOutcome> = match failure {
            FailureMode::Unavailable => {
                return Err(BulkError::SinkError("memory sink unavailable".to_string()));
            }
            FailureMode::None => BulkResponse::all_written(items.len()).outcomes,
            FailureMode::RejectAll => BulkResponse::all_failed(items.len(), "rejected").outcomes,
            FailureMode::RejectEveryOther => (0..items.len())
                .map(|i| {
                    if i % 2 == 0 {
                        ItemOutcome::Written
                    } else {
                        ItemOutcome::Failed {
                            reason: "rejected".to_string(),
                        }
                    }
                })
                .collect(),
        };

        let mut written = self.written.lock();
        for (item, outcome) in items.iter().zip(&outcomes) {
            if outcome.is_written() {
                written.push(item.clone());
            }
        }

        Ok(BulkResponse { outcomes })
    }
}

use crate::config::BufferConfig;
use crate::error::panic_message;
use crate::ingest::BufferStore;
use crate::sink::BulkSink;
use crate::types::{BulkItem, FlushReport, FlushTrigger};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Drains the buffer and submits batches to the durable store.
///
/// Delivery is at-most-once: items the store does not acknowledge, including
/// whole submissions that error, time out or panic, are dropped and counted,
/// never requeued.
pub struct FlushExecutor {
    store: Arc<BufferStore>,
    sink: Arc<dyn BulkSink>,
    /// Serializes submissions; separate from the buffer guard
    gate: Mutex<()>,
    destination: String,
    timestamp_field: String,
    timeout: Duration,
}

impl FlushExecutor {
    pub fn new(store: Arc<BufferStore>, sink: Arc<dyn BulkSink>, config: &BufferConfig) -> Self {
        Self {
            store,
            sink,
            gate: Mutex::new(()),
            destination: config.destination.clone(),
            timestamp_field: config.timestamp_field.clone(),
            timeout: config.flush_timeout(),
        }
    }

    /// Flush if `trigger` is due.
    ///
    /// Size and forced flushes wait for an in-flight submission to finish, so
    /// when they return every record buffered before the call has been
    /// submitted. Interval flushes skip the tick instead of queueing.
    ///
    /// The flush runs in its own task: dropping the returned future does not
    /// abandon a detached batch, which is still submitted and settled.
    pub async fn flush(self: &Arc<Self>, trigger: FlushTrigger) -> FlushReport {
        let executor = self.clone();
        match tokio::spawn(async move { executor.run(trigger).await }).await {
            Ok(report) => report,
            Err(e) => {
                error!("Flush task ({} trigger) did not complete: {}", trigger, e);
                FlushReport::empty(trigger)
            }
        }
    }

    async fn run(&self, trigger: FlushTrigger) -> FlushReport {
        let _gate = match trigger {
            FlushTrigger::Interval => match self.gate.try_lock() {
                Ok(gate) => gate,
                Err(_) => {
                    debug!("Flush already in progress, skipping interval flush");
                    return FlushReport::empty(trigger);
                }
            },
            FlushTrigger::Size | FlushTrigger::Forced => self.gate.lock().await,
        };

        let Some(records) = self.store.detach(trigger) else {
            return FlushReport::empty(trigger);
        };

        let submitted = records.len();
        let items: Vec<BulkItem> = records
            .into_iter()
            .map(|record| record.into_bulk_item(&self.destination, &self.timestamp_field))
            .collect();

        let started = Instant::now();
        let acknowledged = self.submit(&items).await;
        let latency = started.elapsed();

        self.store.complete(submitted, acknowledged, latency);

        debug!(
            "Flushed {} records ({} trigger): {} acknowledged in {:?}",
            submitted, trigger, acknowledged, latency
        );

        FlushReport {
            trigger,
            submitted,
            acknowledged,
            latency: Some(latency),
        }
    }

    /// Submit with a timeout; returns the number of acknowledged items
    async fn submit(&self, items: &[BulkItem]) -> usize {
        let call = tokio::time::timeout(self.timeout, self.sink.bulk_write(items));

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(Ok(response))) => {
                let acknowledged = response.acknowledged(items.len());
                if acknowledged < items.len() {
                    warn!(
                        "Bulk submission to {} partially failed: dropping {} of {} records (first error: {})",
                        self.sink.name(),
                        items.len() - acknowledged,
                        items.len(),
                        response.first_failure().unwrap_or("missing item status")
                    );
                }
                acknowledged
            }
            Ok(Ok(Err(e))) => {
                warn!(
                    "Bulk submission to {} failed: dropping {} records: {}",
                    self.sink.name(),
                    items.len(),
                    e
                );
                0
            }
            Ok(Err(_)) => {
                warn!(
                    "Bulk submission to {} timed out after {:?}: dropping {} records",
                    self.sink.name(),
                    self.timeout,
                    items.len()
                );
                0
            }
            Err(panic) => {
                error!(
                    "Bulk submission to {} panicked: dropping {} records: {}",
                    self.sink.name(),
                    items.len(),
                    panic_message(panic.as_ref())
                );
                0
            }
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}

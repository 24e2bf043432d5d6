use crate::adaptive::{AdaptiveController, TuningScheduler};
use crate::config::BulkConfig;
use crate::error::{BulkError, Result};
use crate::ingest::{BufferStore, FlushExecutor, FlushScheduler};
use crate::sink::{self, BulkSink};
use crate::types::{BufferStats, Document, FlushReport, FlushTrigger, Record};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Adaptive bulk buffer in front of a durable store.
///
/// Constructed once and shared by reference (usually behind an `Arc`).
/// [`BufferManager::start`] spawns the interval-flush and tuning tasks;
/// [`BufferManager::shutdown`] stops them and drains the buffer.
pub struct BufferManager {
    config: BulkConfig,
    store: Arc<BufferStore>,
    executor: Arc<FlushExecutor>,
    controller: AdaptiveController,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl BufferManager {
    /// Create a manager writing to `sink`
    pub fn new(config: BulkConfig, sink: Arc<dyn BulkSink>) -> Result<Self> {
        config.validate()?;

        let controller = AdaptiveController::new(&config.buffer, &config.adaptive);
        let store = Arc::new(BufferStore::new(
            &config.buffer,
            AdaptiveController::initial_state(&config.buffer),
        ));
        let executor = Arc::new(FlushExecutor::new(store.clone(), sink, &config.buffer));

        info!(
            "Initialized BufferManager (sink: {}, batch_size: {}, flush_interval: {}ms)",
            executor.sink_name(),
            config.buffer.initial_batch_size,
            config.buffer.initial_flush_interval_ms
        );

        Ok(Self {
            config,
            store,
            executor,
            controller,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Connect the sink named in `config.sink` and create a manager for it
    pub async fn connect(config: BulkConfig) -> Result<Self> {
        config.validate()?;
        let sink = sink::connect(&config.sink).await?;
        Self::new(config, sink)
    }

    /// Spawn the periodic flush and tuning tasks on the current runtime.
    ///
    /// Calling it again, or after shutdown, does nothing.
    pub fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            self.started.store(false, Ordering::SeqCst);
            BulkError::Internal(format!("start requires a tokio runtime: {}", e))
        })?;

        let flush = FlushScheduler::new(
            self.executor.clone(),
            self.store.clone(),
            self.config.buffer.flush_check_interval(),
        );
        let tuning = TuningScheduler::new(
            self.store.clone(),
            self.controller.clone(),
            self.config.adaptive.tick_interval(),
        );

        let mut tasks = self.tasks.lock();
        tasks.push(runtime.spawn(flush.start(self.shutdown.clone())));
        tasks.push(runtime.spawn(tuning.start(self.shutdown.clone())));

        info!("BufferManager started");
        Ok(())
    }

    /// Buffer one document.
    ///
    /// When the buffer reaches the current batch size the caller performs the
    /// flush before this returns. Submission failures are counted, not returned.
    pub async fn add(&self, document: Document) {
        self.add_record(Record::new(document)).await;
    }

    /// Buffer a pre-stamped record
    pub async fn add_record(&self, record: Record) {
        let full = self.store.push(record);

        if self.closed.load(Ordering::SeqCst) {
            debug!("Record added after shutdown, flushing immediately");
            self.executor.flush(FlushTrigger::Forced).await;
        } else if full {
            self.executor.flush(FlushTrigger::Size).await;
        }
    }

    /// Flush everything buffered so far and wait for the submission
    pub async fn force_flush(&self) -> FlushReport {
        self.executor.flush(FlushTrigger::Forced).await
    }

    /// Point-in-time snapshot
    pub fn stats(&self) -> BufferStats {
        self.store.stats()
    }

    /// Stop the periodic tasks, drain the buffer and return the final stats
    pub async fn shutdown(&self) -> BufferStats {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Shutting down BufferManager");
        }
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Periodic task ended abnormally: {}", e);
            }
        }

        let report = self.force_flush().await;
        let stats = self.stats();

        info!(
            "BufferManager stopped: drained {} records ({} acknowledged), received {}, flushed {}, dropped {}",
            report.submitted,
            report.acknowledged,
            stats.total_received,
            stats.total_flushed,
            stats.total_dropped
        );

        stats
    }

    /// Get configuration
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Name of the durable store
    pub fn sink_name(&self) -> &str {
        self.executor.sink_name()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

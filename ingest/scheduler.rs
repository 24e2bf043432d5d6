use crate::error::panic_message;
use crate::ingest::{BufferStore, FlushExecutor};
use crate::types::{FlushReport, FlushTrigger};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic interval-flush trigger
pub struct FlushScheduler {
    executor: Arc<FlushExecutor>,
    store: Arc<BufferStore>,
    tick: Duration,
}

impl FlushScheduler {
    /// Create a new flush scheduler
    pub fn new(executor: Arc<FlushExecutor>, store: Arc<BufferStore>, tick: Duration) -> Self {
        Self {
            executor,
            store,
            tick,
        }
    }

    /// Start the scheduler (runs in background until `shutdown` is cancelled)
    pub async fn start(self, shutdown: CancellationToken) {
        info!("Starting flush scheduler (tick: {:?})", self.tick);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(panic) = AssertUnwindSafe(self.run_once()).catch_unwind().await {
                error!("Flush tick panicked: {}", panic_message(panic.as_ref()));
            }
        }

        info!("Flush scheduler stopped");
    }

    /// Flush once if the flush interval elapsed (for testing or manual execution)
    pub async fn run_once(&self) -> FlushReport {
        self.store.record_flush_tick();
        self.executor.flush(FlushTrigger::Interval).await
    }
}

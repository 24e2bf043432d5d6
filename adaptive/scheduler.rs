use crate::adaptive::{AdaptiveController, Adjustment};
use crate::error::panic_message;
use crate::ingest::BufferStore;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodic task running the adaptive controller
pub struct TuningScheduler {
    store: Arc<BufferStore>,
    controller: AdaptiveController,
    tick: Duration,
}

impl TuningScheduler {
    /// Create a new tuning scheduler
    pub fn new(store: Arc<BufferStore>, controller: AdaptiveController, tick: Duration) -> Self {
        Self {
            store,
            controller,
            tick,
        }
    }

    /// Run until `shutdown` is cancelled; a tick in progress always completes
    pub async fn start(self, shutdown: CancellationToken) {
        info!("Starting tuning scheduler (tick: {:?})", self.tick);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let tick = AssertUnwindSafe(async { self.run_once() }).catch_unwind();
            if let Err(panic) = tick.await {
                error!("Tuning tick panicked: {}", panic_message(panic.as_ref()));
            }
        }

        info!("Tuning scheduler stopped");
    }

    /// Run a single controller tick (for testing or manual execution)
    pub fn run_once(&self) -> Adjustment {
        self.store.record_tuning_tick();

        let inputs = self.store.tuning_inputs();
        let adjustment =
            self.controller
                .adjust(&inputs.control, inputs.rate_per_minute, inputs.avg_latency);
        self.store.set_control(adjustment.next);

        if adjustment.significant {
            info!(
                "Adapted buffering: batch_size {} -> {}, flush_interval {:.2}s -> {:.2}s (rate {:.1}/min, avg latency {:?}{})",
                adjustment.previous.batch_size(),
                adjustment.next.batch_size(),
                adjustment.previous.flush_interval_secs(),
                adjustment.next.flush_interval_secs(),
                adjustment.rate_per_minute,
                adjustment.avg_latency,
                if adjustment.target.backpressure { ", back-pressure" } else { "" }
            );
        } else {
            debug!(
                "Tuning tick: batch_size {}, flush_interval {:.2}s (rate {:.1}/min)",
                adjustment.next.batch_size(),
                adjustment.next.flush_interval_secs(),
                adjustment.rate_per_minute
            );
        }

        adjustment
    }
}

use crate::adaptive::{ControlState, LatencyTracker, RateEstimator};
use crate::config::BufferConfig;
use crate::types::{BufferStats, FlushTrigger, Record};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Pending records plus the counters and control parameters they are judged against.
///
/// A single guard covers everything; it is only ever held for in-memory work.
pub struct BufferStore {
    state: Mutex<BufferState>,
    flush_ticks: AtomicU64,
    tuning_ticks: AtomicU64,
}

struct BufferState {
    records: Vec<Record>,
    total_received: u64,
    total_flushed: u64,
    total_dropped: u64,
    failed_flushes: u64,
    flush_count: u64,
    in_flight: usize,
    last_flush: Instant,
    last_flush_time: Option<DateTime<Utc>>,
    control: ControlState,
    rate: RateEstimator,
    latency: LatencyTracker,
}

impl BufferState {
    fn is_due(&self, trigger: FlushTrigger, now: Instant) -> bool {
        if self.records.is_empty() {
            return false;
        }

        match trigger {
            FlushTrigger::Size => self.records.len() >= self.control.batch_size(),
            FlushTrigger::Interval => {
                now.saturating_duration_since(self.last_flush) >= self.control.flush_interval()
            }
            FlushTrigger::Forced => true,
        }
    }
}

/// Inputs of one controller tick
#[derive(Debug, Clone, Copy)]
pub struct TuningInputs {
    pub rate_per_minute: f64,
    pub avg_latency: Duration,
    pub control: ControlState,
}

impl BufferStore {
    /// Create an empty buffer with the given starting control parameters
    pub fn new(config: &BufferConfig, control: ControlState) -> Self {
        Self {
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(config.initial_batch_size),
                total_received: 0,
                total_flushed: 0,
                total_dropped: 0,
                failed_flushes: 0,
                flush_count: 0,
                in_flight: 0,
                last_flush: Instant::now(),
                last_flush_time: None,
                control,
                rate: RateEstimator::new(config.rate_window_capacity),
                latency: LatencyTracker::new(
                    config.latency_window_capacity,
                    config.default_latency(),
                ),
            }),
            flush_ticks: AtomicU64::new(0),
            tuning_ticks: AtomicU64::new(0),
        }
    }

    /// Append a record and sample its arrival.
    ///
    /// Returns true when the buffer reached the current batch size.
    pub fn push(&self, record: Record) -> bool {
        let mut state = self.state.lock();

        state.records.push(record);
        state.total_received += 1;
        state.rate.sample();

        state.records.len() >= state.control.batch_size()
    }

    /// Swap out the pending records if `trigger` is due.
    ///
    /// Detached records count as in flight until [`BufferStore::complete`].
    pub fn detach(&self, trigger: FlushTrigger) -> Option<Vec<Record>> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if !state.is_due(trigger, now) {
            return None;
        }

        let batch = std::mem::take(&mut state.records);
        state.in_flight += batch.len();
        state.last_flush = now;
        state.last_flush_time = Some(Utc::now());

        Some(batch)
    }

    /// Settle a detached batch after its submission returned
    pub fn complete(&self, submitted: usize, acknowledged: usize, latency: Duration) {
        let acknowledged = acknowledged.min(submitted);
        let mut state = self.state.lock();

        state.in_flight = state.in_flight.saturating_sub(submitted);
        state.total_flushed += acknowledged as u64;
        state.total_dropped += (submitted - acknowledged) as u64;
        state.flush_count += 1;
        if acknowledged < submitted {
            state.failed_flushes += 1;
        }
        state.latency.record(latency);
    }

    /// Current control parameters
    pub fn control(&self) -> ControlState {
        self.state.lock().control
    }

    /// Replace the control parameters
    pub fn set_control(&self, control: ControlState) {
        self.state.lock().control = control;
    }

    /// Rate, latency and control snapshot for the controller
    pub fn tuning_inputs(&self) -> TuningInputs {
        let state = self.state.lock();
        TuningInputs {
            rate_per_minute: state.rate.rate(),
            avg_latency: state.latency.average(),
            control: state.control,
        }
    }

    pub fn record_flush_tick(&self) {
        self.flush_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tuning_tick(&self) {
        self.tuning_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of buffer, counters and estimators
    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();

        BufferStats {
            buffer_len: state.records.len(),
            batch_size: state.control.batch_size(),
            flush_interval_secs: state.control.flush_interval_secs(),
            total_received: state.total_received,
            total_flushed: state.total_flushed,
            pending: state.total_received - state.total_flushed,
            rate_per_minute: state.rate.rate(),
            avg_flush_latency_ms: state.latency.average().as_secs_f64() * 1000.0,
            adaptation_count: state.control.adaptation_count(),
            last_flush_time: state.last_flush_time,
            total_dropped: state.total_dropped,
            failed_flushes: state.failed_flushes,
            flush_count: state.flush_count,
            in_flight: state.in_flight,
            flush_ticks: self.flush_ticks.load(Ordering::Relaxed),
            tuning_ticks: self.tuning_ticks.load(Ordering::Relaxed),
        }
    }

    /// Get current buffer size
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }
}

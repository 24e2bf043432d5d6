//! Adaptive tuning of batch size and flush interval
//!
//! The controller maps the observed traffic rate onto a four-tier target
//! (minimum, min→mid ramp, mid→high ramp, maximum), inflates the batch target
//! when flushes are slow, and moves the live parameters toward the target by
//! exponential smoothing.

use crate::config::{AdaptiveConfig, BufferConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Live control parameters read by the flush paths
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    batch_size: f64,
    flush_interval_secs: f64,
    adaptation_count: u64,
}

impl ControlState {
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size: batch_size as f64,
            flush_interval_secs: flush_interval.as_secs_f64(),
            adaptation_count: 0,
        }
    }

    /// Buffer length that triggers a size-based flush
    pub fn batch_size(&self) -> usize {
        (self.batch_size.round() as usize).max(1)
    }

    /// Minimum time between interval-based flushes
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.flush_interval_secs)
    }

    pub fn flush_interval_secs(&self) -> f64 {
        self.flush_interval_secs
    }

    /// Unrounded batch size as tracked by the smoother
    pub fn raw_batch_size(&self) -> f64 {
        self.batch_size
    }

    pub fn adaptation_count(&self) -> u64 {
        self.adaptation_count
    }
}

/// Parameters the controller steers toward on one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub batch_size: f64,
    pub flush_interval_secs: f64,
    /// Batch target was inflated because flushes exceeded the latency ceiling
    pub backpressure: bool,
}

/// Result of one controller tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub previous: ControlState,
    pub next: ControlState,
    pub target: Target,
    pub rate_per_minute: f64,
    pub avg_latency: Duration,
    /// Change exceeded the significance thresholds and was counted
    pub significant: bool,
}

/// Traffic-tier controller
#[derive(Debug, Clone)]
pub struct AdaptiveController {
    min_batch: f64,
    max_batch: f64,
    min_interval: f64,
    max_interval: f64,
    low_rate: f64,
    mid_rate: f64,
    high_rate: f64,
    mid_batch: f64,
    high_batch: f64,
    mid_interval: f64,
    high_interval: f64,
    latency_ceiling: Duration,
    backpressure_factor: f64,
    smoothing_weight: f64,
    batch_significance: f64,
    interval_significance: f64,
}

impl AdaptiveController {
    pub fn new(buffer: &BufferConfig, adaptive: &AdaptiveConfig) -> Self {
        Self {
            min_batch: buffer.min_batch_size as f64,
            max_batch: buffer.max_batch_size as f64,
            min_interval: buffer.min_flush_interval().as_secs_f64(),
            max_interval: buffer.max_flush_interval().as_secs_f64(),
            low_rate: adaptive.low_rate_per_min,
            mid_rate: adaptive.mid_rate_per_min,
            high_rate: adaptive.high_rate_per_min,
            mid_batch: adaptive.mid_batch_size as f64,
            high_batch: adaptive.high_batch_size as f64,
            mid_interval: Duration::from_millis(adaptive.mid_flush_interval_ms).as_secs_f64(),
            high_interval: Duration::from_millis(adaptive.high_flush_interval_ms).as_secs_f64(),
            latency_ceiling: adaptive.latency_ceiling(),
            backpressure_factor: adaptive.backpressure_factor,
            smoothing_weight: adaptive.smoothing_weight,
            batch_significance: adaptive.batch_significance,
            interval_significance: Duration::from_millis(adaptive.interval_significance_ms)
                .as_secs_f64(),
        }
    }

    /// Control state at startup
    pub fn initial_state(buffer: &BufferConfig) -> ControlState {
        ControlState::new(buffer.initial_batch_size, buffer.initial_flush_interval())
    }

    /// Tiered target for the given rate and average flush latency
    pub fn target(&self, rate_per_minute: f64, avg_latency: Duration) -> Target {
        let (mut batch_size, flush_interval_secs) = if rate_per_minute < self.low_rate {
            (self.min_batch, self.min_interval)
        } else if rate_per_minute < self.mid_rate {
            let t = (rate_per_minute - self.low_rate) / (self.mid_rate - self.low_rate);
            (
                lerp(self.min_batch, self.mid_batch, t),
                lerp(self.min_interval, self.mid_interval, t),
            )
        } else if rate_per_minute < self.high_rate {
            let t = (rate_per_minute - self.mid_rate) / (self.high_rate - self.mid_rate);
            (
                lerp(self.mid_batch, self.high_batch, t),
                lerp(self.mid_interval, self.high_interval, t),
            )
        } else {
            (self.max_batch, self.max_interval)
        };

        let backpressure = avg_latency > self.latency_ceiling;
        if backpressure {
            batch_size = (batch_size * self.backpressure_factor).min(self.max_batch);
        }

        Target {
            batch_size,
            flush_interval_secs,
            backpressure,
        }
    }

    /// One smoothing step from `current` toward the target for the observed traffic
    pub fn adjust(
        &self,
        current: &ControlState,
        rate_per_minute: f64,
        avg_latency: Duration,
    ) -> Adjustment {
        let target = self.target(rate_per_minute, avg_latency);
        let keep = 1.0 - self.smoothing_weight;

        let batch_size = (keep * current.batch_size + self.smoothing_weight * target.batch_size)
            .clamp(self.min_batch, self.max_batch);
        let flush_interval_secs = (keep * current.flush_interval_secs
            + self.smoothing_weight * target.flush_interval_secs)
            .clamp(self.min_interval, self.max_interval);

        let significant = (batch_size - current.batch_size).abs() > self.batch_significance
            || (flush_interval_secs - current.flush_interval_secs).abs()
                > self.interval_significance;

        let next = ControlState {
            batch_size,
            flush_interval_secs,
            adaptation_count: current.adaptation_count + u64::from(significant),
        };

        Adjustment {
            previous: *current,
            next,
            target,
            rate_per_minute,
            avg_latency,
            significant,
        }
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn controller() -> (AdaptiveController, ControlState) {
        let buffer = BufferConfig::default();
        let adaptive = AdaptiveConfig::default();
        (
            AdaptiveController::new(&buffer, &adaptive),
            AdaptiveController::initial_state(&buffer),
        )
    }

    const FAST: Duration = Duration::from_millis(20);

    #[test]
    fn test_initial_state_within_bounds() {
        let (_, state) = controller();
        assert_eq!(state.batch_size(), 50);
        assert_eq!(state.flush_interval(), Duration::from_secs(3));
        assert_eq!(state.adaptation_count(), 0);
    }

    #[test]
    fn test_tier_targets() {
        let (controller, _) = controller();

        let low = controller.target(5.0, FAST);
        assert_relative_eq!(low.batch_size, 10.0);
        assert_relative_eq!(low.flush_interval_secs, 1.0);

        // halfway between low (10) and mid (60)
        let ramp = controller.target(35.0, FAST);
        assert_relative_eq!(ramp.batch_size, 30.0);
        assert_relative_eq!(ramp.flush_interval_secs, 2.0);

        // halfway between mid (60) and high (120)
        let busy = controller.target(90.0, FAST);
        assert_relative_eq!(busy.batch_size, 85.0);
        assert_relative_eq!(busy.flush_interval_secs, 4.5);

        let burst = controller.target(150.0, FAST);
        assert_relative_eq!(burst.batch_size, 200.0);
        assert_relative_eq!(burst.flush_interval_secs, 10.0);
        assert!(!burst.backpressure);
    }

    #[test]
    fn test_backpressure_inflates_batch() {
        let (controller, _) = controller();

        let slow = controller.target(35.0, Duration::from_secs(2));
        assert!(slow.backpressure);
        assert_relative_eq!(slow.batch_size, 45.0);
        assert_relative_eq!(slow.flush_interval_secs, 2.0);

        // capped at the maximum
        let capped = controller.target(150.0, Duration::from_secs(2));
        assert_relative_eq!(capped.batch_size, 200.0);
    }

    #[test]
    fn test_smoothing_step() {
        let (controller, state) = controller();
        let adjustment = controller.adjust(&state, 150.0, FAST);

        // 0.7 * 50 + 0.3 * 200
        assert_relative_eq!(adjustment.next.raw_batch_size(), 95.0);
        // 0.7 * 3 + 0.3 * 10
        assert_relative_eq!(adjustment.next.flush_interval_secs(), 5.1);
        assert!(adjustment.significant);
        assert_eq!(adjustment.next.adaptation_count(), 1);
    }

    #[test]
    fn test_sub_threshold_drift_not_counted() {
        let buffer = BufferConfig::default();
        let adaptive = AdaptiveConfig::default();
        let controller = AdaptiveController::new(&buffer, &adaptive);

        // already sitting next to the low-tier target
        let state = ControlState::new(11, Duration::from_millis(1100));
        let adjustment = controller.adjust(&state, 0.0, FAST);

        assert!(!adjustment.significant);
        assert_eq!(adjustment.next.adaptation_count(), 0);
        assert!(adjustment.next.raw_batch_size() < 11.0);
    }

    #[test]
    fn test_converges_to_minimum_at_low_rate() {
        let (controller, mut state) = controller();
        for _ in 0..20 {
            state = controller.adjust(&state, 6.0, FAST).next;
        }
        assert_eq!(state.batch_size(), 10);
        assert!(state.flush_interval() < Duration::from_millis(1050));
    }

    #[test]
    fn test_converges_to_maximum_at_burst_rate() {
        let (controller, mut state) = controller();
        for _ in 0..20 {
            state = controller.adjust(&state, 150.0, FAST).next;
        }
        assert!(state.batch_size() >= 199);
        assert!(state.flush_interval() > Duration::from_millis(9950));
    }

    proptest! {
        #[test]
        fn prop_ticks_stay_within_bounds(
            ticks in prop::collection::vec((0.0f64..1000.0, 0u64..5000), 1..60)
        ) {
            let (controller, mut state) = controller();
            for (rate, latency_ms) in ticks {
                state = controller.adjust(&state, rate, Duration::from_millis(latency_ms)).next;
                prop_assert!((10..=200).contains(&state.batch_size()));
                prop_assert!(state.flush_interval() >= Duration::from_secs(1));
                prop_assert!(state.flush_interval() <= Duration::from_secs(10));
            }
        }
    }
}

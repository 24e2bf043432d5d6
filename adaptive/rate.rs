//! Traffic rate estimation from a bounded window of arrival instants

use std::collections::VecDeque;
use tokio::time::Instant;

/// Bounded FIFO of arrival instants, oldest evicted first
#[derive(Debug, Clone)]
pub struct RateEstimator {
    samples: VecDeque<Instant>,
    capacity: usize,
}

impl RateEstimator {
    /// Create an estimator keeping at most `capacity` arrivals
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an arrival now
    pub fn sample(&mut self) {
        self.sample_at(Instant::now());
    }

    /// Record an arrival at `at`
    pub fn sample_at(&mut self, at: Instant) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(at);
    }

    /// Arrivals per minute over the retained window.
    ///
    /// Zero with fewer than two samples, or when all samples share one instant.
    pub fn rate(&self) -> f64 {
        let (Some(oldest), Some(newest)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let span = newest.saturating_duration_since(*oldest).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }

        (self.samples.len() - 1) as f64 / span * 60.0
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

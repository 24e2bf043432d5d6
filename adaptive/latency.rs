use std::collections::VecDeque;
use std::time::Duration;

/// Bounded window of recent flush durations
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    samples: VecDeque<Duration>,
    capacity: usize,
    default_latency: Duration,
}

impl LatencyTracker {
    pub fn new(capacity: usize, default_latency: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            default_latency,
        }
    }

    /// Record one flush duration, evicting the oldest beyond capacity
    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Mean of the retained durations, or the configured default when empty
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return self.default_latency;
        }

        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_when_empty() {
        let tracker = LatencyTracker::new(20, Duration::from_millis(100));
        assert_eq!(tracker.average(), Duration::from_millis(100));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_average() {
        let mut tracker = LatencyTracker::new(20, Duration::from_millis(100));
        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(30));
        assert_eq!(tracker.average(), Duration::from_millis(20));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut tracker = LatencyTracker::new(2, Duration::ZERO);
        tracker.record(Duration::from_secs(10));
        tracker.record(Duration::from_millis(100));
        tracker.record(Duration::from_millis(300));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.average(), Duration::from_millis(200));
    }
}

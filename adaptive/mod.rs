//! Traffic estimation and adaptive tuning
//!
//! Rate and latency windows feed a periodic controller that retunes the
//! batch size and flush interval used by the ingest paths.

pub mod controller;
pub mod latency;
pub mod rate;
pub mod scheduler;

pub use controller::{AdaptiveController, Adjustment, ControlState, Target};
pub use latency::LatencyTracker;
pub use rate::RateEstimator;
pub use scheduler::TuningScheduler;

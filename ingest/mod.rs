//! Buffered ingestion and flushing

pub mod buffer;
pub mod flush;
pub mod scheduler;

pub use buffer::{BufferStore, TuningInputs};
pub use flush::FlushExecutor;
pub use scheduler::FlushScheduler;

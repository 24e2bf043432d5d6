//! Adaptive bulk buffering layer for ag-botkit telemetry
//!
//! Sits between a high-frequency ingestion front end and a bulk-write
//! durable store. Records are buffered in memory and flushed in batches
//! whose size and timing adapt to the observed arrival rate and flush latency.
//!
//! # Features
//!
//! - Size-triggered, interval-triggered and forced flushes
//! - Flush I/O performed outside the buffer lock
//! - Rate and latency estimation over bounded sliding windows
//! - Smoothed, bounded tuning of batch size and flush interval
//! - Elasticsearch bulk API and TimescaleDB sinks
//! - At-most-once delivery: unacknowledged records are counted and dropped
//!
//! # Example
//!
//! ```no_run
//! use ag_bulk::{BufferManager, BulkConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BulkConfig::from_env()?;
//!     let manager = BufferManager::connect(config).await?;
//!     manager.start()?;
//!
//!     let mut document = ag_bulk::Document::new();
//!     document.insert("device_id".to_string(), json!("depot-7"));
//!     document.insert("pm25".to_string(), json!(12.4));
//!     manager.add(document).await;
//!
//!     let stats = manager.shutdown().await;
//!     println!("flushed {} of {}", stats.total_flushed, stats.total_received);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod types;

#[path = "../ingest/mod.rs"]
pub mod ingest;

#[path = "../adaptive/mod.rs"]
pub mod adaptive;

#[path = "../sink/mod.rs"]
pub mod sink;

// Re-export main types
pub use adaptive::{AdaptiveController, Adjustment, ControlState};
pub use config::{
    AdaptiveConfig, BufferConfig, BulkConfig, DatabaseConfig, ElasticsearchConfig, SinkConfig,
};
pub use error::{BulkError, Result};
pub use manager::BufferManager;
pub use sink::{BulkSink, ElasticsearchSink, FailureMode, MemorySink, TimescaleSink};
pub use types::{
    BufferStats, BulkItem, BulkResponse, Document, FlushReport, FlushTrigger, ItemOutcome, Record,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing subscriber (for demos and tests)
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ag_bulk=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

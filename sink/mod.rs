//! Durable-store bulk boundary
//!
//! A [`BulkSink`] accepts one batch of (destination, document) items and
//! reports per item whether the store durably wrote it. The buffering layer
//! treats one call as one flush submission and measures its latency.

pub mod elastic;
pub mod memory;
pub mod timescale;

pub use elastic::ElasticsearchSink;
pub use memory::{FailureMode, MemorySink};
pub use timescale::{PoolStatus, TimescaleSink};

use crate::config::SinkConfig;
use crate::error::Result;
use crate::types::{BulkItem, BulkResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Bulk-write API of a durable store
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Submit a batch.
    ///
    /// # Returns
    /// * `Ok(BulkResponse)` - One outcome per item, in submission order
    /// * `Err(BulkError)` - The whole submission failed
    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse>;
}

/// Connect the sink selected by `config`
pub async fn connect(config: &SinkConfig) -> Result<Arc<dyn BulkSink>> {
    match config {
        SinkConfig::Elasticsearch(es) => {
            let sink = ElasticsearchSink::new(es.clone())?;
            sink.ping().await?;
            info!("Connected to Elasticsearch at {}", es.hosts.join(","));
            Ok(Arc::new(sink))
        }
        SinkConfig::Timescale(db) => {
            let sink = TimescaleSink::new(db).await?;
            Ok(Arc::new(sink))
        }
    }
}

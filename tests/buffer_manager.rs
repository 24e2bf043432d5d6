// Integration tests for ag-bulk buffering and flushing
// Run against the in-memory sink; no external services required

use ag_bulk::{
    BufferManager, BulkConfig, BulkItem, BulkResponse, BulkSink, Document, FailureMode,
    MemorySink, Result,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn doc(seq: u64) -> Document {
    let mut document = Document::new();
    document.insert("seq".to_string(), json!(seq));
    document.insert("sensor".to_string(), json!("pm25"));
    document
}

/// Sink whose bulk call panics
struct PanickingSink;

#[async_trait]
impl BulkSink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn bulk_write(&self, _items: &[BulkItem]) -> Result<BulkResponse> {
        panic!("bulk endpoint exploded");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_lose_no_updates() {
    let sink = Arc::new(MemorySink::new());
    let manager = Arc::new(BufferManager::new(BulkConfig::default(), sink.clone()).unwrap());
    manager.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let checker = {
        let manager = manager.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut checks = 0u64;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let s = manager.stats();
                assert_eq!(
                    s.total_received - s.total_flushed - s.total_dropped,
                    s.buffer_len as u64 + s.in_flight as u64,
                    "accounting invariant violated: {:?}",
                    s
                );
                assert_eq!(s.pending, s.total_received - s.total_flushed);
                checks += 1;
                if finished {
                    break checks;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut callers = Vec::new();
    for caller in 0..50u64 {
        let manager = manager.clone();
        callers.push(tokio::spawn(async move {
            for i in 0..10u64 {
                manager.add(doc(caller * 10 + i)).await;
            }
        }));
    }
    for caller in callers {
        caller.await.unwrap();
    }

    assert_eq!(manager.stats().total_received, 500);

    done.store(true, Ordering::SeqCst);
    assert!(checker.await.unwrap() > 0);

    let stats = manager.shutdown().await;
    assert_eq!(stats.total_received, 500);
    assert_eq!(stats.total_flushed, 500);
    assert_eq!(stats.buffer_len, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(sink.written_count(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_record_in_two_batches() {
    let sink = Arc::new(MemorySink::new());
    let mut config = BulkConfig::default();
    config.buffer.initial_batch_size = 10;
    let manager = Arc::new(BufferManager::new(config, sink.clone()).unwrap());

    let mut callers = Vec::new();
    for caller in 0..20u64 {
        let manager = manager.clone();
        callers.push(tokio::spawn(async move {
            for i in 0..25u64 {
                manager.add(doc(caller * 25 + i)).await;
                if i % 7 == 0 {
                    manager.force_flush().await;
                }
            }
        }));
    }
    for caller in callers {
        caller.await.unwrap();
    }
    manager.shutdown().await;

    let mut ids = HashSet::new();
    let mut seqs = HashSet::new();
    for batch in sink.batches() {
        for item in batch {
            assert!(ids.insert(item.id), "record {} submitted twice", item.id);
            seqs.insert(item.document["seq"].as_u64().unwrap());
        }
    }
    assert_eq!(ids.len(), 500);
    assert_eq!(seqs.len(), 500);
}

#[tokio::test]
async fn test_batches_preserve_arrival_order() {
    let sink = Arc::new(MemorySink::new());
    let mut config = BulkConfig::default();
    config.buffer.initial_batch_size = 10;
    let manager = BufferManager::new(config, sink.clone()).unwrap();

    for seq in 0..25 {
        manager.add(doc(seq)).await;
    }
    manager.force_flush().await;

    let seqs: Vec<u64> = sink
        .written()
        .iter()
        .map(|item| item.document["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, (0..25).collect::<Vec<u64>>());
    let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_interval_flush_after_start() {
    let sink = Arc::new(MemorySink::new());
    let manager = BufferManager::new(BulkConfig::default(), sink.clone()).unwrap();
    manager.start().unwrap();

    for seq in 0..3 {
        manager.add(doc(seq)).await;
    }
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(sink.written_count(), 0);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(sink.written_count(), 3);
    assert!(manager.stats().last_flush_time.is_some());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_store_keeps_tasks_alive() {
    let sink = Arc::new(MemorySink::with_failure(FailureMode::Unavailable));
    let manager = BufferManager::new(BulkConfig::default(), sink.clone()).unwrap();
    manager.start().unwrap();

    for seq in 0..20 {
        manager.add(doc(seq)).await;
        tokio::time::sleep(Duration::from_millis(700)).await;
    }
    let first = manager.stats();

    for seq in 20..40 {
        manager.add(doc(seq)).await;
        tokio::time::sleep(Duration::from_millis(700)).await;
    }
    let second = manager.stats();

    assert_eq!(second.total_received, 40);
    assert_eq!(second.total_flushed, 0);
    assert!(second.total_dropped > first.total_dropped);
    assert!(second.failed_flushes >= 2);
    assert!(second.flush_ticks > first.flush_ticks);
    assert!(second.tuning_ticks > first.tuning_ticks);
    assert!(sink.calls() >= 2);

    let stats = manager.shutdown().await;
    assert_eq!(stats.total_flushed, 0);
    assert_eq!(stats.total_dropped, 40);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_store_does_not_stop_flushing() {
    let manager = BufferManager::new(BulkConfig::default(), Arc::new(PanickingSink)).unwrap();
    manager.start().unwrap();

    manager.add(doc(1)).await;
    let report = manager.force_flush().await;
    assert_eq!(report.submitted, 1);
    assert_eq!(report.acknowledged, 0);

    let ticks = manager.stats().flush_ticks;
    manager.add(doc(2)).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let stats = manager.stats();
    assert!(stats.flush_ticks > ticks);
    assert_eq!(stats.total_dropped, 2);
    assert_eq!(stats.buffer_len, 0);
    assert_eq!(stats.failed_flushes, 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_buffer() {
    let sink = Arc::new(MemorySink::new().with_latency(Duration::from_millis(20)));
    let manager = BufferManager::new(BulkConfig::default(), sink.clone()).unwrap();
    manager.start().unwrap();

    for seq in 0..7 {
        manager.add(doc(seq)).await;
    }
    let stats = manager.shutdown().await;

    assert_eq!(stats.total_received, 7);
    assert_eq!(stats.total_flushed, 7);
    assert_eq!(stats.buffer_len, 0);
    assert_eq!(sink.written_count(), 7);
    assert!(stats.last_flush_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_forced_flush_reads_after_interval_flush_in_progress() {
    let sink = Arc::new(MemorySink::new().with_latency(Duration::from_millis(800)));
    let manager = BufferManager::new(BulkConfig::default(), sink.clone()).unwrap();
    manager.start().unwrap();

    manager.add(doc(1)).await;
    // an interval flush has detached the record and is still submitting
    tokio::time::sleep(Duration::from_millis(3200)).await;
    assert_eq!(manager.stats().in_flight, 1);

    manager.force_flush().await;
    assert_eq!(sink.written_count(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_aborted_size_flush_caller_leaves_nothing_in_flight() {
    let sink = Arc::new(MemorySink::new().with_latency(Duration::from_secs(2)));
    let mut config = BulkConfig::default();
    config.buffer.initial_batch_size = 10;
    let manager = Arc::new(BufferManager::new(config, sink.clone()).unwrap());

    for seq in 0..9 {
        manager.add(doc(seq)).await;
    }
    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.add(doc(9)).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.stats().in_flight, 10);
    caller.abort();
    let _ = caller.await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = manager.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_flushed, 10);
    assert_eq!(stats.pending, 0);

    let stats = manager.shutdown().await;
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_received, 10);
    assert_eq!(sink.written_count(), 10);
}

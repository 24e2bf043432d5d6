use ag_bulk::{BufferManager, BulkConfig, Document, MemorySink};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    ag_bulk::init_tracing();

    println!("=== Adaptive Bulk Buffering Example ===\n");

    // AG_BULK_* variables override the defaults
    let config = BulkConfig::from_env()?;

    // Use a real store when AG_BULK_SINK=connect, otherwise keep everything in memory
    let memory = Arc::new(MemorySink::new());
    let manager = if std::env::var("AG_BULK_SINK").as_deref() == Ok("connect") {
        BufferManager::connect(config).await?
    } else {
        BufferManager::new(config, memory.clone())?
    };
    println!("Sink: {}", manager.sink_name());

    manager.start()?;

    // Phase 1: a quiet sensor
    println!("1. Quiet phase: one reading every 2s...");
    for seq in 0..5 {
        manager.add(reading("depot-7", seq, 11.0 + seq as f64)).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    print_stats(&manager);

    // Phase 2: a burst from many devices
    println!("2. Burst phase: 40 devices, 25 readings each...");
    let manager = Arc::new(manager);
    let mut devices = Vec::new();
    for device in 0..40u64 {
        let manager = manager.clone();
        devices.push(tokio::spawn(async move {
            for seq in 0..25u64 {
                let id = format!("sensor-{:02}", device);
                manager.add(reading(&id, seq, 20.0 + device as f64 * 0.1)).await;
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
        }));
    }
    for device in devices {
        device.await?;
    }
    print_stats(&manager);

    // Phase 3: read-after-write
    println!("3. Forcing a flush before reading back...");
    manager.add(reading("depot-7", 99, 13.7)).await;
    let report = manager.force_flush().await;
    println!(
        "   ✓ Flushed {} records ({} acknowledged)\n",
        report.submitted, report.acknowledged
    );

    let stats = manager.shutdown().await;
    println!("=== Shutdown complete ===");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if manager.sink_name() == "memory" {
        println!("\nIn-memory sink holds {} documents", memory.written_count());
    }

    Ok(())
}

fn reading(device_id: &str, seq: u64, pm25: f64) -> Document {
    let mut document = Document::new();
    document.insert("device_id".to_string(), json!(device_id));
    document.insert("seq".to_string(), json!(seq));
    document.insert("pm25".to_string(), json!(pm25));
    document
}

fn print_stats(manager: &BufferManager) {
    let stats = manager.stats();
    println!(
        "   buffer={} batch_size={} interval={:.2}s rate={:.1}/min received={} flushed={} adaptations={}\n",
        stats.buffer_len,
        stats.batch_size,
        stats.flush_interval_secs,
        stats.rate_per_minute,
        stats.total_received,
        stats.total_flushed,
        stats.adaptation_count
    );
}

//! TimescaleDB sink: one JSONB table per destination

use crate::config::DatabaseConfig;
use crate::error::{BulkError, Result};
use crate::sink::BulkSink;
use crate::types::{BulkItem, BulkResponse, ItemOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rows per INSERT statement; three parameters each, below the 65535 limit
const MAX_ROWS_PER_STATEMENT: usize = 10_000;

/// Bulk sink writing documents into TimescaleDB hypertables
pub struct TimescaleSink {
    pool: Pool,
    has_timescale: bool,
    /// Destinations whose table was created or verified
    ready: Mutex<HashSet<String>>,
}

impl TimescaleSink {
    /// Create a connection pool and verify the server
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            "Creating connection pool to {}:{}/{} (max_connections: {})",
            config.host, config.port, config.database, config.max_connections
        );

        let mut pg_config = Config::new();
        pg_config.host = Some(config.host.clone());
        pg_config.port = Some(config.port);
        pg_config.dbname = Some(config.database.clone());
        pg_config.user = Some(config.user.clone());
        pg_config.password = Some(config.password.clone());
        pg_config.connect_timeout = Some(std::time::Duration::from_secs(
            config.connection_timeout_sec,
        ));

        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| BulkError::ConnectionError(e.to_string()))?;

        let client = pool.get().await?;
        let version: String = client
            .query_one("SELECT version()", &[])
            .await
            .map(|row| row.get(0))?;

        info!("Connected to PostgreSQL: {}", version);

        let has_timescale: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'timescaledb')",
                &[],
            )
            .await
            .map(|row| row.get(0))?;

        if has_timescale {
            let ts_version: String = client
                .query_one(
                    "SELECT extversion FROM pg_extension WHERE extname = 'timescaledb'",
                    &[],
                )
                .await
                .map(|row| row.get(0))?;
            info!("TimescaleDB extension version: {}", ts_version);
        } else {
            warn!("TimescaleDB extension not found, destinations will be plain tables");
        }

        Ok(Self {
            pool,
            has_timescale,
            ready: Mutex::new(HashSet::new()),
        })
    }

    /// Get pool status
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
            max_size: status.max_size,
        }
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<bool> {
        let client = self.pool.get().await?;
        let result: i32 = client.query_one("SELECT 1", &[]).await?.get(0);
        Ok(result == 1)
    }

    /// Create the destination table (and hypertable) if missing
    pub async fn ensure_table(&self, destination: &str) -> Result<()> {
        if self.ready.lock().contains(destination) {
            return Ok(());
        }
        if !is_sql_identifier(destination) {
            return Err(BulkError::InvalidParameters(format!(
                "destination {:?} is not a valid table name",
                destination
            )));
        }

        let client = self.pool.get().await?;
        client
            .batch_execute(&create_table_sql(destination))
            .await
            .map_err(|e| BulkError::SchemaError(e.to_string()))?;

        if self.has_timescale {
            client
                .execute(
                    "SELECT create_hypertable($1::text::regclass, 'received_at', if_not_exists => TRUE)",
                    &[&destination],
                )
                .await
                .map_err(|e| BulkError::SchemaError(e.to_string()))?;
        }

        debug!("Destination table {} ready", destination);
        self.ready.lock().insert(destination.to_string());
        Ok(())
    }

    /// Insert all rows of one destination in a single transaction
    async fn insert_rows(&self, destination: &str, items: &[&BulkItem]) -> Result<()> {
        self.ensure_table(destination).await?;
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        for chunk in items.chunks(MAX_ROWS_PER_STATEMENT) {
            let ids: Vec<Uuid> = chunk.iter().map(|item| item.id).collect();
            let times: Vec<DateTime<Utc>> = chunk.iter().map(|item| item.received_at).collect();

            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 3);
            for (i, item) in chunk.iter().enumerate() {
                params.push(&ids[i]);
                params.push(&times[i]);
                params.push(&item.document);
            }

            transaction
                .execute(&insert_sql(destination, chunk.len()), &params)
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BulkSink for TimescaleSink {
    fn name(&self) -> &str {
        "timescale"
    }

    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse> {
        let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (i, item) in items.iter().enumerate() {
            groups.entry(item.destination.as_str()).or_default().push(i);
        }

        let mut outcomes = vec![ItemOutcome::Written; items.len()];
        for (destination, indices) in groups {
            let rows: Vec<&BulkItem> = indices.iter().map(|&i| &items[i]).collect();

            if let Err(e) = self.insert_rows(destination, &rows).await {
                warn!(
                    "Insert of {} rows into {} failed: {}",
                    rows.len(),
                    destination,
                    e
                );
                let reason = e.to_string();
                for i in indices {
                    outcomes[i] = ItemOutcome::Failed {
                        reason: reason.clone(),
                    };
                }
            }
        }

        Ok(BulkResponse { outcomes })
    }
}

/// Unquoted PostgreSQL identifier, safe to interpolate into DDL
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         id UUID NOT NULL, \
         received_at TIMESTAMPTZ NOT NULL, \
         document JSONB NOT NULL)",
        table
    )
}

fn insert_sql(table: &str, rows: usize) -> String {
    let mut query = format!("INSERT INTO {} (id, received_at, document) VALUES ", table);
    for row in 0..rows {
        if row > 0 {
            query.push_str(", ");
        }
        let base = row * 3;
        query.push_str(&format!("(${}, ${}, ${})", base + 1, base + 2, base + 3));
    }
    query
}

/// Pool status information
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// Current pool size
    pub size: usize,
    /// Available connections
    pub available: usize,
    /// Waiting requests
    pub waiting: usize,
    /// Maximum pool size
    pub max_size: usize,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool[size={}, available={}, waiting={}, max={}]",
            self.size, self.available, self.waiting, self.max_size
        )
    }
}

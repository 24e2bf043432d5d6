use thiserror::Error;

/// Bulk buffering layer errors
#[derive(Error, Debug)]
pub enum BulkError {
    /// Durable store connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Bulk submission rejected or failed at the durable store
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Bulk submission did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Schema error (DDL for SQL destinations)
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio_postgres::Error> for BulkError {
    fn from(err: tokio_postgres::Error) -> Self {
        BulkError::SinkError(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for BulkError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        BulkError::ConnectionError(err.to_string())
    }
}

impl From<reqwest::Error> for BulkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BulkError::Timeout(err.to_string())
        } else if err.is_connect() {
            BulkError::ConnectionError(err.to_string())
        } else {
            BulkError::SinkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BulkError {
    fn from(err: serde_json::Error) -> Self {
        BulkError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BulkError {
    fn from(err: serde_yaml::Error) -> Self {
        BulkError::ConfigError(err.to_string())
    }
}

/// Result type for bulk buffering operations
pub type Result<T> = std::result::Result<T, BulkError>;

/// Readable message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

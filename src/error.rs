//! Error types for the replication engine.

use thiserror::Error;

/// Errors crossing component boundaries inside the engine.
///
/// Table-level failures during a tick are captured as strings in the tick
/// report and never abort the tick; these kinds cover everything else that
/// propagates.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Establishing or validating a connection failed (networking, auth).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A query or statement was rejected by the server.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The target engine rejected a schema change.
    #[error("incompatible schema change: {0}")]
    SchemaIncompatible(String),

    /// A primary key was required but the table has none.
    #[error("table '{0}' has no primary key")]
    MissingKey(String),

    /// The persisted configuration is missing, malformed, or inconsistent.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Unrecoverable failure; triggers daemon shutdown.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<mysql_async::Error> for SyncError {
    fn from(err: mysql_async::Error) -> Self {
        match &err {
            mysql_async::Error::Driver(_) | mysql_async::Error::Io(_) | mysql_async::Error::Url(_) => {
                SyncError::ConnectionFailed(err.to_string())
            }
            _ => SyncError::QueryFailed(err.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for SyncError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            SyncError::ConnectionFailed(err.to_string())
        } else {
            SyncError::QueryFailed(err.to_string())
        }
    }
}

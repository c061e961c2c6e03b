//! The dialect boundary.
//!
//! Every read or write against a database flows through [`DatabaseAdapter`].
//! The two implementations hide identifier quoting, parameter placeholder
//! style (`?` vs `$N`), information-schema shape, and driver value types;
//! the rest of the engine is oblivious to which engine it is talking to.

pub mod mysql;
pub mod postgres;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ConnectionSpec, EngineKind, Settings};
use crate::error::SyncError;
use crate::schema::descriptor::{
    ColumnDescriptor, IndexDescriptor, RoutineDescriptor, RoutineKind, TableDescriptor,
};

pub use value::{SqlRow, SqlValue};

/// Bound on the connection pool each adapter owns.
pub const POOL_MAX: usize = 10;

/// Rows per multi-row INSERT/REPLACE/UPSERT statement.
pub const INSERT_BATCH: usize = 500;

/// Engine dialect discriminator. Branch on this, never on the concrete
/// adapter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn escape_identifier(self, name: &str) -> String {
        let q = self.quote_char();
        let doubled = name.replace(q, &format!("{q}{q}"));
        format!("{q}{doubled}{q}")
    }

    /// Placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${n}"),
        }
    }

    /// Comma-separated placeholder list for parameters `start..start+count`.
    pub fn placeholder_list(self, start: usize, count: usize) -> String {
        (0..count)
            .map(|i| self.placeholder(start + i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Connect-validation retry bound, taken from the daemon settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            delay: settings.retry_delay(),
        }
    }
}

/// Per-engine capability set. All SQL generation happens behind this trait.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Establish the bounded pool and validate it by acquiring and releasing
    /// one connection. Fails with [`SyncError::ConnectionFailed`].
    async fn connect(&self) -> Result<(), SyncError>;

    /// Tear down the pool. Idempotent.
    async fn close(&self) -> Result<(), SyncError>;

    fn is_connected(&self) -> bool;

    /// Parameterized query returning column-keyed rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, SyncError>;

    /// Parameterized statement returning the affected-row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, SyncError>;

    /// Quote an identifier for embedding in generated SQL.
    fn escape_identifier(&self, name: &str) -> String {
        self.dialect().escape_identifier(name)
    }

    // Introspection

    /// Base tables of the current database/schema, each with a canonical
    /// CREATE statement.
    async fn get_tables(&self) -> Result<Vec<TableDescriptor>, SyncError>;

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, SyncError>;

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, SyncError>;

    /// First primary-key column, if the table has one.
    async fn get_primary_key(&self, table: &str) -> Result<Option<String>, SyncError>;

    /// Stored procedures or functions with their CREATE text. Routines whose
    /// CREATE text cannot be fetched are kept with an empty statement.
    async fn get_routines(&self, kind: RoutineKind) -> Result<Vec<RoutineDescriptor>, SyncError>;

    async fn get_triggers(&self) -> Result<Vec<RoutineDescriptor>, SyncError>;

    // DDL

    async fn create_table(&self, ddl: &str) -> Result<(), SyncError>;

    async fn alter_table(&self, ddl: &str) -> Result<(), SyncError>;

    async fn drop_table(&self, table: &str) -> Result<(), SyncError>;

    async fn truncate_table(&self, table: &str) -> Result<(), SyncError>;

    // Row I/O

    async fn count_rows(&self, table: &str) -> Result<u64, SyncError>;

    async fn select_all(&self, table: &str) -> Result<Vec<SqlRow>, SyncError>;

    /// One column of every row, in server order.
    async fn select_column(&self, table: &str, column: &str) -> Result<Vec<SqlValue>, SyncError>;

    /// Full rows whose `key_column` is in `keys`. An empty key list returns
    /// no rows without touching the server.
    async fn select_by_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SyncError>;

    /// Rows where `column > newer_than`; the timestamp-window read behind
    /// update detection.
    async fn select_where(
        &self,
        table: &str,
        column: &str,
        newer_than: &SqlValue,
    ) -> Result<Vec<SqlRow>, SyncError>;

    /// Bulk load. MySQL uses `REPLACE INTO`, PostgreSQL plain `INSERT`.
    async fn insert_rows(&self, table: &str, rows: &[SqlRow]) -> Result<u64, SyncError>;

    /// Keyed upsert. MySQL `INSERT .. ON DUPLICATE KEY UPDATE`, PostgreSQL
    /// `INSERT .. ON CONFLICT (pk) DO UPDATE SET ..`.
    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[SqlRow],
        primary_key: &str,
    ) -> Result<u64, SyncError>;

    /// `DELETE .. WHERE key_column IN (..)` for one batch of keys.
    async fn delete_rows(
        &self,
        table: &str,
        key_column: &str,
        keys: &[SqlValue],
    ) -> Result<u64, SyncError>;
}

/// Construct the adapter for a connection spec.
pub fn adapter_for(spec: &ConnectionSpec, retry: RetryPolicy) -> Arc<dyn DatabaseAdapter> {
    match spec.engine {
        EngineKind::Mysql => Arc::new(mysql::MySqlAdapter::new(spec.clone(), retry)),
        EngineKind::Postgresql => Arc::new(postgres::PostgresAdapter::new(spec.clone(), retry)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_escaping_doubles_quote_chars() {
        assert_eq!(Dialect::MySql.escape_identifier("users"), "`users`");
        assert_eq!(Dialect::MySql.escape_identifier("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Postgres.escape_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.escape_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn placeholder_styles() {
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder_list(1, 3), "?, ?, ?");
        assert_eq!(Dialect::Postgres.placeholder_list(4, 2), "$4, $5");
    }
}

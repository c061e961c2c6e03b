//! In-memory [`DatabaseAdapter`] used by the test suites.
//!
//! Tables are installed from descriptors and hold plain [`SqlRow`]s. Typed
//! row operations behave like a keyed engine (REPLACE semantics on insert);
//! DDL and raw statements are recorded for assertions instead of being
//! parsed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapter::{DatabaseAdapter, Dialect, SqlRow, SqlValue};
use crate::error::SyncError;
use crate::schema::descriptor::{
    ColumnDescriptor, IndexDescriptor, RoutineDescriptor, RoutineKind, TableDescriptor,
};

struct MemTable {
    descriptor: TableDescriptor,
    rows: Vec<SqlRow>,
}

#[derive(Default)]
struct MemoryDb {
    tables: BTreeMap<String, MemTable>,
    routines: Vec<RoutineDescriptor>,
    ddl_log: Vec<String>,
    op_log: Vec<String>,
}

pub struct MemoryAdapter {
    dialect: Dialect,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    inner: Mutex<MemoryDb>,
}

impl MemoryAdapter {
    pub fn new(dialect: Dialect) -> Self {
        MemoryAdapter {
            dialect,
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            inner: Mutex::new(MemoryDb::default()),
        }
    }

    /// Make the next `connect` fail, for worker start-failure tests.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn install_table(&self, descriptor: TableDescriptor, rows: Vec<SqlRow>) {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.tables
            .insert(descriptor.name.clone(), MemTable { descriptor, rows });
    }

    pub fn rows(&self, table: &str) -> Vec<SqlRow> {
        let db = self.inner.lock().expect("memory db poisoned");
        db.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn set_rows(&self, table: &str, rows: Vec<SqlRow>) {
        let mut db = self.inner.lock().expect("memory db poisoned");
        if let Some(t) = db.tables.get_mut(table) {
            t.rows = rows;
        }
    }

    pub fn add_routine(&self, routine: RoutineDescriptor) {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.routines.push(routine);
    }

    /// Every DDL or raw statement that was executed, in order.
    pub fn ddl_log(&self) -> Vec<String> {
        self.inner.lock().expect("memory db poisoned").ddl_log.clone()
    }

    /// Every row mutation that was performed, in order, as
    /// `op:table:row-count` entries.
    pub fn op_log(&self) -> Vec<String> {
        self.inner.lock().expect("memory db poisoned").op_log.clone()
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemTable, &mut Vec<String>) -> T,
    ) -> Result<T, SyncError> {
        let mut db = self.inner.lock().expect("memory db poisoned");
        let db = &mut *db;
        match db.tables.get_mut(table) {
            Some(t) => Ok(f(t, &mut db.op_log)),
            None => Err(SyncError::QueryFailed(format!(
                "table '{table}' does not exist"
            ))),
        }
    }
}

fn key_of(row: &SqlRow, pk: &str) -> Option<SqlValue> {
    row.get(pk).cloned()
}

/// Insert with REPLACE semantics: a row whose key already exists supersedes
/// the old row in place.
fn replace_into(table: &mut MemTable, rows: &[SqlRow]) -> u64 {
    let pk = table.descriptor.primary_key().map(str::to_string);
    let mut affected = 0;
    for row in rows {
        if let Some(pk) = pk.as_deref() {
            if let Some(key) = key_of(row, pk) {
                table.rows.retain(|r| key_of(r, pk).as_ref() != Some(&key));
            }
        }
        table.rows.push(row.clone());
        affected += 1;
    }
    affected
}

#[async_trait]
impl DatabaseAdapter for MemoryAdapter {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<(), SyncError> {
        if self.fail_connect.load(AtomicOrdering::SeqCst) {
            return Err(SyncError::ConnectionFailed(
                "simulated connect failure".to_string(),
            ));
        }
        self.connected.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), SyncError> {
        self.connected.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }

    async fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<SqlRow>, SyncError> {
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> Result<u64, SyncError> {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.ddl_log.push(sql.to_string());
        Ok(0)
    }

    async fn get_tables(&self) -> Result<Vec<TableDescriptor>, SyncError> {
        let db = self.inner.lock().expect("memory db poisoned");
        Ok(db.tables.values().map(|t| t.descriptor.clone()).collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, SyncError> {
        self.with_table(table, |t, _| t.descriptor.columns.clone())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, SyncError> {
        self.with_table(table, |t, _| t.descriptor.indexes.clone())
    }

    async fn get_primary_key(&self, table: &str) -> Result<Option<String>, SyncError> {
        self.with_table(table, |t, _| {
            t.descriptor.primary_key().map(str::to_string)
        })
    }

    async fn get_routines(&self, kind: RoutineKind) -> Result<Vec<RoutineDescriptor>, SyncError> {
        let db = self.inner.lock().expect("memory db poisoned");
        Ok(db
            .routines
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_triggers(&self) -> Result<Vec<RoutineDescriptor>, SyncError> {
        self.get_routines(RoutineKind::Trigger).await
    }

    async fn create_table(&self, ddl: &str) -> Result<(), SyncError> {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.ddl_log.push(ddl.to_string());
        Ok(())
    }

    async fn alter_table(&self, ddl: &str) -> Result<(), SyncError> {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.ddl_log.push(ddl.to_string());
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<(), SyncError> {
        let mut db = self.inner.lock().expect("memory db poisoned");
        db.ddl_log.push(format!("DROP TABLE {table}"));
        db.tables.remove(table);
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<(), SyncError> {
        self.with_table(table, |t, ops| {
            ops.push(format!("truncate:{table}:{}", t.rows.len()));
            t.rows.clear();
        })
    }

    async fn count_rows(&self, table: &str) -> Result<u64, SyncError> {
        self.with_table(table, |t, _| t.rows.len() as u64)
    }

    async fn select_all(&self, table: &str) -> Result<Vec<SqlRow>, SyncError> {
        self.with_table(table, |t, _| t.rows.clone())
    }

    async fn select_column(&self, table: &str, column: &str) -> Result<Vec<SqlValue>, SyncError> {
        self.with_table(table, |t, _| {
            t.rows
                .iter()
                .map(|r| r.get(column).cloned().unwrap_or(SqlValue::Null))
                .collect()
        })
    }

    async fn select_by_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SyncError> {
        let wanted: HashSet<&SqlValue> = keys.iter().collect();
        self.with_table(table, |t, _| {
            t.rows
                .iter()
                .filter(|r| r.get(key_column).map(|k| wanted.contains(k)).unwrap_or(false))
                .cloned()
                .collect()
        })
    }

    async fn select_where(
        &self,
        table: &str,
        column: &str,
        newer_than: &SqlValue,
    ) -> Result<Vec<SqlRow>, SyncError> {
        self.with_table(table, |t, _| {
            t.rows
                .iter()
                .filter(|r| {
                    r.get(column)
                        .and_then(|v| v.compare(newer_than))
                        .map(|o| o == Ordering::Greater)
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        })
    }

    async fn insert_rows(&self, table: &str, rows: &[SqlRow]) -> Result<u64, SyncError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.with_table(table, |t, ops| {
            let affected = replace_into(t, rows);
            ops.push(format!("insert:{table}:{affected}"));
            affected
        })
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[SqlRow],
        _primary_key: &str,
    ) -> Result<u64, SyncError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.with_table(table, |t, ops| {
            let affected = replace_into(t, rows);
            ops.push(format!("upsert:{table}:{affected}"));
            affected
        })
    }

    async fn delete_rows(
        &self,
        table: &str,
        key_column: &str,
        keys: &[SqlValue],
    ) -> Result<u64, SyncError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let doomed: HashSet<&SqlValue> = keys.iter().collect();
        self.with_table(table, |t, ops| {
            let before = t.rows.len();
            t.rows.retain(|r| {
                r.get(key_column)
                    .map(|k| !doomed.contains(k))
                    .unwrap_or(true)
            });
            let affected = (before - t.rows.len()) as u64;
            ops.push(format!("delete:{table}:{affected}"));
            affected
        })
    }
}

//! MySQL dialect adapter over a bounded `mysql_async` pool.

use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Column, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Value};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::adapter::{DatabaseAdapter, Dialect, RetryPolicy, SqlRow, SqlValue, INSERT_BATCH, POOL_MAX};
use crate::config::ConnectionSpec;
use crate::error::SyncError;
use crate::schema::descriptor::{
    ColumnDescriptor, IndexDescriptor, RoutineDescriptor, RoutineKind, TableDescriptor,
};

/// The MySQL-flavored side of the dialect boundary.
pub struct MySqlAdapter {
    spec: ConnectionSpec,
    retry: RetryPolicy,
    pool: RwLock<Option<Pool>>,
}

impl MySqlAdapter {
    pub fn new(spec: ConnectionSpec, retry: RetryPolicy) -> Self {
        MySqlAdapter {
            spec,
            retry,
            pool: RwLock::new(None),
        }
    }

    fn opts(&self) -> Opts {
        // 1..=POOL_MAX is always a valid constraint range.
        let constraints = PoolConstraints::new(1, POOL_MAX).unwrap_or_default();
        OptsBuilder::default()
            .ip_or_hostname(self.spec.host.clone())
            .tcp_port(self.spec.port)
            .user(Some(self.spec.user.clone()))
            .pass(Some(self.spec.password.clone()))
            .db_name(Some(self.spec.database.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints))
            .into()
    }

    fn pool(&self) -> Result<Pool, SyncError> {
        self.pool
            .read()
            .expect("pool lock poisoned")
            .clone()
            .ok_or_else(|| SyncError::ConnectionFailed("adapter is not connected".to_string()))
    }

    async fn conn(&self) -> Result<mysql_async::Conn, SyncError> {
        self.pool()?
            .get_conn()
            .await
            .map_err(|e| SyncError::ConnectionFailed(e.to_string()))
    }

    async fn raw_query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, SyncError> {
        let mut conn = self.conn().await?;
        // Text protocol for parameterless statements so SHOW and friends work.
        let rows: Vec<mysql_async::Row> = if params.is_empty() {
            conn.query(sql).await?
        } else {
            let values: Vec<Value> = params.iter().map(sql_to_mysql_value).collect();
            conn.exec(sql, Params::Positional(values)).await?
        };
        Ok(rows.into_iter().map(from_mysql_row).collect())
    }

    async fn raw_execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, SyncError> {
        let mut conn = self.conn().await?;
        if params.is_empty() {
            conn.query_drop(sql).await?;
        } else {
            let values: Vec<Value> = params.iter().map(sql_to_mysql_value).collect();
            conn.exec_drop(sql, Params::Positional(values)).await?;
        }
        Ok(conn.affected_rows())
    }

    /// `SHOW CREATE TABLE`: the engine's own canonical DDL.
    async fn show_create_table(&self, table: &str) -> Result<String, SyncError> {
        let sql = format!("SHOW CREATE TABLE {}", self.escape_identifier(table));
        let rows = self.raw_query(&sql, &[]).await?;
        let row = rows
            .first()
            .ok_or_else(|| SyncError::QueryFailed(format!("SHOW CREATE TABLE {table} returned nothing")))?;
        Ok(text_value(&row.values()[1]))
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn connect(&self) -> Result<(), SyncError> {
        let pool = Pool::new(self.opts());

        let mut attempt = 0u32;
        loop {
            match pool.get_conn().await {
                Ok(conn) => {
                    drop(conn);
                    break;
                }
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        "MySQL connect to {}:{} failed (attempt {attempt}/{}): {e}",
                        self.spec.host, self.spec.port, self.retry.max_retries
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    let _ = pool.disconnect().await;
                    return Err(SyncError::ConnectionFailed(format!(
                        "MySQL {}:{}/{}: {e}",
                        self.spec.host, self.spec.port, self.spec.database
                    )));
                }
            }
        }

        *self.pool.write().expect("pool lock poisoned") = Some(pool);
        debug!(
            "Connected to MySQL {}:{}/{}",
            self.spec.host, self.spec.port, self.spec.database
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), SyncError> {
        let pool = self.pool.write().expect("pool lock poisoned").take();
        if let Some(pool) = pool {
            pool.disconnect()
                .await
                .map_err(|e| SyncError::ConnectionFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.read().expect("pool lock poisoned").is_some()
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, SyncError> {
        self.raw_query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, SyncError> {
        self.raw_execute(sql, params).await
    }

    async fn get_tables(&self) -> Result<Vec<TableDescriptor>, SyncError> {
        let rows = self
            .raw_query(
                "SELECT TABLE_NAME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME",
                &[],
            )
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name = text_value(&row.values()[0]);
            let columns = self.get_columns(&name).await?;
            let indexes = self.get_indexes(&name).await?;
            let create_statement = self.show_create_table(&name).await?;
            tables.push(TableDescriptor {
                name,
                columns,
                indexes,
                create_statement,
            });
        }
        Ok(tables)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, SyncError> {
        let sql = format!("SHOW FULL COLUMNS FROM {}", self.escape_identifier(table));
        let rows = self.raw_query(&sql, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get("Field").map(text_value).unwrap_or_default(),
                type_name: row.get("Type").map(text_value).unwrap_or_default(),
                nullable: row.get("Null").map(text_value).as_deref() == Some("YES"),
                default: row.get("Default").and_then(|v| match v {
                    SqlValue::Null => None,
                    other => Some(text_value(other)),
                }),
                extra: row.get("Extra").map(text_value).unwrap_or_default(),
                primary_key: row.get("Key").map(text_value).as_deref() == Some("PRI"),
            })
            .collect())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, SyncError> {
        let sql = format!("SHOW INDEX FROM {}", self.escape_identifier(table));
        let rows = self.raw_query(&sql, &[]).await?;

        // Rows arrive ordered by Key_name, Seq_in_index; group preserving
        // first-seen order.
        let mut indexes: Vec<IndexDescriptor> = Vec::new();
        for row in &rows {
            let name = row.get("Key_name").map(text_value).unwrap_or_default();
            let column = row.get("Column_name").map(text_value).unwrap_or_default();
            let unique = matches!(row.get("Non_unique"), Some(SqlValue::Int(0)) | Some(SqlValue::UInt(0)))
                || row.get("Non_unique").map(text_value).as_deref() == Some("0");
            let index_type = row.get("Index_type").map(text_value).unwrap_or_default();

            match indexes.iter_mut().find(|i| i.name == name) {
                Some(index) => index.columns.push(column),
                None => indexes.push(IndexDescriptor {
                    name,
                    unique,
                    columns: vec![column],
                    index_type,
                }),
            }
        }
        Ok(indexes)
    }

    async fn get_primary_key(&self, table: &str) -> Result<Option<String>, SyncError> {
        let columns = self.get_columns(table).await?;
        Ok(columns.into_iter().find(|c| c.primary_key).map(|c| c.name))
    }

    async fn get_routines(&self, kind: RoutineKind) -> Result<Vec<RoutineDescriptor>, SyncError> {
        if kind == RoutineKind::Trigger {
            return self.get_triggers().await;
        }

        let status_sql = format!("SHOW {} STATUS WHERE Db = DATABASE()", kind.keyword());
        let rows = self.raw_query(&status_sql, &[]).await?;

        let mut routines = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = row.get("Name").map(text_value).unwrap_or_default();
            let create_sql = format!(
                "SHOW CREATE {} {}",
                kind.keyword(),
                self.escape_identifier(&name)
            );
            // The CREATE text column is NULL without SHOW_ROUTINE privilege;
            // keep the routine with an empty statement in that case.
            let create_statement = match self.raw_query(&create_sql, &[]).await {
                Ok(create_rows) => create_rows
                    .first()
                    .and_then(|r| match &r.values().get(2) {
                        Some(SqlValue::Null) | None => None,
                        Some(v) => Some(text_value(v)),
                    })
                    .unwrap_or_default(),
                Err(e) => {
                    warn!("Could not fetch CREATE text for {kind} {name}: {e}");
                    String::new()
                }
            };
            routines.push(RoutineDescriptor {
                name,
                kind,
                create_statement,
                on_table: None,
            });
        }
        Ok(routines)
    }

    async fn get_triggers(&self) -> Result<Vec<RoutineDescriptor>, SyncError> {
        let rows = self.raw_query("SHOW TRIGGERS", &[]).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = row.get("Trigger").map(text_value).unwrap_or_default();
                let timing = row.get("Timing").map(text_value).unwrap_or_default();
                let event = row.get("Event").map(text_value).unwrap_or_default();
                let table = row.get("Table").map(text_value).unwrap_or_default();
                let statement = row.get("Statement").map(text_value).unwrap_or_default();
                let create_statement = format!(
                    "CREATE TRIGGER {} {timing} {event} ON {} FOR EACH ROW {statement}",
                    self.escape_identifier(&name),
                    self.escape_identifier(&table),
                );
                RoutineDescriptor {
                    name,
                    kind: RoutineKind::Trigger,
                    create_statement,
                    on_table: Some(table),
                }
            })
            .collect())
    }

    async fn create_table(&self, ddl: &str) -> Result<(), SyncError> {
        self.raw_execute(ddl, &[]).await.map(|_| ())
    }

    async fn alter_table(&self, ddl: &str) -> Result<(), SyncError> {
        self.raw_execute(ddl, &[]).await.map(|_| ())
    }

    async fn drop_table(&self, table: &str) -> Result<(), SyncError> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.escape_identifier(table));
        self.raw_execute(&sql, &[]).await.map(|_| ())
    }

    async fn truncate_table(&self, table: &str) -> Result<(), SyncError> {
        let sql = format!("TRUNCATE TABLE {}", self.escape_identifier(table));
        self.raw_execute(&sql, &[]).await.map(|_| ())
    }

    async fn count_rows(&self, table: &str) -> Result<u64, SyncError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.escape_identifier(table));
        let rows = self.raw_query(&sql, &[]).await?;
        Ok(rows
            .first()
            .and_then(|r| match r.values().first() {
                Some(SqlValue::Int(n)) => u64::try_from(*n).ok(),
                Some(SqlValue::UInt(n)) => Some(*n),
                Some(other) => text_value(other).parse().ok(),
                None => None,
            })
            .unwrap_or(0))
    }

    async fn select_all(&self, table: &str) -> Result<Vec<SqlRow>, SyncError> {
        let sql = format!("SELECT * FROM {}", self.escape_identifier(table));
        self.raw_query(&sql, &[]).await
    }

    async fn select_column(&self, table: &str, column: &str) -> Result<Vec<SqlValue>, SyncError> {
        let sql = format!(
            "SELECT {} FROM {}",
            self.escape_identifier(column),
            self.escape_identifier(table)
        );
        let rows = self.raw_query(&sql, &[]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.into_values().into_iter().next())
            .collect())
    }

    async fn select_by_keys(
        &self,
        table: &str,
        key_column: &str,
        keys: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SyncError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            self.escape_identifier(table),
            self.escape_identifier(key_column),
            Dialect::MySql.placeholder_list(1, keys.len())
        );
        self.raw_query(&sql, keys).await
    }

    async fn select_where(
        &self,
        table: &str,
        column: &str,
        newer_than: &SqlValue,
    ) -> Result<Vec<SqlRow>, SyncError> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} > ?",
            self.escape_identifier(table),
            self.escape_identifier(column)
        );
        self.raw_query(&sql, std::slice::from_ref(newer_than)).await
    }

    async fn insert_rows(&self, table: &str, rows: &[SqlRow]) -> Result<u64, SyncError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let column_list = first
            .columns()
            .iter()
            .map(|c| self.escape_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let tuple = format!("({})", Dialect::MySql.placeholder_list(1, first.len()));
            let tuples = vec![tuple; chunk.len()].join(", ");
            let sql = format!(
                "REPLACE INTO {} ({column_list}) VALUES {tuples}",
                self.escape_identifier(table)
            );
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|r| r.values().iter().cloned())
                .collect();
            affected += self.raw_execute(&sql, &params).await?;
        }
        Ok(affected)
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[SqlRow],
        primary_key: &str,
    ) -> Result<u64, SyncError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let column_list = first
            .columns()
            .iter()
            .map(|c| self.escape_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut assignments: Vec<String> = first
            .columns()
            .iter()
            .filter(|c| c.as_str() != primary_key)
            .map(|c| {
                let esc = self.escape_identifier(c);
                format!("{esc} = VALUES({esc})")
            })
            .collect();
        if assignments.is_empty() {
            // Key-only table: nothing to update, keep the statement valid.
            let esc = self.escape_identifier(primary_key);
            assignments.push(format!("{esc} = {esc}"));
        }
        let assignment_list = assignments.join(", ");

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let tuple = format!("({})", Dialect::MySql.placeholder_list(1, first.len()));
            let tuples = vec![tuple; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES {tuples} ON DUPLICATE KEY UPDATE {assignment_list}",
                self.escape_identifier(table)
            );
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|r| r.values().iter().cloned())
                .collect();
            affected += self.raw_execute(&sql, &params).await?;
        }
        Ok(affected)
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
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.escape_identifier(table),
            self.escape_identifier(key_column),
            Dialect::MySql.placeholder_list(1, keys.len())
        );
        self.raw_execute(&sql, keys).await
    }
}

/// Render a value as text, for result cells known to be strings.
fn text_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_string(),
    }
}

fn from_mysql_row(row: mysql_async::Row) -> SqlRow {
    let columns = row.columns();
    let names: Arc<Vec<String>> = Arc::new(
        columns
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect(),
    );
    let values = row
        .unwrap()
        .into_iter()
        .zip(columns.iter())
        .map(|(value, column)| mysql_value_to_sql(value, column))
        .collect();
    SqlRow::new(names, values)
}

/// Convert a driver value into the engine-neutral representation, driven by
/// the column metadata so both text- and binary-protocol results map the
/// same way.
fn mysql_value_to_sql(value: Value, column: &Column) -> SqlValue {
    use ColumnType::*;

    if matches!(value, Value::NULL) {
        return SqlValue::Null;
    }
    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);

    match column.column_type() {
        MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
            if unsigned {
                value_to_u64(&value).map(SqlValue::UInt).unwrap_or(SqlValue::Null)
            } else {
                value_to_i64(&value).map(SqlValue::Int).unwrap_or(SqlValue::Null)
            }
        }
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => value_to_f64(&value)
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => {
            let text = value_to_string(&value);
            Decimal::from_str(text.trim())
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::Text(text))
        }
        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => date_from_value(&value),
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP
        | MYSQL_TYPE_TIMESTAMP2 => datetime_from_value(&value),
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => time_from_value(&value),
        MYSQL_TYPE_JSON => {
            let text = value_to_string(&value);
            serde_json::from_str(&text)
                .map(SqlValue::Json)
                .unwrap_or(SqlValue::Text(text))
        }
        MYSQL_TYPE_BIT => match value {
            Value::Bytes(b) => SqlValue::Bytes(b),
            other => value_to_u64(&other).map(SqlValue::UInt).unwrap_or(SqlValue::Null),
        },
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_STRING | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_VARCHAR | MYSQL_TYPE_ENUM
        | MYSQL_TYPE_SET | MYSQL_TYPE_GEOMETRY => match value {
            Value::Bytes(b) => {
                // Charset 63 is the binary pseudo-charset.
                if column.character_set() == 63 {
                    SqlValue::Bytes(b)
                } else {
                    match String::from_utf8(b) {
                        Ok(s) => SqlValue::Text(s),
                        Err(e) => SqlValue::Bytes(e.into_bytes()),
                    }
                }
            }
            other => SqlValue::Text(value_to_string(&other)),
        },
        _ => match value {
            Value::Int(i) => SqlValue::Int(i),
            Value::UInt(u) => SqlValue::UInt(u),
            Value::Float(f) => SqlValue::Float(f as f64),
            Value::Double(d) => SqlValue::Float(d),
            Value::Bytes(b) => match String::from_utf8(b) {
                Ok(s) => SqlValue::Text(s),
                Err(e) => SqlValue::Bytes(e.into_bytes()),
            },
            other => SqlValue::Text(format!("{other:?}")),
        },
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::UInt(u) => i64::try_from(*u).ok(),
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Int(i) => u64::try_from(*i).ok(),
        Value::UInt(u) => Some(*u),
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f as f64),
        Value::Double(d) => Some(*d),
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        other => format!("{other:?}"),
    }
}

fn date_from_value(value: &Value) -> SqlValue {
    match value {
        // Zero dates have no NaiveDate representation and become NULL.
        Value::Date(y, mo, d, ..) => NaiveDate::from_ymd_opt(*y as i32, *mo as u32, *d as u32)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        Value::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        _ => SqlValue::Null,
    }
}

fn datetime_from_value(value: &Value) -> SqlValue {
    let naive = match value {
        Value::Date(y, mo, d, h, mi, s, us) => NaiveDate::from_ymd_opt(*y as i32, *mo as u32, *d as u32)
            .and_then(|date| date.and_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us)),
        Value::Bytes(b) => std::str::from_utf8(b).ok().and_then(parse_datetime_text),
        _ => None,
    };
    naive
        .map(|n| SqlValue::DateTime(DateTime::from_naive_utc_and_offset(n, Utc)))
        .unwrap_or(SqlValue::Null)
}

fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

fn time_from_value(value: &Value) -> SqlValue {
    match value {
        Value::Time(false, 0, h, mi, s, us) => {
            NaiveTime::from_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us)
                .map(SqlValue::Time)
                .unwrap_or(SqlValue::Null)
        }
        Value::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| {
                let s = s.trim();
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                    .ok()
            })
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),
        // Negative or multi-day TIME values have no NaiveTime representation.
        _ => SqlValue::Null,
    }
}

fn sql_to_mysql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::UInt(u) => Value::UInt(*u),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.to_string().into_bytes()),
        SqlValue::DateTime(dt) => {
            let n = dt.naive_utc();
            Value::Date(
                n.year() as u16,
                n.month() as u8,
                n.day() as u8,
                n.hour() as u8,
                n.minute() as u8,
                n.second() as u8,
                dt.timestamp_subsec_micros(),
            )
        }
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        SqlValue::Json(j) => Value::Bytes(j.to_string().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_roundtrips_through_driver_value() {
        let dt: DateTime<Utc> = "2024-03-01T12:30:45.500Z".parse().unwrap();
        let value = sql_to_mysql_value(&SqlValue::DateTime(dt));
        match value {
            Value::Date(y, mo, d, h, mi, s, us) => {
                assert_eq!((y, mo, d, h, mi, s), (2024, 3, 1, 12, 30, 45));
                assert_eq!(us, 500_000);
            }
            other => panic!("expected Value::Date, got {other:?}"),
        }
    }

    #[test]
    fn text_protocol_numbers_parse() {
        assert_eq!(value_to_i64(&Value::Bytes(b"42".to_vec())), Some(42));
        assert_eq!(value_to_u64(&Value::Bytes(b"42".to_vec())), Some(42));
        assert_eq!(value_to_f64(&Value::Bytes(b"1.5".to_vec())), Some(1.5));
    }

    #[test]
    fn datetime_text_parses_with_and_without_fraction() {
        assert!(parse_datetime_text("2024-01-02 03:04:05").is_some());
        assert!(parse_datetime_text("2024-01-02 03:04:05.123456").is_some());
        assert!(parse_datetime_text("not a date").is_none());
    }
}

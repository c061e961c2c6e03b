//! PostgreSQL dialect adapter over `tokio_postgres`.
//!
//! The driver has no built-in pool; the adapter owns one client whose
//! connection future runs on a spawned driver task. The engine issues
//! statements serially per pair, so a single validated client satisfies the
//! `connect`/`close`/`is_connected` surface.

use std::error::Error as StdError;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::adapter::{DatabaseAdapter, Dialect, RetryPolicy, SqlRow, SqlValue, INSERT_BATCH};
use crate::config::ConnectionSpec;
use crate::error::SyncError;
use crate::schema::descriptor::{
    ColumnDescriptor, IndexDescriptor, RoutineDescriptor, RoutineKind, TableDescriptor,
};

struct PgHandle {
    client: Arc<Client>,
    driver: tokio::task::JoinHandle<()>,
}

/// The PostgreSQL-flavored side of the dialect boundary.
pub struct PostgresAdapter {
    spec: ConnectionSpec,
    retry: RetryPolicy,
    handle: RwLock<Option<PgHandle>>,
}

impl PostgresAdapter {
    pub fn new(spec: ConnectionSpec, retry: RetryPolicy) -> Self {
        PostgresAdapter {
            spec,
            retry,
            handle: RwLock::new(None),
        }
    }

    fn client(&self) -> Result<Arc<Client>, SyncError> {
        self.handle
            .read()
            .expect("handle lock poisoned")
            .as_ref()
            .map(|h| Arc::clone(&h.client))
            .ok_or_else(|| SyncError::ConnectionFailed("adapter is not connected".to_string()))
    }

    /// Ordered primary-key column names for a table.
    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, SyncError> {
        let client = self.client()?;
        let rows = client
            .query(
                "SELECT kcu.column_name
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = 'public'
                   AND tc.table_name = $1
                 ORDER BY kcu.ordinal_position",
                &[&table],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    /// PostgreSQL has no `SHOW CREATE TABLE`; the canonical statement is
    /// synthesized from the column descriptors in ordinal order.
    fn synthesize_create(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        pk_columns: &[String],
    ) -> String {
        let mut lines: Vec<String> = columns
            .iter()
            .map(|c| {
                let mut line = format!("    {} {}", self.escape_identifier(&c.name), c.type_name);
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(default) = &c.default {
                    line.push_str(&format!(" DEFAULT {default}"));
                }
                line
            })
            .collect();
        if !pk_columns.is_empty() {
            let key_list = pk_columns
                .iter()
                .map(|c| self.escape_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("    PRIMARY KEY ({key_list})"));
        }
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.escape_identifier(table),
            lines.join(",\n")
        )
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self) -> Result<(), SyncError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.spec.host)
            .port(self.spec.port)
            .user(&self.spec.user)
            .password(&self.spec.password)
            .dbname(&self.spec.database);

        let mut attempt = 0u32;
        let (client, connection) = loop {
            match config.connect(NoTls).await {
                Ok(pair) => break pair,
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        "PostgreSQL connect to {}:{} failed (attempt {attempt}/{}): {e}",
                        self.spec.host, self.spec.port, self.retry.max_retries
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    return Err(SyncError::ConnectionFailed(format!(
                        "PostgreSQL {}:{}/{}: {e}",
                        self.spec.host, self.spec.port, self.spec.database
                    )));
                }
            }
        };

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {e}");
            }
        });

        // Validate before handing the client out.
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::ConnectionFailed(e.to_string()))?;

        *self.handle.write().expect("handle lock poisoned") = Some(PgHandle {
            client: Arc::new(client),
            driver,
        });
        debug!(
            "Connected to PostgreSQL {}:{}/{}",
            self.spec.host, self.spec.port, self.spec.database
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), SyncError> {
        let handle = self.handle.write().expect("handle lock poisoned").take();
        if let Some(handle) = handle {
            // The adapter owns the only long-lived reference; dropping it
            // ends the connection and the driver task with it.
            drop(handle.client);
            let _ = handle.driver.await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.read().expect("handle lock poisoned").is_some()
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, SyncError> {
        let client = self.client()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.query(sql, &refs).await?;
        rows.iter().map(pg_row_to_sql_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, SyncError> {
        let client = self.client()?;
        if params.is_empty() {
            // Simple protocol so DDL and routine bodies run unprepared.
            let messages = client.simple_query(sql).await?;
            let affected = messages
                .iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::CommandComplete(n) => Some(*n),
                    _ => None,
                })
                .sum();
            return Ok(affected);
        }
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Ok(client.execute(sql, &refs).await?)
    }

    async fn get_tables(&self) -> Result<Vec<TableDescriptor>, SyncError> {
        let client = self.client()?;
        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[],
            )
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            let columns = self.get_columns(&name).await?;
            let indexes = self.get_indexes(&name).await?;
            let pk_columns = self.primary_key_columns(&name).await?;
            let create_statement = self.synthesize_create(&name, &columns, &pk_columns);
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
        let client = self.client()?;
        let pk_columns = self.primary_key_columns(table).await?;
        let rows = client
            .query(
                "SELECT column_name, data_type, is_nullable, column_default,
                        character_maximum_length, numeric_precision, numeric_scale,
                        is_identity
                 FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let data_type: String = row.get(1);
                let is_nullable: String = row.get(2);
                let default: Option<String> = row.get(3);
                let char_len: Option<i32> = row.get(4);
                let num_precision: Option<i32> = row.get(5);
                let num_scale: Option<i32> = row.get(6);
                let is_identity: String = row.get(7);

                let type_name = match (data_type.as_str(), char_len, num_precision, num_scale) {
                    ("character varying", Some(len), _, _) => format!("character varying({len})"),
                    ("character", Some(len), _, _) => format!("character({len})"),
                    ("numeric", _, Some(p), Some(s)) => format!("numeric({p},{s})"),
                    _ => data_type,
                };

                ColumnDescriptor {
                    primary_key: pk_columns.contains(&name),
                    name,
                    type_name,
                    nullable: is_nullable == "YES",
                    default,
                    extra: if is_identity == "YES" {
                        "identity".to_string()
                    } else {
                        String::new()
                    },
                }
            })
            .collect())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, SyncError> {
        let client = self.client()?;
        let rows = client
            .query(
                "SELECT i.relname AS index_name,
                        ix.indisunique AS is_unique,
                        a.attname AS column_name,
                        am.amname AS index_type
                 FROM pg_class t
                 JOIN pg_namespace n ON t.relnamespace = n.oid
                 JOIN pg_index ix ON t.oid = ix.indrelid
                 JOIN pg_class i ON i.oid = ix.indexrelid
                 JOIN pg_am am ON i.relam = am.oid
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
                 WHERE n.nspname = 'public' AND t.relname = $1
                 ORDER BY i.relname, array_position(ix.indkey, a.attnum)",
                &[&table],
            )
            .await?;

        let mut indexes: Vec<IndexDescriptor> = Vec::new();
        for row in &rows {
            let name: String = row.get(0);
            let unique: bool = row.get(1);
            let column: String = row.get(2);
            let index_type: String = row.get(3);

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
        Ok(self.primary_key_columns(table).await?.into_iter().next())
    }

    async fn get_routines(&self, kind: RoutineKind) -> Result<Vec<RoutineDescriptor>, SyncError> {
        if kind == RoutineKind::Trigger {
            return self.get_triggers().await;
        }
        let client = self.client()?;
        let prokind = match kind {
            RoutineKind::Function => b'f' as i8,
            RoutineKind::Procedure => b'p' as i8,
            RoutineKind::Trigger => unreachable!(),
        };
        let rows = client
            .query(
                "SELECT p.proname, p.oid
                 FROM pg_proc p
                 JOIN pg_namespace n ON p.pronamespace = n.oid
                 WHERE n.nspname = 'public' AND p.prokind = $1
                 ORDER BY p.proname",
                &[&prokind],
            )
            .await?;

        let mut routines = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get(0);
            let oid: u32 = row.get(1);
            let create_statement = match client
                .query_one("SELECT pg_get_functiondef($1)", &[&oid])
                .await
            {
                Ok(def_row) => def_row.get::<_, String>(0),
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
        let client = self.client()?;
        let rows = client
            .query(
                "SELECT t.tgname, c.relname, t.oid
                 FROM pg_trigger t
                 JOIN pg_class c ON t.tgrelid = c.oid
                 JOIN pg_namespace n ON c.relnamespace = n.oid
                 WHERE n.nspname = 'public' AND NOT t.tgisinternal
                 ORDER BY t.tgname",
                &[],
            )
            .await?;

        let mut triggers = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get(0);
            let table: String = row.get(1);
            let oid: u32 = row.get(2);
            let create_statement = match client
                .query_one("SELECT pg_get_triggerdef($1)", &[&oid])
                .await
            {
                Ok(def_row) => def_row.get::<_, String>(0),
                Err(e) => {
                    warn!("Could not fetch CREATE text for trigger {name}: {e}");
                    String::new()
                }
            };
            triggers.push(RoutineDescriptor {
                name,
                kind: RoutineKind::Trigger,
                create_statement,
                on_table: Some(table),
            });
        }
        Ok(triggers)
    }

    async fn create_table(&self, ddl: &str) -> Result<(), SyncError> {
        self.execute(ddl, &[]).await.map(|_| ())
    }

    async fn alter_table(&self, ddl: &str) -> Result<(), SyncError> {
        self.execute(ddl, &[]).await.map(|_| ())
    }

    async fn drop_table(&self, table: &str) -> Result<(), SyncError> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.escape_identifier(table));
        self.execute(&sql, &[]).await.map(|_| ())
    }

    async fn truncate_table(&self, table: &str) -> Result<(), SyncError> {
        let sql = format!("TRUNCATE TABLE {}", self.escape_identifier(table));
        self.execute(&sql, &[]).await.map(|_| ())
    }

    async fn count_rows(&self, table: &str) -> Result<u64, SyncError> {
        let client = self.client()?;
        let sql = format!("SELECT COUNT(*) FROM {}", self.escape_identifier(table));
        let row = client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn select_all(&self, table: &str) -> Result<Vec<SqlRow>, SyncError> {
        let sql = format!("SELECT * FROM {}", self.escape_identifier(table));
        self.query(&sql, &[]).await
    }

    async fn select_column(&self, table: &str, column: &str) -> Result<Vec<SqlValue>, SyncError> {
        let sql = format!(
            "SELECT {} FROM {}",
            self.escape_identifier(column),
            self.escape_identifier(table)
        );
        let rows = self.query(&sql, &[]).await?;
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
            Dialect::Postgres.placeholder_list(1, keys.len())
        );
        self.query(&sql, keys).await
    }

    async fn select_where(
        &self,
        table: &str,
        column: &str,
        newer_than: &SqlValue,
    ) -> Result<Vec<SqlRow>, SyncError> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} > $1",
            self.escape_identifier(table),
            self.escape_identifier(column)
        );
        self.query(&sql, std::slice::from_ref(newer_than)).await
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
            let mut tuples = Vec::with_capacity(chunk.len());
            let mut next = 1;
            for _ in chunk {
                tuples.push(format!(
                    "({})",
                    Dialect::Postgres.placeholder_list(next, first.len())
                ));
                next += first.len();
            }
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES {}",
                self.escape_identifier(table),
                tuples.join(", ")
            );
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|r| r.values().iter().cloned())
                .collect();
            affected += self.execute(&sql, &params).await?;
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

        let assignments: Vec<String> = first
            .columns()
            .iter()
            .filter(|c| c.as_str() != primary_key)
            .map(|c| {
                let esc = self.escape_identifier(c);
                format!("{esc} = EXCLUDED.{esc}")
            })
            .collect();
        let conflict_clause = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };

        let mut affected = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut tuples = Vec::with_capacity(chunk.len());
            let mut next = 1;
            for _ in chunk {
                tuples.push(format!(
                    "({})",
                    Dialect::Postgres.placeholder_list(next, first.len())
                ));
                next += first.len();
            }
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES {} ON CONFLICT ({}) {conflict_clause}",
                self.escape_identifier(table),
                tuples.join(", "),
                self.escape_identifier(primary_key)
            );
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|r| r.values().iter().cloned())
                .collect();
            affected += self.execute(&sql, &params).await?;
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
            Dialect::Postgres.placeholder_list(1, keys.len())
        );
        self.execute(&sql, keys).await
    }
}

/// Convert one driver row, dispatching on the declared column type the way
/// the driver expects.
fn pg_row_to_sql_row(row: &tokio_postgres::Row) -> Result<SqlRow, SyncError> {
    let names: Arc<Vec<String>> = Arc::new(
        row.columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    );
    let mut values = Vec::with_capacity(row.columns().len());
    for index in 0..row.columns().len() {
        values.push(pg_value_to_sql(row, index)?);
    }
    Ok(SqlRow::new(names, values))
}

fn pg_value_to_sql(row: &tokio_postgres::Row, index: usize) -> Result<SqlValue, SyncError> {
    let column = &row.columns()[index];
    let ty = column.type_();

    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)?.map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)?.map(|i| SqlValue::Int(i as i64))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)?.map(|i| SqlValue::Int(i as i64))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)?.map(SqlValue::Int)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(index)?.map(|i| SqlValue::UInt(i as u64))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)?.map(|f| SqlValue::Float(f as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)?.map(SqlValue::Float)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(index)?.map(SqlValue::Decimal)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(index)?.map(SqlValue::Text)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|n| SqlValue::DateTime(DateTime::from_naive_utc_and_offset(n, Utc)))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(index)?.map(SqlValue::DateTime)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(index)?.map(SqlValue::Date)
    } else if *ty == Type::TIME {
        row.try_get::<_, Option<NaiveTime>>(index)?.map(SqlValue::Time)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(index)?.map(SqlValue::Json)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(index)?.map(SqlValue::Uuid)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(index)?.map(SqlValue::Bytes)
    } else {
        // Unknown types go through their text form when the driver allows it.
        match row.try_get::<_, Option<String>>(index) {
            Ok(v) => v.map(SqlValue::Text),
            Err(_) => {
                return Err(SyncError::QueryFailed(format!(
                    "unsupported PostgreSQL type {ty:?} in column '{}'",
                    column.name()
                )))
            }
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

// Parameter binding: one implementation that coerces to the server-declared
// parameter type, so rows read from the other engine bind cleanly.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => {
                if *ty == Type::INT2 {
                    (*i as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*i as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from(*i).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    i.to_string().to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            SqlValue::UInt(u) => {
                if *ty == Type::OID {
                    u32::try_from(*u)?.to_sql(ty, out)
                } else {
                    SqlValue::Int(i64::try_from(*u)?).to_sql(ty, out)
                }
            }
            SqlValue::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::try_from(*f)?.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            SqlValue::Decimal(d) => {
                if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
                    use rust_decimal::prelude::ToPrimitive;
                    let f = d
                        .to_f64()
                        .ok_or_else(|| format!("decimal {d} does not fit a float"))?;
                    SqlValue::Float(f).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    d.to_string().to_sql(ty, out)
                } else {
                    d.to_sql(ty, out)
                }
            }
            SqlValue::Text(s) => {
                if *ty == Type::TIMESTAMP {
                    parse_datetime_param(s)?.to_sql(ty, out)
                } else if *ty == Type::TIMESTAMPTZ {
                    let naive = parse_datetime_param(s)?;
                    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_sql(ty, out)
                } else if *ty == Type::DATE {
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from_str(s.trim())?.to_sql(ty, out)
                } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
                    SqlValue::Int(s.trim().parse::<i64>()?).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
                    SqlValue::Float(s.trim().parse::<f64>()?).to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    matches!(s.trim(), "1" | "t" | "true" | "TRUE").to_sql(ty, out)
                } else if *ty == Type::UUID {
                    uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out)
                } else if *ty == Type::JSON || *ty == Type::JSONB {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                } else {
                    s.to_sql(ty, out)
                }
            }
            SqlValue::Bytes(b) => b.to_sql(ty, out),
            SqlValue::Uuid(u) => {
                if *ty == Type::UUID {
                    u.to_sql(ty, out)
                } else {
                    u.to_string().to_sql(ty, out)
                }
            }
            SqlValue::DateTime(dt) => {
                if *ty == Type::TIMESTAMP {
                    dt.naive_utc().to_sql(ty, out)
                } else if *ty == Type::DATE {
                    dt.date_naive().to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string().to_sql(ty, out)
                } else {
                    dt.to_sql(ty, out)
                }
            }
            SqlValue::Date(d) => d.to_sql(ty, out),
            SqlValue::Time(t) => t.to_sql(ty, out),
            SqlValue::Json(j) => {
                if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    j.to_string().to_sql(ty, out)
                } else {
                    j.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

fn parse_datetime_param(s: &str) -> Result<NaiveDateTime, Box<dyn StdError + Sync + Send>> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| Box::new(e) as Box<dyn StdError + Sync + Send>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_create_lists_columns_in_order() {
        let adapter = PostgresAdapter::new(
            ConnectionSpec {
                engine: crate::config::EngineKind::Postgresql,
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                database: "app".to_string(),
            },
            RetryPolicy::default(),
        );

        let columns = vec![
            ColumnDescriptor::new("id", "integer").primary(),
            ColumnDescriptor::new("name", "character varying(64)").not_null(),
            ColumnDescriptor::new("note", "text").with_default("'n/a'::text"),
        ];
        let ddl = adapter.synthesize_create("users", &columns, &["id".to_string()]);

        assert!(ddl.starts_with("CREATE TABLE \"users\" (\n"));
        assert!(ddl.contains("\"id\" integer NOT NULL"));
        assert!(ddl.contains("\"name\" character varying(64) NOT NULL"));
        assert!(ddl.contains("\"note\" text DEFAULT 'n/a'::text"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
        let id_pos = ddl.find("\"id\"").unwrap();
        let name_pos = ddl.find("\"name\"").unwrap();
        assert!(id_pos < name_pos);
    }
}

//! Test support shared by the unit and integration suites.

pub mod memory;

pub use memory::MemoryAdapter;

use std::sync::Arc;

use crate::adapter::{SqlRow, SqlValue};
use crate::schema::descriptor::{ColumnDescriptor, TableDescriptor};

/// `users(id PK, name)` with the given `(id, name)` rows.
pub fn users_table(rows: &[(i64, &str)]) -> (TableDescriptor, Vec<SqlRow>) {
    let mut table = TableDescriptor::new("users");
    table.columns.push(ColumnDescriptor::new("id", "int").primary());
    table
        .columns
        .push(ColumnDescriptor::new("name", "varchar(64)").not_null());
    table.create_statement =
        "CREATE TABLE `users` (`id` int NOT NULL, `name` varchar(64) NOT NULL, PRIMARY KEY (`id`))"
            .to_string();

    let rows = rows.iter().map(|(id, name)| user_row(*id, name)).collect();
    (table, rows)
}

pub fn user_row(id: i64, name: &str) -> SqlRow {
    SqlRow::from_pairs(vec![
        ("id", SqlValue::Int(id)),
        ("name", SqlValue::Text(name.to_string())),
    ])
}

/// `orders(id PK, total, updated_at)` with `(id, total, updated_at)` rows.
pub fn orders_table(
    rows: &[(i64, f64, chrono::DateTime<chrono::Utc>)],
) -> (TableDescriptor, Vec<SqlRow>) {
    let mut table = TableDescriptor::new("orders");
    table.columns.push(ColumnDescriptor::new("id", "int").primary());
    table.columns.push(ColumnDescriptor::new("total", "double"));
    table
        .columns
        .push(ColumnDescriptor::new("updated_at", "timestamp"));

    let rows = rows
        .iter()
        .map(|(id, total, updated_at)| order_row(*id, *total, *updated_at))
        .collect();
    (table, rows)
}

pub fn order_row(id: i64, total: f64, updated_at: chrono::DateTime<chrono::Utc>) -> SqlRow {
    SqlRow::from_pairs(vec![
        ("id", SqlValue::Int(id)),
        ("total", SqlValue::Float(total)),
        ("updated_at", SqlValue::DateTime(updated_at)),
    ])
}

/// `products(sku, label)` without a primary key.
pub fn products_table(rows: &[(&str, &str)]) -> (TableDescriptor, Vec<SqlRow>) {
    let mut table = TableDescriptor::new("products");
    table
        .columns
        .push(ColumnDescriptor::new("sku", "varchar(32)"));
    table
        .columns
        .push(ColumnDescriptor::new("label", "varchar(64)"));

    let rows = rows
        .iter()
        .map(|(sku, label)| {
            SqlRow::from_pairs(vec![
                ("sku", SqlValue::Text(sku.to_string())),
                ("label", SqlValue::Text(label.to_string())),
            ])
        })
        .collect();
    (table, rows)
}

/// A connected in-memory adapter pair sharing no state.
pub async fn memory_pair() -> (Arc<MemoryAdapter>, Arc<MemoryAdapter>) {
    use crate::adapter::{DatabaseAdapter, Dialect};
    let source = Arc::new(MemoryAdapter::new(Dialect::MySql));
    let target = Arc::new(MemoryAdapter::new(Dialect::MySql));
    source.connect().await.expect("memory connect");
    target.connect().await.expect("memory connect");
    (source, target)
}

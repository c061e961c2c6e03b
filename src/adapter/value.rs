//! Engine-neutral value and row representation.
//!
//! Rows read from one engine are shuttled to the other as [`SqlRow`]s of
//! [`SqlValue`]s; the dialect adapters own the conversion to and from their
//! driver's native types.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single column value, independent of engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(serde_json::Value),
}

// Primary-key values are hashed into key sets for reconciliation. Floats are
// hashed by bit pattern; NaN keys cannot occur because the engine requires
// NOT NULL primary keys with a total order.
impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SqlValue::Null => {}
            SqlValue::Bool(b) => b.hash(state),
            SqlValue::Int(i) => i.hash(state),
            SqlValue::UInt(u) => u.hash(state),
            SqlValue::Float(f) => f.to_bits().hash(state),
            SqlValue::Decimal(d) => d.hash(state),
            SqlValue::Text(s) => s.hash(state),
            SqlValue::Bytes(b) => b.hash(state),
            SqlValue::Uuid(u) => u.hash(state),
            SqlValue::DateTime(dt) => dt.hash(state),
            SqlValue::Date(d) => d.hash(state),
            SqlValue::Time(t) => t.hash(state),
            SqlValue::Json(v) => v.to_string().hash(state),
        }
    }
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Ordering between values of the same shape; used by the in-memory
    /// adapter for witness-window comparisons.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Int(a), SqlValue::Int(b)) => Some(a.cmp(b)),
            (SqlValue::UInt(a), SqlValue::UInt(b)) => Some(a.cmp(b)),
            (SqlValue::Int(a), SqlValue::UInt(b)) => {
                if *a < 0 {
                    Some(Ordering::Less)
                } else {
                    Some((*a as u64).cmp(b))
                }
            }
            (SqlValue::UInt(_), SqlValue::Int(_)) => other.compare(self).map(Ordering::reverse),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.partial_cmp(b),
            (SqlValue::Decimal(a), SqlValue::Decimal(b)) => Some(a.cmp(b)),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => Some(a.cmp(b)),
            (SqlValue::Date(a), SqlValue::Date(b)) => Some(a.cmp(b)),
            (SqlValue::Time(a), SqlValue::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::UInt(u) => write!(f, "{u}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Decimal(d) => write!(f, "{d}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Uuid(u) => write!(f, "{u}"),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
            SqlValue::Date(d) => write!(f, "{d}"),
            SqlValue::Time(t) => write!(f, "{t}"),
            SqlValue::Json(v) => write!(f, "{v}"),
        }
    }
}

/// One result row: column names in server order plus the matching values.
///
/// The column vector is shared across all rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        SqlRow { columns, values }
    }

    /// Build a row from `(column, value)` pairs; convenient in tests.
    pub fn from_pairs(pairs: Vec<(&str, SqlValue)>) -> Self {
        let (columns, values): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .map(|(c, v)| (c.to_string(), v))
            .unzip();
        SqlRow {
            columns: Arc::new(columns),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn shared_columns(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_sets_distinguish_values() {
        let mut set = HashSet::new();
        set.insert(SqlValue::Int(1));
        set.insert(SqlValue::Int(2));
        set.insert(SqlValue::Text("1".to_string()));

        assert!(set.contains(&SqlValue::Int(1)));
        assert!(!set.contains(&SqlValue::Int(3)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn datetime_ordering() {
        let early = SqlValue::DateTime("2024-01-01T00:00:00Z".parse().unwrap());
        let late = SqlValue::DateTime("2024-06-01T00:00:00Z".parse().unwrap());
        assert_eq!(early.compare(&late), Some(Ordering::Less));
    }

    #[test]
    fn row_lookup_by_column() {
        let row = SqlRow::from_pairs(vec![
            ("id", SqlValue::Int(7)),
            ("name", SqlValue::Text("a".to_string())),
        ]);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(7)));
        assert_eq!(row.get("missing"), None);
    }
}

//! Table, column, index, and routine descriptors.
//!
//! Descriptors are the engine-neutral snapshot of a schema object. The
//! canonical CREATE statement carried by tables and routines is the identity
//! used for diffing: byte-equal CREATE text means "same object".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column names that mark a row as updated when they advance.
pub const WITNESS_COLUMN_NAMES: [&str; 4] =
    ["updated_at", "modified_at", "timestamp", "last_modified"];

/// One column, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Engine type string, e.g. `varchar(255)` or `timestamp with time zone`.
    pub type_name: String,
    pub nullable: bool,
    pub default: Option<String>,
    /// Engine extra clause, e.g. `auto_increment`.
    pub extra: String,
    pub primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ColumnDescriptor {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
            default: None,
            extra: String::new(),
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// A secondary index or the primary key, with its ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    /// Engine index type, e.g. `BTREE`.
    pub index_type: String,
}

/// Snapshot of one base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    /// Canonical CREATE statement: engine-native for MySQL, synthesized for
    /// PostgreSQL.
    pub create_statement: String,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        TableDescriptor {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            create_statement: String::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First primary-key column, if any.
    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    /// The change-witness column: the first column whose lowercased name is
    /// one of [`WITNESS_COLUMN_NAMES`], or whose type string contains
    /// `timestamp` (case-insensitive).
    pub fn witness_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| {
                let lower = c.name.to_lowercase();
                WITNESS_COLUMN_NAMES.contains(&lower.as_str())
                    || c.type_name.to_lowercase().contains("timestamp")
            })
            .map(|c| c.name.as_str())
    }
}

/// Kind of procedural object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutineKind {
    Procedure,
    Function,
    Trigger,
}

impl RoutineKind {
    /// SQL keyword for CREATE/DROP statements.
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Trigger => "TRIGGER",
        }
    }
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineKind::Procedure => write!(f, "procedure"),
            RoutineKind::Function => write!(f, "function"),
            RoutineKind::Trigger => write!(f, "trigger"),
        }
    }
}

/// Snapshot of one stored procedure, function, or trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDescriptor {
    pub name: String,
    pub kind: RoutineKind,
    /// Engine-native CREATE text; empty when the engine would not hand it
    /// over (the routine is then never dropped or recreated).
    pub create_statement: String,
    /// For triggers: the table the trigger is attached to.
    pub on_table: Option<String>,
}

impl RoutineDescriptor {
    pub fn new(name: impl Into<String>, kind: RoutineKind, create: impl Into<String>) -> Self {
        RoutineDescriptor {
            name: name.into(),
            kind,
            create_statement: create.into(),
            on_table: None,
        }
    }

    /// CREATE text with runs of whitespace collapsed. Applied symmetrically
    /// on both sides before comparison, so byte-equal texts still compare
    /// equal while engine-version reformatting is tolerated.
    pub fn normalized_create(&self) -> String {
        self.create_statement.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn same_definition(&self, other: &RoutineDescriptor) -> bool {
        self.normalized_create() == other.normalized_create()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_by_name() {
        let mut table = TableDescriptor::new("orders");
        table.columns.push(ColumnDescriptor::new("id", "int").primary());
        table.columns.push(ColumnDescriptor::new("total", "decimal(10,2)"));
        table.columns.push(ColumnDescriptor::new("Updated_At", "datetime"));
        assert_eq!(table.witness_column(), Some("Updated_At"));
    }

    #[test]
    fn witness_by_type() {
        let mut table = TableDescriptor::new("events");
        table.columns.push(ColumnDescriptor::new("id", "int").primary());
        table.columns.push(ColumnDescriptor::new("seen", "TIMESTAMP(6)"));
        assert_eq!(table.witness_column(), Some("seen"));
    }

    #[test]
    fn no_witness() {
        let mut table = TableDescriptor::new("tags");
        table.columns.push(ColumnDescriptor::new("id", "int").primary());
        table.columns.push(ColumnDescriptor::new("label", "varchar(64)"));
        assert_eq!(table.witness_column(), None);
    }

    #[test]
    fn routine_comparison_ignores_whitespace_runs() {
        let a = RoutineDescriptor::new(
            "audit",
            RoutineKind::Procedure,
            "CREATE PROCEDURE audit()\nBEGIN\n  SELECT 1;\nEND",
        );
        let b = RoutineDescriptor::new(
            "audit",
            RoutineKind::Procedure,
            "CREATE PROCEDURE audit() BEGIN SELECT 1; END",
        );
        assert!(a.same_definition(&b));

        let c = RoutineDescriptor::new(
            "audit",
            RoutineKind::Procedure,
            "CREATE PROCEDURE audit() BEGIN SELECT 2; END",
        );
        assert!(!a.same_definition(&c));
    }

    #[test]
    fn primary_key_is_first_pk_column() {
        let mut table = TableDescriptor::new("t");
        table.columns.push(ColumnDescriptor::new("a", "int"));
        table.columns.push(ColumnDescriptor::new("b", "int").primary());
        assert_eq!(table.primary_key(), Some("b"));
    }
}

//! Dialect-aware DDL fragments for schema reconciliation.
//!
//! The differ decides *what* changed; these builders decide how the change
//! is spelled for the target engine. Identifiers are always escaped through
//! the dialect, never interpolated raw.

use crate::adapter::Dialect;
use crate::schema::descriptor::{ColumnDescriptor, IndexDescriptor};

/// `name type [NOT NULL] [DEFAULT ..] [extra]` for a column descriptor.
pub fn column_definition(dialect: Dialect, column: &ColumnDescriptor) -> String {
    let mut definition = format!(
        "{} {}",
        dialect.escape_identifier(&column.name),
        column.type_name
    );
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        definition.push_str(&format!(" DEFAULT {}", default_literal(default)));
    }
    if !column.extra.is_empty() && dialect == Dialect::MySql {
        definition.push(' ');
        definition.push_str(&column.extra);
    }
    definition
}

pub fn add_column(dialect: Dialect, table: &str, column: &ColumnDescriptor) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.escape_identifier(table),
        column_definition(dialect, column)
    )
}

/// Statements bringing an existing column in line with the source
/// descriptor. MySQL redefines the column in one MODIFY; PostgreSQL needs
/// one ALTER COLUMN clause per property.
pub fn modify_column(dialect: Dialect, table: &str, column: &ColumnDescriptor) -> Vec<String> {
    let table_esc = dialect.escape_identifier(table);
    match dialect {
        Dialect::MySql => vec![format!(
            "ALTER TABLE {table_esc} MODIFY COLUMN {}",
            column_definition(dialect, column)
        )],
        Dialect::Postgres => {
            let column_esc = dialect.escape_identifier(&column.name);
            let mut statements = vec![format!(
                "ALTER TABLE {table_esc} ALTER COLUMN {column_esc} TYPE {} USING {column_esc}::{}",
                column.type_name, column.type_name
            )];
            if column.nullable {
                statements.push(format!(
                    "ALTER TABLE {table_esc} ALTER COLUMN {column_esc} DROP NOT NULL"
                ));
            } else {
                statements.push(format!(
                    "ALTER TABLE {table_esc} ALTER COLUMN {column_esc} SET NOT NULL"
                ));
            }
            match &column.default {
                Some(default) => statements.push(format!(
                    "ALTER TABLE {table_esc} ALTER COLUMN {column_esc} SET DEFAULT {}",
                    default_literal(default)
                )),
                None => statements.push(format!(
                    "ALTER TABLE {table_esc} ALTER COLUMN {column_esc} DROP DEFAULT"
                )),
            }
            statements
        }
    }
}

pub fn drop_column(dialect: Dialect, table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        dialect.escape_identifier(table),
        dialect.escape_identifier(column)
    )
}

pub fn create_index(dialect: Dialect, table: &str, index: &IndexDescriptor) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let columns = index
        .columns
        .iter()
        .map(|c| dialect.escape_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {unique}INDEX {} ON {} ({columns})",
        dialect.escape_identifier(&index.name),
        dialect.escape_identifier(table)
    )
}

pub fn drop_index(dialect: Dialect, table: &str, index: &str) -> String {
    match dialect {
        Dialect::MySql => format!(
            "DROP INDEX {} ON {}",
            dialect.escape_identifier(index),
            dialect.escape_identifier(table)
        ),
        Dialect::Postgres => format!("DROP INDEX {}", dialect.escape_identifier(index)),
    }
}

/// Quote an introspected default unless it is already an expression the
/// engine will evaluate (numbers, NULL, CURRENT_TIMESTAMP, casts, calls).
fn default_literal(default: &str) -> String {
    let trimmed = default.trim();
    let upper = trimmed.to_uppercase();
    let expression = trimmed.parse::<f64>().is_ok()
        || upper == "NULL"
        || upper.starts_with("CURRENT_TIMESTAMP")
        || upper.starts_with("CURRENT_DATE")
        || upper.starts_with("NOW()")
        || trimmed.contains('(')
        || trimmed.contains("::")
        || trimmed.starts_with('\'');
    if expression {
        trimmed.to_string()
    } else {
        format!("'{}'", trimmed.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> ColumnDescriptor {
        ColumnDescriptor::new("phone", "VARCHAR(20)")
    }

    #[test]
    fn add_column_both_dialects() {
        assert_eq!(
            add_column(Dialect::MySql, "users", &phone()),
            "ALTER TABLE `users` ADD COLUMN `phone` VARCHAR(20)"
        );
        assert_eq!(
            add_column(Dialect::Postgres, "users", &phone()),
            "ALTER TABLE \"users\" ADD COLUMN \"phone\" VARCHAR(20)"
        );
    }

    #[test]
    fn mysql_modify_is_single_statement() {
        let column = ColumnDescriptor::new("total", "decimal(10,2)")
            .not_null()
            .with_default("0");
        let statements = modify_column(Dialect::MySql, "orders", &column);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `orders` MODIFY COLUMN `total` decimal(10,2) NOT NULL DEFAULT 0"]
        );
    }

    #[test]
    fn postgres_modify_splits_per_property() {
        let column = ColumnDescriptor::new("total", "numeric(10,2)").not_null();
        let statements = modify_column(Dialect::Postgres, "orders", &column);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("TYPE numeric(10,2)"));
        assert!(statements[1].contains("SET NOT NULL"));
        assert!(statements[2].contains("DROP DEFAULT"));
    }

    #[test]
    fn string_defaults_are_quoted() {
        let column = ColumnDescriptor::new("status", "varchar(16)").with_default("new");
        let sql = add_column(Dialect::MySql, "orders", &column);
        assert!(sql.ends_with("DEFAULT 'new'"));

        let column = ColumnDescriptor::new("created", "timestamp").with_default("CURRENT_TIMESTAMP");
        let sql = add_column(Dialect::MySql, "orders", &column);
        assert!(sql.ends_with("DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn composite_unique_index() {
        let index = IndexDescriptor {
            name: "by_name_email".to_string(),
            unique: true,
            columns: vec!["name".to_string(), "email".to_string()],
            index_type: "BTREE".to_string(),
        };
        assert_eq!(
            create_index(Dialect::MySql, "users", &index),
            "CREATE UNIQUE INDEX `by_name_email` ON `users` (`name`, `email`)"
        );
    }
}

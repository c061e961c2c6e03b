//! Schema comparison and reconciliation.
//!
//! Source and target table lists are compared by name. Missing tables are
//! created from the source's canonical CREATE statement; for tables present
//! on both sides, the column lists and index sets are compared deeply and
//! reconciled with idempotent ALTERs. Planning is pure; only `apply` touches
//! the target.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::adapter::{DatabaseAdapter, Dialect};
use crate::config::PairSpec;
use crate::error::SyncError;
use crate::schema::ddl;
use crate::schema::descriptor::TableDescriptor;

/// Outcome of one schema tick.
#[derive(Debug, Default)]
pub struct SchemaTickReport {
    pub tables_checked: usize,
    pub tables_created: usize,
    pub tables_altered: usize,
    pub errors: Vec<String>,
}

impl SchemaTickReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn mutated(&self) -> bool {
        self.tables_created > 0 || self.tables_altered > 0
    }
}

pub struct SchemaDiffer {
    source: Arc<dyn DatabaseAdapter>,
    target: Arc<dyn DatabaseAdapter>,
}

impl SchemaDiffer {
    pub fn new(source: Arc<dyn DatabaseAdapter>, target: Arc<dyn DatabaseAdapter>) -> Self {
        SchemaDiffer { source, target }
    }

    /// One schema tick over the pair's selected tables. Table-level errors
    /// are collected; the tick continues with the next table.
    pub async fn sync(&self, pair: &PairSpec) -> SchemaTickReport {
        let mut report = SchemaTickReport::default();

        let source_tables = match self.source.get_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                report.errors.push(format!("listing source tables: {e}"));
                return report;
            }
        };
        let target_tables = match self.target.get_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                report.errors.push(format!("listing target tables: {e}"));
                return report;
            }
        };
        let target_by_name: HashMap<&str, &TableDescriptor> =
            target_tables.iter().map(|t| (t.name.as_str(), t)).collect();

        for table in source_tables.iter().filter(|t| pair.selects_table(&t.name)) {
            report.tables_checked += 1;
            let result = match target_by_name.get(table.name.as_str()) {
                None => {
                    info!("Creating missing table on target: {}", table.name);
                    match self.target.create_table(&table.create_statement).await {
                        Ok(()) => {
                            report.tables_created += 1;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                Some(existing) => {
                    if table.columns != existing.columns || table.indexes != existing.indexes {
                        match self.update_table_structure(table, existing).await {
                            Ok(applied) => {
                                if applied {
                                    report.tables_altered += 1;
                                }
                                Ok(())
                            }
                            Err(e) => Err(e),
                        }
                    } else {
                        Ok(())
                    }
                }
            };
            if let Err(e) = result {
                error!("Schema sync failed for table {}: {e}", table.name);
                report.errors.push(format!("table {}: {e}", table.name));
            }
        }
        report
    }

    /// Walk the source columns against the target's and issue the ALTERs
    /// that close the gap, then reconcile secondary indexes on MySQL-style
    /// targets. Returns whether any statement was applied.
    async fn update_table_structure(
        &self,
        source: &TableDescriptor,
        target: &TableDescriptor,
    ) -> Result<bool, SyncError> {
        let dialect = self.target.dialect();

        let mut statements = plan_column_changes(dialect, source, target);
        if dialect == Dialect::MySql {
            statements.extend(plan_index_changes(dialect, source, target));
        }
        if statements.is_empty() {
            return Ok(false);
        }

        for statement in &statements {
            debug!("Applying to {}: {statement}", source.name);
            self.target.alter_table(statement).await.map_err(|e| match e {
                SyncError::QueryFailed(msg) => SyncError::SchemaIncompatible(msg),
                other => other,
            })?;
        }

        info!("Updated structure of table: {}", source.name);
        Ok(true)
    }
}

/// Column walk: source-only columns are added, both-sides columns with any
/// differing property are redefined, target-only columns are dropped.
pub fn plan_column_changes(
    dialect: Dialect,
    source: &TableDescriptor,
    target: &TableDescriptor,
) -> Vec<String> {
    let mut statements = Vec::new();

    for column in &source.columns {
        match target.column(&column.name) {
            None => statements.push(ddl::add_column(dialect, &source.name, column)),
            Some(existing) if existing != column => {
                statements.extend(ddl::modify_column(dialect, &source.name, column));
            }
            Some(_) => {}
        }
    }

    for column in &target.columns {
        if source.column(&column.name).is_none() {
            statements.push(ddl::drop_column(dialect, &source.name, &column.name));
        }
    }

    statements
}

/// Index reconciliation: group both sides by name, drop non-PRIMARY names
/// that vanished from the source, create non-PRIMARY names the target lacks.
pub fn plan_index_changes(
    dialect: Dialect,
    source: &TableDescriptor,
    target: &TableDescriptor,
) -> Vec<String> {
    let mut statements = Vec::new();

    for index in &target.indexes {
        if index.name != "PRIMARY" && !source.indexes.iter().any(|i| i.name == index.name) {
            statements.push(ddl::drop_index(dialect, &source.name, &index.name));
        }
    }

    for index in &source.indexes {
        if index.name != "PRIMARY" && !target.indexes.iter().any(|i| i.name == index.name) {
            statements.push(ddl::create_index(dialect, &source.name, index));
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::{ColumnDescriptor, IndexDescriptor};

    fn users(with_phone: bool) -> TableDescriptor {
        let mut table = TableDescriptor::new("users");
        table.columns.push(ColumnDescriptor::new("id", "int").primary());
        table.columns.push(ColumnDescriptor::new("name", "varchar(64)").not_null());
        if with_phone {
            table.columns.push(ColumnDescriptor::new("phone", "VARCHAR(20)"));
        }
        table
    }

    #[test]
    fn source_only_column_is_added() {
        let statements = plan_column_changes(Dialect::MySql, &users(true), &users(false));
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` ADD COLUMN `phone` VARCHAR(20)"]
        );
    }

    #[test]
    fn target_only_column_is_dropped() {
        let statements = plan_column_changes(Dialect::MySql, &users(false), &users(true));
        assert_eq!(statements, vec!["ALTER TABLE `users` DROP COLUMN `phone`"]);
    }

    #[test]
    fn changed_property_redefines_column() {
        let source = users(false);
        let mut target = users(false);
        target.columns[1].nullable = true;

        let statements = plan_column_changes(Dialect::MySql, &source, &target);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` MODIFY COLUMN `name` varchar(64) NOT NULL"]
        );
    }

    #[test]
    fn identical_tables_need_nothing() {
        assert!(plan_column_changes(Dialect::MySql, &users(true), &users(true)).is_empty());
    }

    #[test]
    fn index_walk_skips_primary() {
        let primary = IndexDescriptor {
            name: "PRIMARY".to_string(),
            unique: true,
            columns: vec!["id".to_string()],
            index_type: "BTREE".to_string(),
        };
        let by_name = IndexDescriptor {
            name: "by_name".to_string(),
            unique: false,
            columns: vec!["name".to_string()],
            index_type: "BTREE".to_string(),
        };

        let mut source = users(false);
        source.indexes = vec![primary.clone(), by_name.clone()];
        let mut target = users(false);
        target.indexes = vec![primary];

        let statements = plan_index_changes(Dialect::MySql, &source, &target);
        assert_eq!(
            statements,
            vec!["CREATE INDEX `by_name` ON `users` (`name`)"]
        );

        // And the reverse drops it, leaving PRIMARY alone.
        let statements = plan_index_changes(Dialect::MySql, &target, &source);
        assert_eq!(statements, vec!["DROP INDEX `by_name` ON `users`"]);
    }
}

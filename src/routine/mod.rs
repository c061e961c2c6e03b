//! Procedure, function, and trigger synchronization.
//!
//! Per kind: every source routine absent from the target is created; a
//! routine present on both sides whose CREATE text differs (after symmetric
//! whitespace normalization) is dropped and recreated. Routines that exist
//! only on the target are left in place.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::adapter::DatabaseAdapter;
use crate::error::SyncError;
use crate::schema::descriptor::{RoutineDescriptor, RoutineKind};

/// Outcome of one routine pass.
#[derive(Debug, Default)]
pub struct RoutineReport {
    pub created: u64,
    pub updated: u64,
    pub errors: Vec<String>,
}

impl RoutineReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn mutated(&self) -> bool {
        self.created > 0 || self.updated > 0
    }

    fn merge(&mut self, other: RoutineReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }
}

pub struct RoutineSyncer {
    source: Arc<dyn DatabaseAdapter>,
    target: Arc<dyn DatabaseAdapter>,
}

impl RoutineSyncer {
    pub fn new(source: Arc<dyn DatabaseAdapter>, target: Arc<dyn DatabaseAdapter>) -> Self {
        RoutineSyncer { source, target }
    }

    /// Sync stored procedures and functions.
    pub async fn sync_routines(&self) -> RoutineReport {
        let mut report = RoutineReport::default();
        report.merge(self.sync_kind(RoutineKind::Procedure).await);
        report.merge(self.sync_kind(RoutineKind::Function).await);
        report
    }

    /// Sync triggers; same algorithm under its own toggle.
    pub async fn sync_triggers(&self) -> RoutineReport {
        self.sync_kind(RoutineKind::Trigger).await
    }

    async fn sync_kind(&self, kind: RoutineKind) -> RoutineReport {
        let mut report = RoutineReport::default();

        let source_routines = match self.load(&self.source, kind).await {
            Ok(routines) => routines,
            Err(e) => {
                report.errors.push(format!("listing source {kind}s: {e}"));
                return report;
            }
        };
        let target_routines = match self.load(&self.target, kind).await {
            Ok(routines) => routines,
            Err(e) => {
                report.errors.push(format!("listing target {kind}s: {e}"));
                return report;
            }
        };
        let target_by_name: HashMap<&str, &RoutineDescriptor> = target_routines
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();

        for routine in &source_routines {
            if routine.create_statement.is_empty() {
                // The engine would not hand over the CREATE text; never
                // recreate from nothing.
                warn!("No CREATE text for {kind} {}; skipping", routine.name);
                continue;
            }
            let result = match target_by_name.get(routine.name.as_str()) {
                None => self.create(routine).await.map(|()| {
                    info!("Created {kind}: {}", routine.name);
                    report.created += 1;
                }),
                Some(existing) if !routine.same_definition(existing) => {
                    self.recreate(routine).await.map(|()| {
                        info!("Recreated {kind}: {}", routine.name);
                        report.updated += 1;
                    })
                }
                Some(_) => Ok(()),
            };
            if let Err(e) = result {
                error!("Routine sync failed for {kind} {}: {e}", routine.name);
                report.errors.push(format!("{kind} {}: {e}", routine.name));
            }
        }

        for routine in &target_routines {
            if !source_routines.iter().any(|r| r.name == routine.name) {
                debug!("Leaving target-only {kind} {} in place", routine.name);
            }
        }

        report
    }

    async fn load(
        &self,
        adapter: &Arc<dyn DatabaseAdapter>,
        kind: RoutineKind,
    ) -> Result<Vec<RoutineDescriptor>, SyncError> {
        match kind {
            RoutineKind::Trigger => adapter.get_triggers().await,
            other => adapter.get_routines(other).await,
        }
    }

    async fn create(&self, routine: &RoutineDescriptor) -> Result<(), SyncError> {
        self.target
            .execute(&routine.create_statement, &[])
            .await
            .map(|_| ())
    }

    async fn recreate(&self, routine: &RoutineDescriptor) -> Result<(), SyncError> {
        let drop_sql = match (routine.kind, &routine.on_table) {
            // PostgreSQL scopes triggers to their table.
            (RoutineKind::Trigger, Some(table)) if self.target.dialect() == crate::adapter::Dialect::Postgres => {
                format!(
                    "DROP TRIGGER IF EXISTS {} ON {}",
                    self.target.escape_identifier(&routine.name),
                    self.target.escape_identifier(table)
                )
            }
            _ => format!(
                "DROP {} IF EXISTS {}",
                routine.kind.keyword(),
                self.target.escape_identifier(&routine.name)
            ),
        };
        self.target.execute(&drop_sql, &[]).await?;
        self.create(routine).await
    }
}

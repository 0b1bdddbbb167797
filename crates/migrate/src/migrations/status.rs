//! Status reporting
//!
//! Read-only projection of the registry against the history store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::definitions::MigrationRecord;
use super::registry::MigrationRegistry;
use super::runner::MigrationManager;
use crate::error::MigrateResult;

/// Whether a registered migration has run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    Applied {
        applied_at: DateTime<Utc>,
        execution_time: Option<f64>,
    },
    Pending,
}

/// Status of one registered migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub state: MigrationState,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self.state, MigrationState::Applied { .. })
    }
}

/// Registered migrations with their state, plus history rows no unit claims
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub migrations: Vec<MigrationStatus>,
    /// Recorded versions that no registered migration declares
    pub orphaned: Vec<MigrationRecord>,
}

impl StatusReport {
    /// Combine the registry with the recorded history
    pub fn build(registry: &MigrationRegistry, history: Vec<MigrationRecord>) -> Self {
        let mut recorded: HashMap<String, MigrationRecord> = history
            .into_iter()
            .map(|record| (record.version.clone(), record))
            .collect();

        let migrations = registry
            .list_ordered()
            .iter()
            .map(|migration| {
                let state = match recorded.remove(migration.version()) {
                    Some(record) => MigrationState::Applied {
                        applied_at: record.applied_at,
                        execution_time: record.execution_time,
                    },
                    None => MigrationState::Pending,
                };
                MigrationStatus {
                    version: migration.version().to_string(),
                    name: migration.name().to_string(),
                    description: migration.description().to_string(),
                    state,
                }
            })
            .collect();

        let mut orphaned: Vec<MigrationRecord> = recorded.into_values().collect();
        orphaned.sort_by(|a, b| a.version.cmp(&b.version));

        Self { migrations, orphaned }
    }

    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.migrations.iter().filter(|m| !m.is_applied())
    }

    pub fn applied_count(&self) -> usize {
        self.migrations.iter().filter(|m| m.is_applied()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} applied, {} pending",
            self.applied_count(),
            self.pending_count()
        )?;

        for migration in &self.migrations {
            match &migration.state {
                MigrationState::Applied { applied_at, .. } => writeln!(
                    f,
                    "  [applied] {} {} - {} ({})",
                    migration.version,
                    migration.name,
                    migration.description,
                    applied_at.format("%Y-%m-%d %H:%M:%S UTC")
                )?,
                MigrationState::Pending => writeln!(
                    f,
                    "  [pending] {} {} - {}",
                    migration.version, migration.name, migration.description
                )?,
            }
        }

        if !self.orphaned.is_empty() {
            writeln!(f, "Recorded but not registered:")?;
            for record in &self.orphaned {
                writeln!(f, "  [orphan]  {} {}", record.version, record.name)?;
            }
        }

        Ok(())
    }
}

impl MigrationManager {
    /// Per-migration status; read-only and lock-free
    pub async fn status(&self) -> MigrateResult<StatusReport> {
        let history = self.get_migration_history().await?;
        Ok(StatusReport::build(&self.registry, history))
    }
}

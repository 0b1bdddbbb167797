//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the migration unit contract and the records and reports produced
//! by the manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::backends::DatabaseConnection;
use crate::error::{MigrateResult, MigrationError};

/// A versioned, self-contained schema change
///
/// Units are immutable once released. A change to a released unit must ship
/// as a new unit with a new version instead.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Fixed-width `YYYYMMDD_HHMMSS` version, the ordering key
    fn version(&self) -> &'static str;

    /// Identifying label stored in history; defaults to the type name
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Short human-readable summary
    fn description(&self) -> &'static str;

    /// Read-only probe: does the forward change still need to run?
    async fn check_can_apply(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(true)
    }

    /// Perform the forward change; must tolerate an already-upgraded schema
    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()>;

    /// Inverse change, unsupported unless overridden
    async fn downgrade(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        Err(MigrationError::DowngradeUnsupported {
            version: self.version().to_string(),
        })
    }
}

impl fmt::Display for dyn Migration + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}: {}", self.version(), self.name(), self.description())
    }
}

impl fmt::Debug for dyn Migration + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version())
            .field("name", &self.name())
            .finish()
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Row in the history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Surrogate key
    pub id: i64,
    /// Version of the applied unit
    pub version: String,
    /// Unit name at the time it was applied
    pub name: String,
    pub description: Option<String>,
    /// When the unit's transaction committed
    pub applied_at: DateTime<Utc>,
    /// Seconds spent in `upgrade`; zero when the schema already satisfied the unit
    pub execution_time: Option<f64>,
}

/// How a pending migration was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// `upgrade` ran and committed
    Upgraded,
    /// `check_can_apply` returned false; recorded without upgrading
    AlreadySatisfied,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::Upgraded => write!(f, "upgraded"),
            MigrationOutcome::AlreadySatisfied => write!(f, "already satisfied"),
        }
    }
}

/// One migration handled during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: String,
    pub name: String,
    pub description: String,
    pub outcome: MigrationOutcome,
    /// Seconds spent in `upgrade`
    pub execution_time: f64,
}

/// Result of running migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationRunReport {
    /// Migrations handled in this run, in apply order
    pub applied: Vec<AppliedMigration>,
    /// Number of versions skipped because history already had them
    pub skipped_count: usize,
    /// Total wall time of the run
    pub elapsed: Duration,
}

impl MigrationRunReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn upgraded_count(&self) -> usize {
        self.applied
            .iter()
            .filter(|m| m.outcome == MigrationOutcome::Upgraded)
            .count()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

impl fmt::Display for MigrationRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.applied.is_empty() {
            return write!(
                f,
                "Database is up to date ({} migrations already applied)",
                self.skipped_count
            );
        }

        writeln!(
            f,
            "Applied {} migration(s) in {:.3}s ({} already applied):",
            self.applied.len(),
            self.elapsed.as_secs_f64(),
            self.skipped_count
        )?;
        for migration in &self.applied {
            writeln!(
                f,
                "  {} {} - {} [{}, {:.3}s]",
                migration.version,
                migration.name,
                migration.description,
                migration.outcome,
                migration.execution_time
            )?;
        }
        Ok(())
    }
}

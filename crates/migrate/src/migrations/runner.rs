//! Migration Manager - Executes migrations against the database
//!
//! Bootstraps the history store, serializes runs with the run lock and
//! applies pending units in version order, each in its own transaction.

use std::sync::Arc;
use std::time::Instant;

use super::definitions::{AppliedMigration, Migration, MigrationOutcome, MigrationRecord, MigrationRunReport};
use super::history::{HistoryStore, DEFAULT_HISTORY_TABLE};
use super::lock::{LockConfig, RunLock};
use super::registry::MigrationRegistry;
use crate::backends::{DatabaseConnection, DatabasePool, DatabaseTransaction};
use crate::error::{MigrateResult, MigrationError};

/// Configuration for the migration manager
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Table name for tracking migrations
    pub history_table: String,
    /// Run lock settings
    pub lock: LockConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock: LockConfig::default(),
        }
    }
}

/// Orchestrates migration runs against one database
pub struct MigrationManager {
    pub(super) pool: Arc<dyn DatabasePool>,
    pub(super) registry: MigrationRegistry,
    pub(super) history: HistoryStore,
    pub(super) config: MigrationConfig,
}

impl MigrationManager {
    /// Create a manager; fails if the history table name is not a plain identifier
    pub fn new(pool: Arc<dyn DatabasePool>, registry: MigrationRegistry, config: MigrationConfig) -> MigrateResult<Self> {
        let history = HistoryStore::new(config.history_table.clone())?;
        Ok(Self {
            pool,
            registry,
            history,
            config,
        })
    }

    /// Get the database pool
    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    /// Get the migration registry
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Get the history store
    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Apply every pending migration in version order
    ///
    /// Stops at the first failure; migrations committed before it stay applied.
    pub async fn run_migrations(&self) -> MigrateResult<MigrationRunReport> {
        let started = Instant::now();
        tracing::info!(
            registered = self.registry.len(),
            dialect = %self.pool.dialect(),
            "Starting migration run"
        );

        let mut conn = self.pool.acquire().await?;
        self.history
            .ensure_bootstrap(&mut *conn)
            .await
            .map_err(MigrationError::bootstrap)?;

        let lock = RunLock::acquire(&mut *conn, &self.config.lock).await?;
        let result = self.apply_pending(&mut *conn).await;
        let mut report = release_after(lock, &mut *conn, result).await?;

        report.elapsed = started.elapsed();
        tracing::info!(
            applied = report.applied_count(),
            skipped = report.skipped_count,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Migration run complete"
        );
        Ok(report)
    }

    async fn apply_pending(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<MigrationRunReport> {
        let applied_versions = self.history.list_applied_versions(conn).await?;
        let mut report = MigrationRunReport::default();

        for migration in self.registry.list_ordered() {
            if applied_versions.contains(migration.version()) {
                tracing::debug!(version = migration.version(), "Already applied, skipping");
                report.skipped_count += 1;
                continue;
            }

            let applied = self.apply_one(migration.as_ref()).await.map_err(|err| {
                tracing::error!(
                    version = migration.version(),
                    name = migration.name(),
                    error = %err,
                    "Migration failed, aborting run"
                );
                err
            })?;
            report.applied.push(applied);
        }

        Ok(report)
    }

    async fn apply_one(&self, migration: &dyn Migration) -> MigrateResult<AppliedMigration> {
        let version = migration.version();
        let name = migration.name();
        let description = migration.description();
        tracing::info!(version, name, description, "Applying migration");

        let mut tx = self.pool.begin().await.map_err(|source| MigrationError::Apply {
            version: version.to_string(),
            description: description.to_string(),
            source: Box::new(source),
        })?;

        let checked = migration.check_can_apply(tx.as_connection()).await;
        let can_apply = match checked {
            Ok(can_apply) => can_apply,
            Err(source) => {
                rollback_quietly(tx, version).await;
                return Err(MigrationError::ApplicabilityCheck {
                    version: version.to_string(),
                    description: description.to_string(),
                    source: Box::new(source),
                });
            }
        };

        let (outcome, execution_time) = if can_apply {
            let upgrade_started = Instant::now();
            let upgraded = migration.upgrade(tx.as_connection()).await;
            if let Err(source) = upgraded {
                rollback_quietly(tx, version).await;
                return Err(MigrationError::Apply {
                    version: version.to_string(),
                    description: description.to_string(),
                    source: Box::new(source),
                });
            }
            (MigrationOutcome::Upgraded, upgrade_started.elapsed().as_secs_f64())
        } else {
            tracing::warn!(
                version,
                name,
                "Schema already satisfies migration, recording without upgrade"
            );
            (MigrationOutcome::AlreadySatisfied, 0.0)
        };

        let recorded = self
            .history
            .record(tx.as_connection(), version, name, description, execution_time)
            .await;
        if let Err(source) = recorded {
            rollback_quietly(tx, version).await;
            return Err(MigrationError::Record {
                version: version.to_string(),
                description: description.to_string(),
                source: Box::new(source),
            });
        }

        tx.commit().await.map_err(|source| MigrationError::Apply {
            version: version.to_string(),
            description: description.to_string(),
            source: Box::new(source),
        })?;

        tracing::info!(version, name, execution_time, %outcome, "Migration applied");
        Ok(AppliedMigration {
            version: version.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            outcome,
            execution_time,
        })
    }

    /// Applied migrations ordered by application time
    ///
    /// Never creates storage and never takes the run lock.
    pub async fn get_migration_history(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let mut conn = self.pool.acquire().await?;
        if !self.history.exists(&mut *conn).await? {
            return Ok(Vec::new());
        }
        self.history.list_history(&mut *conn).await
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Release the run lock, preferring the operation's error over a release error
pub(super) async fn release_after<T>(
    lock: RunLock,
    conn: &mut dyn DatabaseConnection,
    result: MigrateResult<T>,
) -> MigrateResult<T> {
    let released = lock.release(conn).await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::warn!(error = %release_err, "Failed to release migration lock");
            Err(err)
        }
    }
}

pub(super) async fn rollback_quietly(tx: Box<dyn DatabaseTransaction>, version: &str) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(version, error = %err, "Rollback failed");
    }
}

//! Migration Rollback - Manual downgrade of a single applied migration
//!
//! Never invoked by a startup run. On failure the transaction rolls back and
//! the history record stays, leaving the operator to investigate.

use super::definitions::{Migration, MigrationRecord};
use super::lock::RunLock;
use super::runner::{release_after, rollback_quietly, MigrationManager};
use crate::backends::DatabaseConnection;
use crate::error::{MigrateResult, MigrationError};

impl MigrationManager {
    /// Downgrade one applied migration and delete its history record
    ///
    /// Returns the deleted record.
    pub async fn downgrade(&self, version: &str) -> MigrateResult<MigrationRecord> {
        let migration = self
            .registry
            .get(version)
            .ok_or_else(|| MigrationError::UnknownVersion(version.to_string()))?;

        let mut conn = self.pool.acquire().await?;
        if !self.history.exists(&mut *conn).await? {
            return Err(MigrationError::NotApplied(version.to_string()));
        }

        let lock = RunLock::acquire(&mut *conn, &self.config.lock).await?;
        let result = self.downgrade_locked(&mut *conn, migration).await;
        release_after(lock, &mut *conn, result).await
    }

    async fn downgrade_locked(
        &self,
        conn: &mut dyn DatabaseConnection,
        migration: &dyn Migration,
    ) -> MigrateResult<MigrationRecord> {
        let version = migration.version();
        let record = self
            .history
            .find(conn, version)
            .await?
            .ok_or_else(|| MigrationError::NotApplied(version.to_string()))?;

        tracing::info!(version, name = migration.name(), "Downgrading migration");
        let failed = |source: MigrationError| MigrationError::Downgrade {
            version: version.to_string(),
            description: migration.description().to_string(),
            source: Box::new(source),
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;

        let downgraded = migration.downgrade(tx.as_connection()).await;
        if let Err(source) = downgraded {
            rollback_quietly(tx, version).await;
            tracing::error!(version, error = %source, "Downgrade failed, history record kept");
            return Err(failed(source));
        }

        let deleted = self.history.delete(tx.as_connection(), version).await;
        match deleted {
            Ok(true) => {}
            Ok(false) => {
                rollback_quietly(tx, version).await;
                return Err(MigrationError::NotApplied(version.to_string()));
            }
            Err(source) => {
                rollback_quietly(tx, version).await;
                return Err(failed(source));
            }
        }

        tx.commit().await.map_err(failed)?;
        tracing::info!(version, "Migration downgraded");
        Ok(record)
    }
}

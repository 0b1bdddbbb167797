//! History Store
//!
//! Durable record of applied migrations, one row per version. Rows are only
//! ever inserted by a run or deleted by a manual downgrade.

use chrono::Utc;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::definitions::MigrationRecord;
use crate::backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
use crate::error::{MigrateResult, MigrationError};
use crate::schema;

/// Default history table name
pub const DEFAULT_HISTORY_TABLE: &str = "migration_history";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid"))
}

/// Access to the history table
#[derive(Debug, Clone)]
pub struct HistoryStore {
    table: String,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }
}

impl HistoryStore {
    /// Create a store over the given table; the name is interpolated into SQL
    /// and must be a plain identifier
    pub fn new(table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        if !identifier_pattern().is_match(&table) {
            return Err(MigrationError::Configuration(format!(
                "Invalid history table name '{}': expected a plain SQL identifier",
                table
            )));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table_sql(&self, dialect: SqlDialect) -> String {
        match dialect {
            SqlDialect::PostgreSQL => format!(
                "CREATE TABLE IF NOT EXISTS {} (
    id SERIAL PRIMARY KEY,
    version VARCHAR(255) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    description TEXT,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    execution_time DOUBLE PRECISION CHECK (execution_time >= 0)
)",
                self.table
            ),
            SqlDialect::SQLite => format!(
                "CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    execution_time REAL CHECK (execution_time >= 0)
)",
                self.table
            ),
        }
    }

    /// Create the history table if absent; safe to call on every run
    pub async fn ensure_bootstrap(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        let sql = self.create_table_sql(conn.dialect());
        match conn.execute(&sql, &[]).await {
            Ok(_) => {
                tracing::debug!(table = %self.table, "Migration history table ready");
                Ok(())
            }
            // A concurrent process created the table between our check and create.
            Err(err) if err.is_unique_violation() => {
                tracing::debug!(table = %self.table, "Migration history table created concurrently");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Whether the history table exists
    pub async fn exists(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        schema::table_exists(conn, &self.table).await
    }

    /// All recorded versions
    pub async fn list_applied_versions(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<BTreeSet<String>> {
        let sql = format!("SELECT version FROM {}", self.table);
        let rows = conn.fetch_all(&sql, &[]).await?;
        rows.iter().map(|row| row.get_string("version")).collect()
    }

    /// Append one record; fails with `AlreadyRecorded` if the version exists
    pub async fn record(
        &self,
        conn: &mut dyn DatabaseConnection,
        version: &str,
        name: &str,
        description: &str,
        execution_time: f64,
    ) -> MigrateResult<()> {
        let sql = format!(
            "INSERT INTO {} (version, name, description, applied_at, execution_time) \
             VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        let params = [
            DatabaseValue::from(version),
            DatabaseValue::from(name),
            DatabaseValue::from(description),
            DatabaseValue::from(Utc::now()),
            DatabaseValue::from(execution_time.max(0.0)),
        ];

        conn.execute(&sql, &params).await.map(|_| ()).map_err(|err| match err {
            MigrationError::UniqueViolation(_) => MigrationError::AlreadyRecorded {
                version: version.to_string(),
            },
            other => other,
        })
    }

    /// Remove the record for a version; returns whether a row was deleted
    pub async fn delete(&self, conn: &mut dyn DatabaseConnection, version: &str) -> MigrateResult<bool> {
        let sql = format!("DELETE FROM {} WHERE version = $1", self.table);
        let affected = conn.execute(&sql, &[DatabaseValue::from(version)]).await?;
        Ok(affected > 0)
    }

    /// Fetch the record for a single version
    pub async fn find(&self, conn: &mut dyn DatabaseConnection, version: &str) -> MigrateResult<Option<MigrationRecord>> {
        let sql = format!(
            "SELECT id, version, name, description, applied_at, execution_time FROM {} WHERE version = $1",
            self.table
        );
        conn.fetch_optional(&sql, &[DatabaseValue::from(version)])
            .await?
            .map(|row| record_from_row(&row))
            .transpose()
    }

    /// All records ordered by application time
    pub async fn list_history(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, version, name, description, applied_at, execution_time FROM {} \
             ORDER BY applied_at ASC, id ASC",
            self.table
        );
        let rows = conn.fetch_all(&sql, &[]).await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &DatabaseRow) -> MigrateResult<MigrationRecord> {
    Ok(MigrationRecord {
        id: row.get_i64("id")?,
        version: row.get_string("version")?,
        name: row.get_string("name")?,
        description: row.get_optional_string("description")?,
        applied_at: row.get_datetime("applied_at")?,
        execution_time: row.get_optional_f64("execution_time")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(HistoryStore::new("migration_history").is_ok());
        assert!(HistoryStore::new("_schema_versions2").is_ok());
        assert!(HistoryStore::new("history; DROP TABLE users").is_err());
        assert!(HistoryStore::new("1history").is_err());
        assert!(HistoryStore::new("").is_err());
        assert!(HistoryStore::new("a".repeat(64)).is_err());
    }

    #[test]
    fn test_dialect_ddl() {
        let store = HistoryStore::default();
        assert_eq!(store.table(), DEFAULT_HISTORY_TABLE);

        let pg = store.create_table_sql(SqlDialect::PostgreSQL);
        assert!(pg.contains("SERIAL PRIMARY KEY"));
        assert!(pg.contains("TIMESTAMPTZ"));
        assert!(pg.contains("version VARCHAR(255) NOT NULL UNIQUE"));

        let sqlite = store.create_table_sql(SqlDialect::SQLite);
        assert!(sqlite.contains("AUTOINCREMENT"));
        assert!(sqlite.contains("REAL"));
        assert!(sqlite.starts_with("CREATE TABLE IF NOT EXISTS migration_history"));
    }

    #[test]
    fn test_record_from_row() {
        let row = DatabaseRow::new(
            ["id", "version", "name", "description", "applied_at", "execution_time"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            vec![
                DatabaseValue::Int64(1),
                DatabaseValue::from("20241201_000001"),
                DatabaseValue::from("InitialMigration"),
                DatabaseValue::Null,
                DatabaseValue::from("2024-12-01T10:30:00.000001+00:00"),
                DatabaseValue::Float64(0.25),
            ],
        );

        let record = record_from_row(&row).unwrap();
        assert_eq!(record.version, "20241201_000001");
        assert_eq!(record.description, None);
        assert_eq!(record.execution_time, Some(0.25));
    }
}

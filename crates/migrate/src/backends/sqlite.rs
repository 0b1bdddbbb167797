//! SQLite Backend Implementation
//!
//! Used for local development and for exercising the runner without a
//! PostgreSQL server. SQLite DDL is transactional, so the per-migration
//! atomicity guarantees hold here as well.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;

use super::core::*;
use crate::error::{MigrateResult, MigrationError};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite connection pool implementation
pub struct SqliteBackendPool {
    pool: SqlitePool,
}

impl SqliteBackendPool {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect a new pool, creating the database file if it is missing
    pub async fn connect(database_url: &str, config: &PoolConfig) -> MigrateResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| MigrationError::Configuration(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to create SQLite pool: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Get the underlying sqlx pool
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for SqliteBackendPool {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to acquire connection: {}", e)))?;

        Ok(Box::new(SqliteBackendConnection { conn }))
    }

    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(SqliteBackendTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite connection implementation
pub struct SqliteBackendConnection {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl DatabaseConnection for SqliteBackendConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let result = bind_all(sqlx::query(sql), params).execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()> {
        Executor::execute(&mut *self.conn, sql).await?;
        Ok(())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>> {
        let rows = bind_all(sqlx::query(sql), params).fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// SQLite transaction implementation
pub struct SqliteBackendTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl DatabaseConnection for SqliteBackendTransaction {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let result = bind_all(sqlx::query(sql), params).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()> {
        Executor::execute(&mut *self.tx, sql).await?;
        Ok(())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>> {
        let rows = bind_all(sqlx::query(sql), params).fetch_all(&mut *self.tx).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl DatabaseTransaction for SqliteBackendTransaction {
    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    fn as_connection(&mut self) -> &mut dyn DatabaseConnection {
        self
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [DatabaseValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(None::<String>),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::Float64(f) => query.bind(*f),
            DatabaseValue::String(s) => query.bind(s.as_str()),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> MigrateResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|index| decode_column(row, index))
        .collect::<MigrateResult<Vec<_>>>()?;
    Ok(DatabaseRow::new(columns, values))
}

// Decodes by the storage class of the stored value, not the declared column type.
fn decode_column(row: &SqliteRow, index: usize) -> MigrateResult<DatabaseValue> {
    let storage = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => DatabaseValue::Float64(row.try_get_unchecked::<f64, _>(index)?),
        "TEXT" | "DATETIME" | "DATE" | "TIME" => {
            DatabaseValue::String(row.try_get_unchecked::<String, _>(index)?)
        }
        other => {
            return Err(MigrationError::decode(format!(
                "Unsupported SQLite storage class {} at index {}",
                other, index
            )))
        }
    };

    Ok(value)
}

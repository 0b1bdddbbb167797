//! PostgreSQL Backend Implementation
//!
//! Implements the backend traits over a sqlx `PgPool`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row, Transaction, TypeInfo, ValueRef};
use std::time::Duration;

use super::core::*;
use crate::error::{MigrateResult, MigrationError};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// PostgreSQL connection pool implementation
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool
    pub async fn connect(database_url: &str, config: &PoolConfig) -> MigrateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(database_url)
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Get the underlying sqlx pool
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to acquire connection: {}", e)))?;

        Ok(Box::new(PostgresConnection { conn }))
    }

    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
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

/// PostgreSQL transaction implementation
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DatabaseConnection for PostgresTransaction {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
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
impl DatabaseTransaction for PostgresTransaction {
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

fn bind_all<'q>(mut query: PgQuery<'q>, params: &'q [DatabaseValue]) -> PgQuery<'q> {
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

fn decode_row(row: &PgRow) -> MigrateResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|index| decode_column(row, index))
        .collect::<MigrateResult<Vec<_>>>()?;
    Ok(DatabaseRow::new(columns, values))
}

fn decode_column(row: &PgRow, index: usize) -> MigrateResult<DatabaseValue> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int64(row.try_get::<i16, _>(index)? as i64),
        "INT4" => DatabaseValue::Int64(row.try_get::<i32, _>(index)? as i64),
        "INT8" => DatabaseValue::Int64(row.try_get::<i64, _>(index)?),
        "FLOAT4" => DatabaseValue::Float64(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => DatabaseValue::Float64(row.try_get::<f64, _>(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => DatabaseValue::DateTime(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => DatabaseValue::String(row.try_get(index)?),
        other => {
            return Err(MigrationError::decode(format!(
                "Unsupported PostgreSQL column type {} at index {}",
                other, index
            )))
        }
    };

    Ok(value)
}

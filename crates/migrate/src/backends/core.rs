//! Core Database Backend Traits
//!
//! The migration system never talks to a driver directly. Migration units,
//! the history store and the run lock all work against these traits, which
//! the PostgreSQL and SQLite backends implement over sqlx.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{MigrateResult, MigrationError};

/// SQL dialect spoken by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "postgresql",
            SqlDialect::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Abstract database connection trait
///
/// Placeholders are `$1..$n` on every backend.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Dialect of the underlying database
    fn dialect(&self) -> SqlDialect;

    /// Execute a statement and return the affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Run a multi-statement script without parameters
    async fn execute_batch(&mut self, sql: &str) -> MigrateResult<()>;

    /// Execute a query and return all result rows
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>>;

    /// Execute a query and return the first result row, if any
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrateResult<Option<DatabaseRow>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Execute a query that must return exactly one row
    async fn fetch_one(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<DatabaseRow> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| MigrationError::Database(format!("Query returned no rows: {}", sql)))
    }
}

/// Abstract database transaction trait
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait DatabaseTransaction: DatabaseConnection {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrateResult<()>;

    /// View the transaction as a plain connection, for migration units
    fn as_connection(&mut self) -> &mut dyn DatabaseConnection;
}

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Dialect of the underlying database
    fn dialect(&self) -> SqlDialect;

    /// Acquire a dedicated connection from the pool
    async fn acquire(&self) -> MigrateResult<Box<dyn DatabaseConnection>>;

    /// Begin an independently scoped transaction
    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>>;

    /// Close the pool
    async fn close(&self);
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_seconds: 30,
        }
    }
}

/// Database value enumeration for parameter binding and row decoding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// SQLite has no boolean storage class, so integers count as booleans
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(b) => Some(*b),
            DatabaseValue::Int64(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Float64(f) => Some(*f),
            DatabaseValue::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Timestamps come back typed from PostgreSQL and as text from SQLite
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            DatabaseValue::String(s) => parse_timestamp(s),
            _ => None,
        }
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        })
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DatabaseValue::Null)
    }
}

/// A decoded result row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> MigrateResult<&DatabaseValue> {
        self.values
            .get(index)
            .ok_or_else(|| MigrationError::decode(format!("Column index {} out of range", index)))
    }

    /// Get a column value by name
    pub fn get(&self, name: &str) -> MigrateResult<&DatabaseValue> {
        self.columns
            .iter()
            .position(|column| column == name)
            .map(|index| &self.values[index])
            .ok_or_else(|| MigrationError::decode(format!("Column '{}' not found", name)))
    }

    pub fn get_string(&self, name: &str) -> MigrateResult<String> {
        self.get(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_mismatch(name, "text"))
    }

    pub fn get_optional_string(&self, name: &str) -> MigrateResult<Option<String>> {
        match self.get(name)? {
            DatabaseValue::Null => Ok(None),
            value => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| type_mismatch(name, "text")),
        }
    }

    pub fn get_i64(&self, name: &str) -> MigrateResult<i64> {
        self.get(name)?.as_i64().ok_or_else(|| type_mismatch(name, "integer"))
    }

    pub fn get_bool(&self, name: &str) -> MigrateResult<bool> {
        self.get(name)?.as_bool().ok_or_else(|| type_mismatch(name, "boolean"))
    }

    pub fn get_optional_f64(&self, name: &str) -> MigrateResult<Option<f64>> {
        match self.get(name)? {
            DatabaseValue::Null => Ok(None),
            value => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| type_mismatch(name, "floating point")),
        }
    }

    pub fn get_datetime(&self, name: &str) -> MigrateResult<DateTime<Utc>> {
        self.get(name)?
            .as_datetime()
            .ok_or_else(|| type_mismatch(name, "timestamp"))
    }
}

fn type_mismatch(column: &str, expected: &str) -> MigrationError {
    MigrationError::decode(format!("Column '{}' is not {}", column, expected))
}

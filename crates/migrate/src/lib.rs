//! # tidemark-migrate: Versioned schema migrations
//!
//! Applies an ordered, statically registered set of migration units to a
//! PostgreSQL or SQLite database, one transaction per unit, recording each
//! in a history table so repeated runs are idempotent. Concurrent runs
//! against the same database are serialized by a database-level lock.

pub mod backends;
pub mod error;
pub mod migrations;
pub mod schema;

// Re-export core traits and types
pub use backends::{
    connect, DatabaseBackendType, DatabaseConnection, DatabasePool, DatabaseRow, DatabaseTransaction,
    DatabaseValue, PoolConfig, SqlDialect,
};
pub use error::{MigrateResult, MigrationError};
pub use migrations::*;

/// Re-exported so migration units can `#[async_trait]` without a direct dependency
pub use async_trait::async_trait;

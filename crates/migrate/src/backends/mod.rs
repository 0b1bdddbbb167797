//! Database Backend Abstractions
//!
//! PostgreSQL is the production target; SQLite backs local development and
//! the test suite. Both sit behind the traits in [`core`].

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use crate::error::{MigrateResult, MigrationError};

// Re-export core traits and types
pub use self::core::*;
pub use postgres::PostgresPool;
pub use sqlite::SqliteBackendPool;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Determine the backend from a connection URL scheme
    pub fn from_url(database_url: &str) -> MigrateResult<Self> {
        let scheme = database_url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| MigrationError::Configuration(format!("Database URL has no scheme: {}", redact(database_url))))?;

        scheme.parse().map_err(MigrationError::Configuration)
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Open a connection pool for the given URL
pub async fn connect(database_url: &str, config: &PoolConfig) -> MigrateResult<Arc<dyn DatabasePool>> {
    let backend = DatabaseBackendType::from_url(database_url)?;
    // The run lock and each migration transaction hold separate connections
    if config.max_connections < 2 {
        return Err(MigrationError::Configuration(format!(
            "max_connections must be at least 2, got {}",
            config.max_connections
        )));
    }
    tracing::debug!(backend = %backend, max_connections = config.max_connections, "Opening database pool");

    let pool: Arc<dyn DatabasePool> = match backend {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresPool::connect(database_url, config).await?),
        DatabaseBackendType::SQLite => Arc::new(SqliteBackendPool::connect(database_url, config).await?),
    };

    Ok(pool)
}

fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => database_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_single_connection_pool() {
        let config = PoolConfig {
            max_connections: 1,
            ..PoolConfig::default()
        };
        let err = connect("sqlite::memory:", &config).await.err().unwrap();
        assert!(matches!(err, MigrationError::Configuration(_)));
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            DatabaseBackendType::from_url("postgres://u:p@localhost/db").unwrap(),
            DatabaseBackendType::PostgreSQL
        );
        assert_eq!(
            DatabaseBackendType::from_url("postgresql://localhost/db").unwrap(),
            DatabaseBackendType::PostgreSQL
        );
        assert_eq!(
            DatabaseBackendType::from_url("sqlite://./dev.db").unwrap(),
            DatabaseBackendType::SQLite
        );
        assert_eq!(
            DatabaseBackendType::from_url("sqlite::memory:").unwrap(),
            DatabaseBackendType::SQLite
        );
    }

    #[test]
    fn test_unsupported_backend() {
        let err = DatabaseBackendType::from_url("mysql://root@localhost/db").unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
        assert!(DatabaseBackendType::from_url("no-scheme").is_err());
    }

    #[test]
    fn test_redact_hides_password() {
        let redacted = redact("postgres://bot:secret@db:5432/app");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("bot"));
    }
}

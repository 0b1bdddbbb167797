//! Run lock
//!
//! Serializes migration runs across processes sharing one database.
//! PostgreSQL uses a session-level advisory lock, released by the server if
//! the holder's session dies. SQLite has no advisory locks, so a single-row
//! table stands in; a crashed holder leaves its row behind and an operator
//! has to delete it.

use chrono::Utc;
use std::time::{Duration, Instant};

use crate::backends::{DatabaseConnection, DatabaseValue, SqlDialect};
use crate::error::{MigrateResult, MigrationError};

/// Advisory lock key: the ASCII bytes of "tidemark"
pub const DEFAULT_LOCK_KEY: i64 = 0x7469_6465_6d61_726b;

/// Lock table used on SQLite
pub const SQLITE_LOCK_TABLE: &str = "tidemark_lock";

/// Run lock settings
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Advisory lock key (PostgreSQL only)
    pub key: i64,
    /// How long to wait for a concurrent run before giving up
    pub timeout: Duration,
    /// Delay between acquisition attempts
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_LOCK_KEY,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl LockConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// A held run lock; must be released on the connection that acquired it
#[derive(Debug)]
#[must_use = "a run lock must be released"]
pub struct RunLock {
    key: i64,
    owner: String,
}

impl RunLock {
    /// Wait for the run lock until the configured timeout
    pub async fn acquire(conn: &mut dyn DatabaseConnection, config: &LockConfig) -> MigrateResult<Self> {
        let lock = Self {
            key: config.key,
            owner: uuid::Uuid::new_v4().to_string(),
        };

        if conn.dialect() == SqlDialect::SQLite {
            ensure_lock_table(conn).await?;
        }

        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if lock.try_acquire(conn).await? {
                tracing::debug!(
                    owner = %lock.owner,
                    attempts,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Migration lock acquired"
                );
                return Ok(lock);
            }

            if attempts == 1 {
                tracing::info!(
                    timeout_secs = config.timeout.as_secs_f64(),
                    "Another migration run holds the lock, waiting"
                );
            }

            if started.elapsed() + config.poll_interval > config.timeout {
                let holder = describe_holder(conn).await;
                return Err(MigrationError::lock(format!(
                    "timed out after {:.1}s waiting for a concurrent migration run{}",
                    started.elapsed().as_secs_f64(),
                    holder
                )));
            }

            tokio::time::sleep(config.poll_interval).await;
        }
    }

    async fn try_acquire(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        match conn.dialect() {
            SqlDialect::PostgreSQL => {
                let row = conn
                    .fetch_one("SELECT pg_try_advisory_lock($1) AS locked", &[DatabaseValue::Int64(self.key)])
                    .await?;
                row.get_bool("locked")
            }
            SqlDialect::SQLite => {
                // Probe read-only first so a waiting process never contends for the write lock.
                let probe = format!("SELECT COUNT(*) AS held FROM {}", SQLITE_LOCK_TABLE);
                if conn.fetch_one(&probe, &[]).await?.get_i64("held")? > 0 {
                    return Ok(false);
                }

                let claim = format!(
                    "INSERT OR IGNORE INTO {} (id, owner, acquired_at) VALUES (1, $1, $2)",
                    SQLITE_LOCK_TABLE
                );
                let params = [
                    DatabaseValue::from(self.owner.as_str()),
                    DatabaseValue::from(Utc::now()),
                ];
                Ok(conn.execute(&claim, &params).await? == 1)
            }
        }
    }

    /// Release the lock
    pub async fn release(self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        let released = match conn.dialect() {
            SqlDialect::PostgreSQL => conn
                .fetch_one("SELECT pg_advisory_unlock($1) AS unlocked", &[DatabaseValue::Int64(self.key)])
                .await?
                .get_bool("unlocked")?,
            SqlDialect::SQLite => {
                let sql = format!("DELETE FROM {} WHERE id = 1 AND owner = $1", SQLITE_LOCK_TABLE);
                conn.execute(&sql, &[DatabaseValue::from(self.owner.as_str())]).await? == 1
            }
        };

        if released {
            tracing::debug!(owner = %self.owner, "Migration lock released");
            Ok(())
        } else {
            Err(MigrationError::lock(format!(
                "lock owned by {} was no longer held at release",
                self.owner
            )))
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

async fn ensure_lock_table(conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    owner TEXT NOT NULL,
    acquired_at TEXT NOT NULL
)",
        SQLITE_LOCK_TABLE
    );
    conn.execute(&sql, &[]).await?;
    Ok(())
}

async fn describe_holder(conn: &mut dyn DatabaseConnection) -> String {
    if conn.dialect() != SqlDialect::SQLite {
        return String::new();
    }

    let sql = format!("SELECT owner, acquired_at FROM {} WHERE id = 1", SQLITE_LOCK_TABLE);
    match conn.fetch_optional(&sql, &[]).await {
        Ok(Some(row)) => match (row.get_string("owner"), row.get_string("acquired_at")) {
            (Ok(owner), Ok(acquired_at)) => format!(" (held by {} since {})", owner, acquired_at),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key_spells_tidemark() {
        assert_eq!(&DEFAULT_LOCK_KEY.to_be_bytes(), b"tidemark");
        assert!(DEFAULT_LOCK_KEY > 0);
    }

    #[test]
    fn test_lock_config_builders() {
        let config = LockConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_key(42)
            .with_poll_interval(Duration::from_millis(50));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.key, 42);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }
}

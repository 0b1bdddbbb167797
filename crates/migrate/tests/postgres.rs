//! PostgreSQL suite; runs only when `TEST_DATABASE_URL` points at a server.
//! Each test works in its own uniquely named tables so runs can share a database.

use std::sync::Arc;
use std::time::Duration;

use tidemark_migrate::schema::{column_exists, table_exists};
use tidemark_migrate::{
    async_trait, connect, DatabaseConnection, DatabasePool, LockConfig, MigrateResult, Migration,
    MigrationConfig, MigrationError, MigrationManager, MigrationRegistry, PoolConfig,
};

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|url| !url.is_empty())
}

fn unique_prefix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("t{}", &id[..12])
}

struct CreateAccounts {
    table: String,
}

#[async_trait]
impl Migration for CreateAccounts {
    fn version(&self) -> &'static str {
        "20241201_000001"
    }

    fn description(&self) -> &'static str {
        "Create accounts table"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(!table_exists(conn, &self.table).await?)
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id SERIAL PRIMARY KEY,
                telegram_id BIGINT UNIQUE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_telegram_id ON {table} (telegram_id);",
            table = self.table
        ))
        .await
    }

    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", self.table)).await
    }
}

struct AddPhone {
    table: String,
    fail: bool,
}

#[async_trait]
impl Migration for AddPhone {
    fn version(&self) -> &'static str {
        "20241201_000002"
    }

    fn description(&self) -> &'static str {
        "Add phone column"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(!column_exists(conn, &self.table, "phone").await?)
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS phone VARCHAR(20)",
            self.table
        ))
        .await?;
        if self.fail {
            conn.execute_batch("SELECT * FROM table_that_does_not_exist").await?;
        }
        Ok(())
    }
}

struct Fixture {
    pool: Arc<dyn DatabasePool>,
    prefix: String,
}

impl Fixture {
    async fn new(url: &str) -> Self {
        let pool = connect(url, &PoolConfig::default()).await.unwrap();
        Self {
            pool,
            prefix: unique_prefix(),
        }
    }

    fn table(&self) -> String {
        format!("{}_accounts", self.prefix)
    }

    fn manager(&self, fail: bool) -> MigrationManager {
        let registry = MigrationRegistry::new(vec![
            Box::new(CreateAccounts { table: self.table() }),
            Box::new(AddPhone {
                table: self.table(),
                fail,
            }),
        ])
        .unwrap();
        let config = MigrationConfig {
            history_table: format!("{}_history", self.prefix),
            lock: LockConfig::default()
                .with_key(i64::from_str_radix(&self.prefix[1..13], 16).unwrap())
                .with_timeout(Duration::from_secs(10))
                .with_poll_interval(Duration::from_millis(20)),
        };
        MigrationManager::new(self.pool.clone(), registry, config).unwrap()
    }

    async fn cleanup(&self) {
        let mut conn = self.pool.acquire().await.unwrap();
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {prefix}_accounts; DROP TABLE IF EXISTS {prefix}_history;",
            prefix = self.prefix
        ))
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_postgres_run_is_idempotent() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let fixture = Fixture::new(&url).await;
    let manager = fixture.manager(false);

    let first = manager.run_migrations().await.unwrap();
    assert_eq!(first.applied_count(), 2);
    let second = manager.run_migrations().await.unwrap();
    assert!(second.is_noop());

    let history = manager.get_migration_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.execution_time.unwrap_or(-1.0) >= 0.0));

    fixture.cleanup().await;
}

#[tokio::test]
async fn test_postgres_failed_upgrade_rolls_back() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let fixture = Fixture::new(&url).await;
    let manager = fixture.manager(true);

    let err = manager.run_migrations().await.unwrap_err();
    assert!(matches!(err, MigrationError::Apply { .. }));

    let mut conn = fixture.pool.acquire().await.unwrap();
    assert!(!column_exists(&mut *conn, &fixture.table(), "phone").await.unwrap());
    assert_eq!(manager.get_migration_history().await.unwrap().len(), 1);

    fixture.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_concurrent_runs_serialize() {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let fixture = Fixture::new(&url).await;
    let first = fixture.manager(false);
    let second = fixture.manager(false);

    let (a, b) = tokio::join!(first.run_migrations(), second.run_migrations());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.applied_count() + b.applied_count(), 2);
    assert_eq!(first.get_migration_history().await.unwrap().len(), 2);

    fixture.cleanup().await;
}

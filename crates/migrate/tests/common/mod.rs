//! Shared fixtures: SQLite-backed pools and a small set of migration units
//! shaped like the application's real ones.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tidemark_migrate::schema::{column_exists, table_exists};
use tidemark_migrate::{
    async_trait, connect, DatabaseConnection, DatabasePool, LockConfig, MigrateResult, Migration,
    MigrationConfig, MigrationManager, MigrationRegistry, PoolConfig,
};

pub struct TestDb {
    pub dir: TempDir,
    pub url: String,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}", dir.path().join("migrations.db").display());
        Self { dir, url }
    }

    pub async fn pool(&self) -> Arc<dyn DatabasePool> {
        connect(&self.url, &PoolConfig::default()).await.expect("open sqlite pool")
    }
}

pub fn fast_lock() -> LockConfig {
    LockConfig::default()
        .with_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(20))
}

pub fn config() -> MigrationConfig {
    MigrationConfig {
        lock: fast_lock(),
        ..Default::default()
    }
}

pub fn manager(pool: Arc<dyn DatabasePool>, migrations: Vec<Box<dyn Migration>>) -> MigrationManager {
    let registry = MigrationRegistry::new(migrations).expect("valid registry");
    MigrationManager::new(pool, registry, config()).expect("valid manager")
}

pub fn seeded() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateUsers),
        Box::new(AddContactFields),
        Box::new(CreateInvitations),
    ]
}

pub struct CreateUsers;

#[async_trait]
impl Migration for CreateUsers {
    fn version(&self) -> &'static str {
        "20241201_000001"
    }

    fn description(&self) -> &'static str {
        "Create users table"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(!table_exists(conn, "users").await?)
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL UNIQUE,
                username TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_telegram_id ON users (telegram_id);",
        )
        .await
    }

    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch("DROP TABLE IF EXISTS users").await
    }
}

pub struct AddContactFields;

#[async_trait]
impl Migration for AddContactFields {
    fn version(&self) -> &'static str {
        "20241201_000002"
    }

    fn description(&self) -> &'static str {
        "Add phone and language_code to users"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(!column_exists(conn, "users", "phone").await?)
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "ALTER TABLE users ADD COLUMN phone TEXT;
            ALTER TABLE users ADD COLUMN language_code TEXT DEFAULT 'ru';
            CREATE INDEX IF NOT EXISTS idx_users_phone ON users (phone);",
        )
        .await
    }

    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "DROP INDEX IF EXISTS idx_users_phone;
            ALTER TABLE users DROP COLUMN language_code;
            ALTER TABLE users DROP COLUMN phone;",
        )
        .await
    }
}

pub struct CreateInvitations;

#[async_trait]
impl Migration for CreateInvitations {
    fn version(&self) -> &'static str {
        "20241201_000003"
    }

    fn description(&self) -> &'static str {
        "Add is_admin and invitations table"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        Ok(!table_exists(conn, "invitations").await?)
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "ALTER TABLE users ADD COLUMN is_admin INTEGER NOT NULL DEFAULT 0;
            CREATE TABLE invitations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                created_by INTEGER REFERENCES users (id),
                is_used INTEGER NOT NULL DEFAULT 0
            );",
        )
        .await
    }
}

/// Creates a table, then fails before finishing
pub struct BrokenMigration {
    pub version: &'static str,
}

#[async_trait]
impl Migration for BrokenMigration {
    fn version(&self) -> &'static str {
        self.version
    }

    fn description(&self) -> &'static str {
        "Half-finished change"
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch("CREATE TABLE partial_change (id INTEGER PRIMARY KEY)")
            .await?;
        conn.execute_batch("ALTER TABLE no_such_table ADD COLUMN nope TEXT")
            .await
    }
}

/// Applicability check that always errors
pub struct UndecidableMigration;

#[async_trait]
impl Migration for UndecidableMigration {
    fn version(&self) -> &'static str {
        "20241201_000002"
    }

    fn description(&self) -> &'static str {
        "Probe a table that is not there"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        conn.fetch_all("SELECT missing_column FROM users", &[]).await?;
        Ok(true)
    }

    async fn upgrade(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        Ok(())
    }
}

/// Counts calls into the wrapped migration
pub struct Counted<M> {
    pub inner: M,
    pub checks: Arc<AtomicUsize>,
    pub upgrades: Arc<AtomicUsize>,
}

impl<M> Counted<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            checks: Arc::new(AtomicUsize::new(0)),
            upgrades: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn upgrades(&self) -> Arc<AtomicUsize> {
        self.upgrades.clone()
    }

    pub fn checks(&self) -> Arc<AtomicUsize> {
        self.checks.clone()
    }
}

#[async_trait]
impl<M: Migration> Migration for Counted<M> {
    fn version(&self) -> &'static str {
        self.inner.version()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.inner.check_can_apply(conn).await
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        self.inner.upgrade(conn).await
    }

    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        self.inner.downgrade(conn).await
    }
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

use tidemark_migrate::schema::column_exists;
use tidemark_migrate::{async_trait, DatabaseConnection, MigrateResult, Migration};

pub struct AddUserColumnsMigration;

#[async_trait]
impl Migration for AddUserColumnsMigration {
    fn version(&self) -> &'static str {
        "20241201_000002"
    }

    fn description(&self) -> &'static str {
        "Add phone and language_code columns to users table"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        let has_phone = column_exists(conn, "users", "phone").await?;
        let has_language_code = column_exists(conn, "users", "language_code").await?;
        Ok(!(has_phone && has_language_code))
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "ALTER TABLE users ADD COLUMN IF NOT EXISTS phone VARCHAR(20);
            ALTER TABLE users ADD COLUMN IF NOT EXISTS language_code VARCHAR(10) DEFAULT 'ru';
            CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);",
        )
        .await
    }

    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "DROP INDEX IF EXISTS idx_users_phone;
            ALTER TABLE users DROP COLUMN IF EXISTS phone;
            ALTER TABLE users DROP COLUMN IF EXISTS language_code;",
        )
        .await
    }
}

//! Guard for databases that skipped 20241201_000003: every statement is
//! idempotent, and the check only passes while something is still missing.

use tidemark_migrate::schema::{column_exists, table_exists};
use tidemark_migrate::{async_trait, DatabaseConnection, MigrateResult, Migration};

pub struct AddAccessAdminAndInvitationsMigration;

#[async_trait]
impl Migration for AddAccessAdminAndInvitationsMigration {
    fn version(&self) -> &'static str {
        "20250825_121500"
    }

    fn description(&self) -> &'static str {
        "Add users.is_admin, set users.is_active default FALSE, create invitations"
    }

    async fn check_can_apply(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {
        let has_is_admin = column_exists(conn, "users", "is_admin").await?;
        let has_invitations = table_exists(conn, "invitations").await?;
        Ok(!(has_is_admin && has_invitations))
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch(
            "ALTER TABLE users ADD COLUMN IF NOT EXISTS is_admin BOOLEAN DEFAULT FALSE;
            ALTER TABLE users ALTER COLUMN is_active SET DEFAULT FALSE;
            CREATE TABLE IF NOT EXISTS invitations (
                id SERIAL PRIMARY KEY,
                token VARCHAR(255) UNIQUE NOT NULL,
                created_by BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                is_used BOOLEAN DEFAULT FALSE,
                used_by BIGINT,
                used_at TIMESTAMP WITH TIME ZONE
            );
            CREATE INDEX IF NOT EXISTS idx_invitations_is_used ON invitations(is_used);",
        )
        .await?;

        tracing::info!("users.is_admin ensured, users.is_active default set to FALSE, invitations ready");
        Ok(())
    }
}

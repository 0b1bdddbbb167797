use tidemark_migrate::schema::{column_exists, table_exists};
use tidemark_migrate::{async_trait, DatabaseConnection, MigrateResult, Migration};

pub struct AddExtraTablesMigration;

#[async_trait]
impl Migration for AddExtraTablesMigration {
    fn version(&self) -> &'static str {
        "20241201_000003"
    }

    fn description(&self) -> &'static str {
        "Add invitations table, add is_admin to users, set default is_active false"
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        if !column_exists(conn, "users", "is_admin").await? {
            tracing::info!("Adding is_admin column to users");
            conn.execute_batch("ALTER TABLE users ADD COLUMN is_admin BOOLEAN DEFAULT FALSE")
                .await?;
        }

        conn.execute_batch("ALTER TABLE users ALTER COLUMN is_active SET DEFAULT FALSE")
            .await?;

        if !table_exists(conn, "invitations").await? {
            tracing::info!("Creating invitations table");
            conn.execute_batch(
                "CREATE TABLE invitations (
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
        }

        Ok(())
    }
}

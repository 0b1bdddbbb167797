//! Adopt a pre-existing users table or create it, then add bot_stats.

use tidemark_migrate::schema::{column_exists, table_exists};
use tidemark_migrate::{async_trait, DatabaseConnection, MigrateResult, Migration};

pub struct InitialTablesMigration;

#[async_trait]
impl Migration for InitialTablesMigration {
    fn version(&self) -> &'static str {
        "20241201_000001"
    }

    fn description(&self) -> &'static str {
        "Adapt existing tables and create bot_stats table"
    }

    async fn upgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        if table_exists(conn, "users").await? {
            tracing::info!("Table users already exists, checking structure");
            if !column_exists(conn, "users", "is_active").await? {
                conn.execute_batch("ALTER TABLE users ADD COLUMN is_active BOOLEAN DEFAULT TRUE")
                    .await?;
            }
        } else {
            tracing::info!("Creating users table");
            conn.execute_batch(
                "CREATE TABLE users (
                    id BIGINT PRIMARY KEY,
                    username VARCHAR(255),
                    first_name VARCHAR(255),
                    last_name VARCHAR(255),
                    is_active BOOLEAN DEFAULT TRUE,
                    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                    updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
                )",
            )
            .await?;
        }

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active);
            CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at);",
        )
        .await?;

        conn.execute_batch(
            "CREATE OR REPLACE FUNCTION update_updated_at_column()
            RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = NOW();
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql;

            DROP TRIGGER IF EXISTS update_users_updated_at ON users;

            CREATE TRIGGER update_users_updated_at
                BEFORE UPDATE ON users
                FOR EACH ROW
                EXECUTE FUNCTION update_updated_at_column();",
        )
        .await?;

        if !table_exists(conn, "bot_stats").await? {
            tracing::info!("Creating bot_stats table");
            conn.execute_batch(
                "CREATE TABLE bot_stats (
                    id SERIAL PRIMARY KEY,
                    total_users INTEGER DEFAULT 0,
                    active_users INTEGER DEFAULT 0,
                    last_restart TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                    status VARCHAR(50) DEFAULT 'active',
                    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_bot_stats_status ON bot_stats(status);
                CREATE INDEX IF NOT EXISTS idx_bot_stats_created_at ON bot_stats(created_at);",
            )
            .await?;
        }

        Ok(())
    }

    // users is left alone: dropping it would lose data.
    async fn downgrade(&self, conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
        conn.execute_batch("DROP TABLE IF EXISTS bot_stats CASCADE").await
    }
}

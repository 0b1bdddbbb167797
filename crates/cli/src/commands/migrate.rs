use anyhow::{bail, Context};
use std::time::Duration;

use tidemark_core::{AppConfig, AppConfigTrait};
use tidemark_migrate::{
    connect, DatabaseBackendType, LockConfig, MigrationConfig, MigrationManager, MigrationRecord, PoolConfig, DEFAULT_LOCK_KEY,
};

use crate::migrations;

/// Build the manager: registry first, so a bad plan fails before any connection
pub async fn open_manager(config: &AppConfig) -> anyhow::Result<MigrationManager> {
    let registry = migrations::registry().context("Invalid migration registry")?;

    let database_url = config.require_database_url()?;
    let backend = DatabaseBackendType::from_url(database_url)?;
    if backend != migrations::BACKEND {
        bail!(
            "The application migrations require {}, but DATABASE_URL points at {} ({})",
            migrations::BACKEND,
            backend,
            config.redacted_database_url().unwrap_or_default()
        );
    }
    let pool_config = PoolConfig {
        max_connections: config.max_connections,
        acquire_timeout_seconds: config.acquire_timeout_secs,
    };
    let pool = connect(database_url, &pool_config).await.with_context(|| {
        format!(
            "Failed to connect to {}",
            config.redacted_database_url().unwrap_or_default()
        )
    })?;

    let migration_config = MigrationConfig {
        history_table: config.migrations_table.clone(),
        lock: LockConfig::default()
            .with_key(config.lock_key.unwrap_or(DEFAULT_LOCK_KEY))
            .with_timeout(Duration::from_secs(config.lock_timeout_secs)),
    };

    Ok(MigrationManager::new(pool, registry, migration_config)?)
}

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let manager = open_manager(config).await?;
    let result = manager.run_migrations().await;
    manager.close().await;

    let report = result.context("Migration run failed")?;
    println!("{}", report);
    Ok(())
}

pub async fn status(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let manager = open_manager(config).await?;
    let result = manager.status().await;
    manager.close().await;

    let report = result.context("Failed to read migration status")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Migration Status:");
        println!("================");
        print!("{}", report);
    }
    Ok(())
}

pub async fn history(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let manager = open_manager(config).await?;
    let result = manager.get_migration_history().await;
    manager.close().await;

    let records = result.context("Failed to read migration history")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No migrations have been applied");
    } else {
        for record in &records {
            println!("{}", format_record(record));
        }
    }
    Ok(())
}

pub async fn rollback(config: &AppConfig, version: &str) -> anyhow::Result<()> {
    let manager = open_manager(config).await?;
    let result = manager.downgrade(version).await;
    manager.close().await;

    let record = result.with_context(|| format!("Rollback of {} failed", version))?;
    println!("✓ Rolled back {} {}", record.version, record.name);
    Ok(())
}

fn format_record(record: &MigrationRecord) -> String {
    format!(
        "{}  {}  {}  {}{}",
        record.applied_at.format("%Y-%m-%d %H:%M:%S"),
        record.version,
        record.name,
        record.description.as_deref().unwrap_or(""),
        record
            .execution_time
            .map(|secs| format!(" ({:.3}s)", secs))
            .unwrap_or_default()
    )
}

/// Load `.env`, read and validate configuration
pub fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_record() {
        let record = MigrationRecord {
            id: 1,
            version: "20241201_000001".to_string(),
            name: "InitialTablesMigration".to_string(),
            description: Some("Adapt existing tables".to_string()),
            applied_at: Utc.with_ymd_and_hms(2024, 12, 1, 10, 30, 0).unwrap(),
            execution_time: Some(0.0421),
        };

        assert_eq!(
            format_record(&record),
            "2024-12-01 10:30:00  20241201_000001  InitialTablesMigration  Adapt existing tables (0.042s)"
        );
    }

    #[tokio::test]
    async fn test_missing_database_url_fails_before_connecting() {
        let config = AppConfig::new();
        let err = open_manager(&config).await.err().expect("database url is required");
        assert!(err.to_string().to_lowercase().contains("database_url"));
    }

    #[tokio::test]
    async fn test_sqlite_url_is_refused_before_connecting() {
        // The testing preset points at sqlite::memory:
        let config = AppConfig::testing();
        let err = open_manager(&config).await.err().expect("sqlite is refused");
        let message = err.to_string();
        assert!(message.contains("require postgresql"), "{message}");
        assert!(message.contains("sqlite"), "{message}");
    }
}

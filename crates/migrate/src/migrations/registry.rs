//! Migration Registry
//!
//! The statically compiled catalogue of migration units. Construction
//! validates the whole plan before anything touches the database.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::definitions::Migration;
use crate::error::{MigrateResult, MigrationError};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{8}_\d{6}$").expect("version pattern is valid"))
}

/// Whether a version string follows the fixed-width `YYYYMMDD_HHMMSS` format
pub fn is_valid_version(version: &str) -> bool {
    version_pattern().is_match(version)
}

/// Ordered, deduplicated set of migration units
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    /// Validate and sort the given units
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> MigrateResult<Self> {
        let mut seen: HashMap<&'static str, &'static str> = HashMap::with_capacity(migrations.len());

        for migration in &migrations {
            let version = migration.version();
            if !is_valid_version(version) {
                return Err(MigrationError::InvalidVersion {
                    version: version.to_string(),
                    name: migration.name().to_string(),
                });
            }
            if let Some(first) = seen.insert(version, migration.name()) {
                return Err(MigrationError::DuplicateVersion {
                    version: version.to_string(),
                    first: first.to_string(),
                    second: migration.name().to_string(),
                });
            }
        }

        // Fixed-width versions sort chronologically as plain strings.
        migrations.sort_by(|a, b| a.version().cmp(b.version()));

        tracing::debug!(count = migrations.len(), "Migration registry loaded");
        Ok(Self { migrations })
    }

    /// Start a registry builder
    pub fn builder() -> MigrationRegistryBuilder {
        MigrationRegistryBuilder::default()
    }

    /// All units in ascending version order
    pub fn list_ordered(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Look up a unit by version
    pub fn get(&self, version: &str) -> Option<&dyn Migration> {
        self.migrations
            .binary_search_by(|m| m.version().cmp(version))
            .ok()
            .map(|index| self.migrations[index].as_ref())
    }

    /// All versions in ascending order
    pub fn versions(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.version()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Builder collecting units before validation
#[derive(Default)]
pub struct MigrationRegistryBuilder {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistryBuilder {
    /// Add a unit
    pub fn register<M: Migration + 'static>(mut self, migration: M) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    /// Add an already boxed unit
    pub fn register_boxed(mut self, migration: Box<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Validate and build the registry
    pub fn build(self) -> MigrateResult<MigrationRegistry> {
        MigrationRegistry::new(self.migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseConnection;
    use async_trait::async_trait;

    struct Unit {
        version: &'static str,
        name: &'static str,
    }

    #[async_trait]
    impl Migration for Unit {
        fn version(&self) -> &'static str {
            self.version
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test unit"
        }

        async fn upgrade(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {
            Ok(())
        }
    }

    fn unit(version: &'static str, name: &'static str) -> Unit {
        Unit { version, name }
    }

    #[test]
    fn test_registry_sorts_by_version() {
        let registry = MigrationRegistry::builder()
            .register(unit("20241201_000003", "third"))
            .register(unit("20241201_000001", "first"))
            .register(unit("20241201_000002", "second"))
            .build()
            .unwrap();

        assert_eq!(
            registry.versions(),
            vec!["20241201_000001", "20241201_000002", "20241201_000003"]
        );
        assert_eq!(registry.get("20241201_000002").unwrap().name(), "second");
        assert!(registry.get("20241201_000009").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = MigrationRegistry::builder()
            .register(unit("20241201_000001", "first"))
            .register(unit("20241201_000001", "again"))
            .build()
            .unwrap_err();

        match err {
            MigrationError::DuplicateVersion { version, first, second } => {
                assert_eq!(version, "20241201_000001");
                assert_eq!(first, "first");
                assert_eq!(second, "again");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_version_rejected() {
        for bad in ["2024120_000001", "20241201-000001", "20241201_0000011", "v1", ""] {
            let result = MigrationRegistry::new(vec![Box::new(unit(bad, "bad"))]);
            assert!(
                matches!(result, Err(MigrationError::InvalidVersion { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = MigrationRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.list_ordered().is_empty());
    }
}

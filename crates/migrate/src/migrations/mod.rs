//! Migration System
//!
//! Versioned migration units, the registry that orders them, the history
//! store that records them and the manager that applies them.

pub mod definitions;
pub mod history;
pub mod lock;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod status;

pub use definitions::{AppliedMigration, Migration, MigrationOutcome, MigrationRecord, MigrationRunReport};
pub use history::{HistoryStore, DEFAULT_HISTORY_TABLE};
pub use lock::{LockConfig, RunLock, DEFAULT_LOCK_KEY, SQLITE_LOCK_TABLE};
pub use registry::{is_valid_version, MigrationRegistry, MigrationRegistryBuilder};
pub use runner::{MigrationConfig, MigrationManager};
pub use status::{MigrationState, MigrationStatus, StatusReport};

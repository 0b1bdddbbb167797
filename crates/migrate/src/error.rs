//! Error types for the migration system
//!
//! Every fatal condition of a migration run maps to one variant here. The
//! wrapping variants keep the failing version and description so a host
//! process can report exactly which unit stopped startup.

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two registered units declare the same version
    #[error("Duplicate migration version {version}: declared by both {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    /// A unit's version does not follow the fixed-width format
    #[error("Invalid migration version '{version}' on {name}: expected YYYYMMDD_HHMMSS")]
    InvalidVersion { version: String, name: String },

    /// The history table could not be created or verified
    #[error("Failed to bootstrap migration history: {source}")]
    Bootstrap {
        #[source]
        source: Box<MigrationError>,
    },

    /// The run lock could not be obtained
    #[error("Failed to acquire migration lock: {message}")]
    LockAcquisition { message: String },

    /// `check_can_apply` raised
    #[error("Applicability check failed for migration {version} ({description}): {source}")]
    ApplicabilityCheck {
        version: String,
        description: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// `upgrade` raised or its transaction could not be committed
    #[error("Migration {version} ({description}) failed: {source}")]
    Apply {
        version: String,
        description: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// Writing the history record failed
    #[error("Failed to record migration {version} ({description}): {source}")]
    Record {
        version: String,
        description: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// A manual downgrade raised; the history record was left intact
    #[error("Downgrade of migration {version} ({description}) failed: {source}")]
    Downgrade {
        version: String,
        description: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// The unit does not provide an inverse
    #[error("Migration {version} does not support downgrade")]
    DowngradeUnsupported { version: String },

    /// No registered unit has this version
    #[error("Unknown migration version: {0}")]
    UnknownVersion(String),

    /// The version has no history record
    #[error("Migration {0} is not applied")]
    NotApplied(String),

    /// The history store already holds this version
    #[error("Migration {version} is already recorded in history")]
    AlreadyRecorded { version: String },

    /// Unique constraint violation reported by the database
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Connection pool or connectivity error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database error: {0}")]
    Database(String),

    /// A column could not be read as the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MigrationError {
    /// Wrap an error raised while bootstrapping the history table
    pub fn bootstrap(source: MigrationError) -> Self {
        Self::Bootstrap {
            source: Box::new(source),
        }
    }

    /// Create a lock acquisition error
    pub fn lock(message: impl Into<String>) -> Self {
        Self::LockAcquisition {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Version the error is attributed to, when there is one
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::DuplicateVersion { version, .. }
            | Self::InvalidVersion { version, .. }
            | Self::ApplicabilityCheck { version, .. }
            | Self::Apply { version, .. }
            | Self::Record { version, .. }
            | Self::Downgrade { version, .. }
            | Self::DowngradeUnsupported { version }
            | Self::AlreadyRecorded { version } => Some(version),
            Self::UnknownVersion(version) | Self::NotApplied(version) => Some(version),
            _ => None,
        }
    }

    /// Whether the database reported a uniqueness conflict
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_) | Self::AlreadyRecorded { .. })
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                MigrationError::UniqueViolation(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                MigrationError::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                MigrationError::Decode(err.to_string())
            }
            _ => MigrationError::Database(err.to_string()),
        }
    }
}

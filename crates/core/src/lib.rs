//! # tidemark-core
//!
//! Shared configuration and logging bootstrap for the tidemark workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, AppConfigTrait, ConfigError, ConfigSource, ConfigValidator, Environment, LogFormat,
};
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}

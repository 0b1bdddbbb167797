use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Environment variable error: {message}")]
    EnvironmentError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an environment error
    pub fn environment_error(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Database URL validator, checks the scheme against the supported backends
pub struct DatabaseUrlValidator {
    pub schemes: Vec<String>,
}

impl Default for DatabaseUrlValidator {
    fn default() -> Self {
        Self {
            schemes: vec![
                "postgres".to_string(),
                "postgresql".to_string(),
                "sqlite".to_string(),
            ],
        }
    }
}

impl DatabaseUrlValidator {
    /// Only accept server databases
    pub fn server_only() -> Self {
        Self {
            schemes: vec!["postgres".to_string(), "postgresql".to_string()],
        }
    }
}

impl ConfigValidator<str> for DatabaseUrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                "non-empty database URL",
            ));
        }

        // sqlite URLs may omit the authority ("sqlite:app.db")
        let has_valid_scheme = self
            .schemes
            .iter()
            .any(|scheme| value.starts_with(&format!("{}:", scheme)));

        if !has_valid_scheme {
            return Err(ConfigError::invalid_value(
                "database_url",
                redact_url(value),
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        Ok(())
    }
}

/// SQL identifier validator for table names that end up interpolated into DDL
pub struct IdentifierValidator {
    pub field: &'static str,
    pub max_length: usize,
}

impl IdentifierValidator {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            max_length: 63,
        }
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

impl ConfigValidator<str> for IdentifierValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.len() > self.max_length || !identifier_pattern().is_match(value) {
            return Err(ConfigError::invalid_value(
                self.field,
                value,
                format!(
                    "SQL identifier of letters, digits and underscores (max {} chars)",
                    self.max_length
                ),
            ));
        }
        Ok(())
    }
}

/// Log level validator
pub struct LogLevelValidator;

impl LogLevelValidator {
    pub const LEVELS: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];
}

impl ConfigValidator<str> for LogLevelValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if !Self::LEVELS.contains(&value) {
            return Err(ConfigError::invalid_value(
                "log_level",
                value,
                format!("one of: {}", Self::LEVELS.join(", ")),
            ));
        }
        Ok(())
    }
}

/// Hide the password component of a connection URL before it reaches logs or errors
pub fn redact_url(value: &str) -> String {
    match url::Url::parse(value) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                value.to_string()
            }
        }
        _ => value.to_string(),
    }
}

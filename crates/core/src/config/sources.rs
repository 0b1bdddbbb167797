/// Where a configuration value came from, reported by `AppConfigTrait::config_sources`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value read from an environment variable (possibly seeded by `.env`)
    EnvVar(String),
    /// Value assembled from several environment variables
    Composed(Vec<String>),
    /// Built-in default
    Default(String),
    /// Value provided programmatically
    Programmatic,
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_) | ConfigSource::Composed(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::Composed(vars) => format!("Composed from: {}", vars.join(", ")),
            ConfigSource::Default(value) => format!("Default value: {}", value),
            ConfigSource::Programmatic => "Programmatically set".to_string(),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

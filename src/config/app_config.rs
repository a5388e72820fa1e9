use serde::Deserialize;

use crate::infrastructure::cache::CacheSettings;

const CACHE_SECTION: &str = "cache";
const NAMESPACES_SECTION: &str = "namespaces";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `config/default`, `config/local` and
    /// `APP__`-prefixed environment variables.
    ///
    /// With a namespace, cache settings come from `namespaces.<name>`
    /// instead of the top-level `cache` table.
    pub fn load(namespace: Option<&str>) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(&config, namespace)
    }

    pub fn from_config(
        config: &config::Config,
        namespace: Option<&str>,
    ) -> Result<Self, config::ConfigError> {
        let logging = optional(config.get::<LoggingConfig>("logging"))?.unwrap_or_default();

        let cache = match namespace {
            Some(name) => config.get::<CacheSettings>(&format!("{}.{}", NAMESPACES_SECTION, name))?,
            None => optional(config.get::<CacheSettings>(CACHE_SECTION))?.unwrap_or_default(),
        };

        Ok(Self { logging, cache })
    }
}

fn optional<T>(result: Result<T, config::ConfigError>) -> Result<Option<T>, config::ConfigError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

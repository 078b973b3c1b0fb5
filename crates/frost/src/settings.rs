use std::time::Duration;

use frost_common::ExecContext;
use frost_concurrent::PoolSettings;
use serde::Deserialize;

const CONFIG_PATH_ENV: &str = "FROST_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "crates/frost/config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuerySettings {
    /// Deadline applied to every query's execution context.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads settings from `FROST_CONFIG_PATH` (or the default file, which
    /// may be absent) overlaid with `FROST__*` environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(&path, true),
            Err(_) => Self::load(DEFAULT_CONFIG_PATH, false),
        }
    }

    pub fn from_path(path: &str) -> Result<Self, config::ConfigError> {
        Self::load(path, true)
    }

    fn load(path: &str, required: bool) -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("FROST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}

impl QuerySettings {
    /// A fresh execution context carrying the configured deadline.
    pub fn context(&self) -> ExecContext {
        match self.timeout_ms {
            Some(ms) => ExecContext::with_timeout(Duration::from_millis(ms)),
            None => ExecContext::new(),
        }
    }
}

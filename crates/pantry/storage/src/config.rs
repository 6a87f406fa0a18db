//! Configuration for pantry backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File backend configuration
    #[serde(default)]
    pub file: FileConfig,

    /// HTTP backend configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory holding one `<table>.json` file per table
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Pretty-print table files
    #[serde(default)]
    pub pretty: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            pretty: false,
        }
    }
}

/// HTTP backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Service base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path segment placed before every table name
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resource_prefix: default_resource_prefix(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_resource_prefix() -> String {
    "api".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StoreConfig {
    /// Load configuration from defaults, an optional file and `PANTRY__`-prefixed
    /// environment variables (`PANTRY__HTTP__BASE_URL=...`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&StoreConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double underscore keeps snake_case keys such as `base_url` intact.
        builder = builder.add_source(
            config::Environment::with_prefix("PANTRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

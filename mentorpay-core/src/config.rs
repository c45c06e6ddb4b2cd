use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MentorpayConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub paging: PagingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PagingConfig {
    /// Page size the list views start with.
    pub default_size: usize,
    /// How many records a full-collection pull asks the server for.
    pub fetch_size: usize,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_probe_timeout_seconds() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_seconds: default_timeout_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_size: 10,
            fetch_size: 200,
        }
    }
}

impl MentorpayConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}

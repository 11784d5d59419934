//! Service settings
//!
//! Layered from built-in defaults, an optional `segment-api.{toml,yaml,json}`
//! file in the working directory, and `SEGMENT_API__*` environment variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub json_logs: bool,
    pub request_timeout_ms: u64,
    /// JSON array of signal records served by the in-memory source
    pub fixture_path: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("segment-api").required(false))
            .add_source(
                Environment::with_prefix("SEGMENT_API")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_address", DEFAULT_BIND_ADDRESS)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("json_logs", false)?
            .set_default("request_timeout_ms", DEFAULT_REQUEST_TIMEOUT_MS)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

//! Configuration management for lmapp
//!
//! Settings are loaded from environment variables with sensible defaults.
//!
//! # Environment Variables
//!
//! - `LMAPP_BACKEND`: Backend selection (auto|ollama|llamafile|mock) - default: "auto"
//! - `LMAPP_MODEL`: Model name - default: first model the backend reports
//! - `LMAPP_TEMPERATURE`: Sampling temperature - default: "0.7"
//! - `LMAPP_TIMEOUT`: Request timeout in seconds - default: "60"
//! - `LMAPP_MAX_RETRIES`: Attempts for transient backend failures - default: "3"
//! - `LMAPP_WORKFLOW_DIR`: Workflow definitions directory - default: "./workflows"
//!   if present, else `<data dir>/workflows`
//! - `LMAPP_DATA_DIR`: Runtime binaries and models - default: platform data dir + "lmapp"
//! - `LMAPP_LOG_LEVEL`: Logging level - default: "info"
//! - `OLLAMA_HOST`: Ollama endpoint - default: "http://localhost:11434"
//! - `LLAMAFILE_PORT`: llamafile server port - default: "8080"
//!
//! # Example
//!
//! ```no_run
//! use lmapp::LmappConfig;
//!
//! let config = LmappConfig::default();
//! config.validate().expect("Invalid configuration");
//! let detector = config.create_detector();
//! ```

use crate::backend::{
    BackendDetector, BackendKind, RecoveryPolicy, DEFAULT_LLAMAFILE_PORT, DEFAULT_OLLAMA_HOST,
};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_LOG_LEVEL: &str = "info";
const LOCAL_WORKFLOW_DIR: &str = "workflows";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid backend: {0}. Valid options: auto, ollama, llamafile, mock")]
    InvalidBackend(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which backend the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    Auto,
    Fixed(BackendKind),
}

impl BackendPreference {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Ok(BackendPreference::Auto);
        }
        BackendKind::from_name(value)
            .map(BackendPreference::Fixed)
            .ok_or_else(|| ConfigError::InvalidBackend(value.to_string()))
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendPreference::Auto => f.write_str("auto"),
            BackendPreference::Fixed(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmappConfig {
    pub backend: BackendPreference,
    pub model: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub workflow_dir: PathBuf,
    pub data_dir: PathBuf,
    pub ollama_host: String,
    pub llamafile_port: u16,
    pub log_level: String,
}

impl Default for LmappConfig {
    /// Loads from environment variables with fallback defaults.
    ///
    /// Unparseable values fall back to their defaults; an unknown backend name
    /// is kept as `auto` here and rejected by [`LmappConfig::from_env`].
    fn default() -> Self {
        let backend = env::var("LMAPP_BACKEND")
            .ok()
            .and_then(|v| BackendPreference::parse(&v).ok())
            .unwrap_or(BackendPreference::Auto);

        let model = env::var("LMAPP_MODEL").ok().filter(|m| !m.trim().is_empty());

        let temperature = env::var("LMAPP_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let request_timeout_secs = env::var("LMAPP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_retries = env::var("LMAPP_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let data_dir = env::var("LMAPP_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let workflow_dir = env::var("LMAPP_WORKFLOW_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let local = PathBuf::from(LOCAL_WORKFLOW_DIR);
                if local.is_dir() {
                    local
                } else {
                    data_dir.join(LOCAL_WORKFLOW_DIR)
                }
            });

        let ollama_host =
            env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());

        let llamafile_port = env::var("LLAMAFILE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_LLAMAFILE_PORT);

        let log_level = env::var("LMAPP_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            backend,
            model,
            temperature,
            request_timeout_secs,
            max_retries,
            workflow_dir,
            data_dir,
            ollama_host,
            llamafile_port,
            log_level,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lmapp"))
        .unwrap_or_else(|| PathBuf::from(".lmapp"))
}

impl LmappConfig {
    /// Like `default()`, but an unrecognised `LMAPP_BACKEND` is an error
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(value) = env::var("LMAPP_BACKEND") {
            BackendPreference::parse(&value)?;
        }
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if self.max_retries == 0 || self.max_retries > 10 {
            return Err(ConfigError::ValidationFailed(format!(
                "Max retries must be between 1 and 10, got {}",
                self.max_retries
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            max_retries: self.max_retries,
            ..RecoveryPolicy::default()
        }
    }

    /// Detector over the real providers, in precedence order
    pub fn create_detector(&self) -> BackendDetector {
        BackendDetector::new(
            BackendKind::CANDIDATES
                .iter()
                .map(|kind| kind.create(self))
                .collect(),
        )
    }

    /// Key/value view for display
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("backend".to_string(), self.backend.to_string());
        map.insert(
            "model".to_string(),
            self.model.clone().unwrap_or_else(|| "<auto>".to_string()),
        );
        map.insert("temperature".to_string(), self.temperature.to_string());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert("max_retries".to_string(), self.max_retries.to_string());
        map.insert(
            "workflow_dir".to_string(),
            self.workflow_dir.display().to_string(),
        );
        map.insert("data_dir".to_string(), self.data_dir.display().to_string());
        map.insert("ollama_host".to_string(), self.ollama_host.clone());
        map.insert(
            "llamafile_port".to_string(),
            self.llamafile_port.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map
    }
}

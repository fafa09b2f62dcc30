use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Environment variable selecting the runtime environment.
pub const RUNTIME_ENV_VAR: &str = "APP_ENV";

/// Backend used when nothing is configured outside production.
pub const DEV_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Edge layer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origin the browser sees, e.g. `https://app.marketingkreis.ch`.
    /// Derived from forwarding headers when unset.
    #[serde(default)]
    pub public_origin: Option<String>,

    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl ServerConfig {
    /// Request body limit in bytes, clamped instead of overflowing.
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            public_origin: None,
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEnv {
    Development,
    Production,
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self::Development
    }
}

impl RuntimeEnv {
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub environment: RuntimeEnv,
}

impl BackendConfig {
    /// Resolve the backend base URL from the process environment and this
    /// config. Fails in production when nothing is configured.
    pub fn resolve(&self) -> Result<BackendBase, ConfigError> {
        let env_url = std::env::var(BACKEND_URL_ENV).ok();
        let runtime = std::env::var(RUNTIME_ENV_VAR)
            .ok()
            .map(|v| RuntimeEnv::from_env_value(&v))
            .unwrap_or(self.environment);

        resolve_backend_url(env_url.as_deref(), self.base_url.as_deref(), runtime)
    }
}

/// A validated backend base URL without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendBase(String);

impl BackendBase {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBackendUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidBackendUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        Ok(Self(trimmed.trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a backend path (leading slash expected) and optional query.
    pub fn join(&self, path: &str, query: Option<&str>) -> String {
        let sep = if path.starts_with('/') { "" } else { "/" };
        match query {
            Some(qs) if !qs.is_empty() => format!("{}{}{}?{}", self.0, sep, path, qs),
            _ => format!("{}{}{}", self.0, sep, path),
        }
    }
}

impl std::fmt::Display for BackendBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Environment value, then config file value, then the development
/// default. Production without either is a configuration error.
pub fn resolve_backend_url(
    env_value: Option<&str>,
    configured: Option<&str>,
    runtime: RuntimeEnv,
) -> Result<BackendBase, ConfigError> {
    let non_empty = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(url) = non_empty(env_value).or_else(|| non_empty(configured)) {
        return BackendBase::parse(&url);
    }

    match runtime {
        RuntimeEnv::Development => {
            tracing::warn!("{} not set, falling back to {}", BACKEND_URL_ENV, DEV_BACKEND_URL);
            BackendBase::parse(DEV_BACKEND_URL)
        }
        RuntimeEnv::Production => Err(ConfigError::MissingBackendUrl { var: BACKEND_URL_ENV }),
    }
}

/// Deadlines for backend calls, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_read_ms")]
    pub read_ms: u64,

    #[serde(default = "default_write_ms")]
    pub write_ms: u64,

    #[serde(default = "default_long_running_ms")]
    pub long_running_ms: u64,

    #[serde(default = "default_cold_start_ms")]
    pub cold_start_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            read_ms: default_read_ms(),
            write_ms: default_write_ms(),
            long_running_ms: default_long_running_ms(),
            cold_start_ms: default_cold_start_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,

    #[serde(default = "default_true")]
    pub auto_verify: bool,

    #[serde(default = "default_verify_path")]
    pub verify_path: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: default_retry_delays_ms(),
            retry_statuses: default_retry_statuses(),
            auto_verify: true,
            verify_path: default_verify_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log every backend call at info level instead of debug.
    #[serde(default)]
    pub trace_backend_calls: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            trace_backend_calls: false,
        }
    }
}

// Default value functions
fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_body_limit_mb() -> usize { 100 }
fn default_read_ms() -> u64 { 12_000 }
fn default_write_ms() -> u64 { 30_000 }
fn default_long_running_ms() -> u64 { 90_000 }
fn default_cold_start_ms() -> u64 { 120_000 }
fn default_retry_delays_ms() -> Vec<u64> { vec![1_200, 2_200] }
fn default_retry_statuses() -> Vec<u16> { vec![502, 503, 504] }
fn default_true() -> bool { true }
fn default_verify_path() -> String { "/auth/verify".to_string() }
fn default_log_level() -> String { "info".to_string() }

/// Get default config file path
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("marketingkreis-edge")
        .join("config.toml")
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path()
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        let config_path = expand_path(&config_path);
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match std::fs::read_to_string(&local_config) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from current directory {:?}", local_config);
                    return Ok(config);
                }
                Err(e) => {
                    tracing::error!("Failed to parse ./config.toml: {}. Falling back to default path.", e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to read ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let content = std::fs::read_to_string(&default_path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

/// Expand ~ in path to home directory
pub fn expand_path(path: &PathBuf) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.clone()
}

use crate::error::{AgencySyncError, AgencySyncResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Prefix shared by every environment variable read in [`AgencySyncConfig::from_env`].
pub const ENV_PREFIX: &str = "AGENCY_SYNC_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencySyncConfig {
    pub iam_endpoint: String,
    #[serde(default)]
    pub enterprise_project_endpoint: Option<String>,
    pub domain_id: String,
    pub auth_token: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default = "default_retry_config")]
    pub retry: RetryConfig,
    #[serde(default = "default_true")]
    pub lock_reconciliation: bool
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Ceiling on per-scope audit queries; 0 disables the gate.
    pub requests_per_second: u32,
    /// Projects owned by the platform itself, never queried.
    pub reserved_project_names: Vec<String>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_elapsed_seconds: u64,
    /// How long delete keeps retrying not-found before treating the agency as gone.
    #[serde(default = "default_not_found_window")]
    pub not_found_window_seconds: u64
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_not_found_window() -> u64 {
    30
}

fn default_retry_config() -> RetryConfig {
    RetryConfig {
        initial_backoff_ms: 1000,
        max_backoff_ms: 30000,
        max_elapsed_seconds: 600,
        not_found_window_seconds: default_not_found_window()
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            reserved_project_names: vec!["MOS".to_string()]
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        default_retry_config()
    }
}

impl Default for AgencySyncConfig {
    fn default() -> Self {
        Self {
            iam_endpoint: String::new(),
            enterprise_project_endpoint: None,
            domain_id: String::new(),
            auth_token: String::new(),
            request_timeout_seconds: default_request_timeout(),
            page_size: default_page_size(),
            audit: AuditConfig::default(),
            retry: default_retry_config(),
            lock_reconciliation: true
        }
    }
}

impl AgencySyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> AgencySyncResult<()> {
        if self.domain_id.is_empty() {
            return Err(AgencySyncError::ConfigError(
                "the domain_id must be specified".to_string()
            ));
        }
        if self.iam_endpoint.is_empty() {
            return Err(AgencySyncError::ConfigError(
                "the iam_endpoint must be specified".to_string()
            ));
        }
        if self.page_size == 0 {
            return Err(AgencySyncError::ConfigError(
                "page_size must be greater than zero".to_string()
            ));
        }
        Ok(())
    }

    /// Load configuration from `AGENCY_SYNC_*` environment variables.
    ///
    /// Unset optional variables fall back to the defaults; malformed numbers
    /// are rejected rather than silently ignored.
    pub fn from_env() -> AgencySyncResult<Self> {
        let mut config = Self::default();

        if let Some(v) = read_env("IAM_ENDPOINT") {
            config.iam_endpoint = v;
        }
        config.enterprise_project_endpoint = read_env("ENTERPRISE_PROJECT_ENDPOINT");
        if let Some(v) = read_env("DOMAIN_ID") {
            config.domain_id = v;
        }
        if let Some(v) = read_env("AUTH_TOKEN") {
            config.auth_token = v;
        }
        if let Some(v) = read_env("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = parse_number("REQUEST_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = read_env("PAGE_SIZE") {
            config.page_size = parse_number("PAGE_SIZE", &v)?;
        }
        if let Some(v) = read_env("AUDIT_REQUESTS_PER_SECOND") {
            config.audit.requests_per_second = parse_number("AUDIT_REQUESTS_PER_SECOND", &v)?;
        }
        if let Some(v) = read_env("RESERVED_PROJECTS") {
            config.audit.reserved_project_names = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(v) = read_env("LOCK_RECONCILIATION") {
            config.lock_reconciliation = matches!(v.as_str(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML, TOML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> AgencySyncResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgencySyncError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&raw)
                .map_err(|e| AgencySyncError::ConfigError(e.to_string()))?,
            Some("toml") => {
                toml::from_str(&raw).map_err(|e| AgencySyncError::ConfigError(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&raw)?,
            other => {
                return Err(AgencySyncError::ConfigError(format!(
                    "unsupported config format: {:?}",
                    other
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> AgencySyncResult<T> {
    value.parse::<T>().map_err(|_| {
        AgencySyncError::ConfigError(format!("{}{} is not a number: {}", ENV_PREFIX, name, value))
    })
}

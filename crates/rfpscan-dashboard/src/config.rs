use std::path::{Path, PathBuf};
use std::time::Duration;

use rfpscan_client::ApiClientConfig;
use rfpscan_core::query::MAX_PAGE_SIZE;
use rfpscan_core::session::DEFAULT_PENDING_TIMEOUT_SECS;
use rfpscan_core::LivenessPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "RFPSCAN_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Dashboard settings: defaults, then an optional YAML file, then `RFPSCAN_*` env vars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub api_prefix: String,
    pub refresh_interval_secs: u64,
    pub post_trigger_refresh_secs: u64,
    pub pending_timeout_secs: u64,
    pub page_size: u32,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub web_port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            refresh_interval_secs: 30,
            post_trigger_refresh_secs: 2,
            pending_timeout_secs: DEFAULT_PENDING_TIMEOUT_SECS,
            page_size: 20,
            http_timeout_secs: 20,
            user_agent: format!("rfpscan-dashboard/{}", env!("CARGO_PKG_VERSION")),
            web_port: 8080,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Unparseable numeric values keep the current setting.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RFPSCAN_API_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("RFPSCAN_API_PREFIX") {
            self.api_prefix = v;
        }
        if let Some(v) = lookup("RFPSCAN_USER_AGENT") {
            self.user_agent = v;
        }
        override_parsed(&lookup, "RFPSCAN_REFRESH_SECS", &mut self.refresh_interval_secs);
        override_parsed(
            &lookup,
            "RFPSCAN_POST_TRIGGER_REFRESH_SECS",
            &mut self.post_trigger_refresh_secs,
        );
        override_parsed(&lookup, "RFPSCAN_PENDING_TIMEOUT_SECS", &mut self.pending_timeout_secs);
        override_parsed(&lookup, "RFPSCAN_PAGE_SIZE", &mut self.page_size);
        override_parsed(&lookup, "RFPSCAN_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs);
        override_parsed(&lookup, "RFPSCAN_WEB_PORT", &mut self.web_port);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh_interval_secs must be positive".into()));
        }
        if self.pending_timeout_secs == 0 {
            return Err(ConfigError::Invalid("pending_timeout_secs must be positive".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn post_trigger_delay(&self) -> Duration {
        Duration::from_secs(self.post_trigger_refresh_secs)
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        LivenessPolicy::from_secs(self.pending_timeout_secs)
    }

    pub fn backend_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api_base_url.clone(),
            api_prefix: self.api_prefix.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(parsed) = lookup(key).and_then(|v| v.trim().parse().ok()) {
        *slot = parsed;
    }
}

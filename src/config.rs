//! read configuration from a file or the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_REFRESH_PATH: &str = "/token/refresh";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    pub token_file: PathBuf,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

impl Config {
    pub fn from_values(
        base_url: impl Into<String>,
        token_file: impl Into<PathBuf>,
        refresh_path: Option<String>,
        wait_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: refresh_path.unwrap_or_else(default_refresh_path),
            token_file: token_file.into(),
            wait_timeout_secs,
            user_agent: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `BEARER_RELAY_BASE_URL` and `BEARER_RELAY_TOKEN_FILE`, plus the
    /// optional `BEARER_RELAY_REFRESH_PATH` and `BEARER_RELAY_WAIT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("BEARER_RELAY_BASE_URL")
            .map_err(|_| Error::Config("Missing BEARER_RELAY_BASE_URL env var".to_string()))?;
        let token_file = std::env::var("BEARER_RELAY_TOKEN_FILE")
            .map_err(|_| Error::Config("Missing BEARER_RELAY_TOKEN_FILE env var".to_string()))?;
        let wait_timeout_secs = match std::env::var("BEARER_RELAY_WAIT_TIMEOUT_SECS") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|e| {
                Error::Config(format!("Invalid BEARER_RELAY_WAIT_TIMEOUT_SECS '{raw}': {e}"))
            })?),
            Err(_) => None,
        };
        let config = Self::from_values(
            base_url,
            token_file,
            std::env::var("BEARER_RELAY_REFRESH_PATH").ok(),
            wait_timeout_secs,
        );
        config.validate()?;
        Ok(config)
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        if self.wait_timeout_secs == Some(0) {
            return Err(Error::Config("wait_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn refresh_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.refresh_path.starts_with('/') {
            format!("{base}{}", self.refresh_path)
        } else {
            format!("{base}/{}", self.refresh_path)
        }
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| concat!("bearer-relay/", env!("CARGO_PKG_VERSION")).to_string())
    }
}

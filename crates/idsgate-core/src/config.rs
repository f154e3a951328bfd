//! Configuration management for idsgate.
//!
//! Loads configuration from ${IDSGATE_HOME}/config.toml with sensible defaults,
//! then applies environment overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for idsgate configuration and data.
    //!
    //! IDSGATE_HOME resolution order:
    //! 1. IDSGATE_HOME environment variable (if set)
    //! 2. ~/.config/idsgate (default)

    use std::path::PathBuf;

    /// Returns the idsgate home directory.
    pub fn idsgate_home() -> PathBuf {
        if let Ok(home) = std::env::var("IDSGATE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".idsgate"),
            |h| h.join(".config").join("idsgate"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        idsgate_home().join("config.toml")
    }

    /// Returns the path to the persisted session.
    pub fn session_path() -> PathBuf {
        idsgate_home().join("session.json")
    }
}

const ENV_SERVICE_URL: &str = "IDSGATE_IDS_SERVICE_URL";
const ENV_LOGIN_URL: &str = "IDSGATE_IDS_LOGIN_URL";
const ENV_TICKET_LOGIN_URL: &str = "IDSGATE_TICKET_LOGIN_URL";

/// Identity provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsConfig {
    /// Callback the identity provider redirects back to.
    pub service_url: String,
    /// Identity provider login page.
    pub login_base_url: String,
    /// Full login URL override.
    pub login_url: Option<String>,
    /// Ticket redemption endpoint, absolute or relative to the page origin.
    pub ticket_login_url: String,
}

impl IdsConfig {
    const DEFAULT_SERVICE_URL: &str = "https://xdechat.xidian.edu.cn/";
    const DEFAULT_LOGIN_BASE_URL: &str = "https://ids.xidian.edu.cn/authserver/login";
    const DEFAULT_TICKET_LOGIN_URL: &str = "/v1/user/login";

    /// Service callback with a trailing slash enforced.
    pub fn service_url(&self) -> String {
        ensure_trailing_slash(&self.service_url)
    }

    /// Fully qualified identity provider login URL.
    ///
    /// An explicit `login_url` wins; otherwise the base gets a `service`
    /// parameter pointing back at this application.
    pub fn login_url(&self) -> Result<String> {
        if let Some(url) = self.login_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }

        let mut url = url::Url::parse(&self.login_base_url)
            .with_context(|| format!("Invalid IDS login base URL: {}", self.login_base_url))?;
        url.query_pairs_mut()
            .append_pair("service", &self.service_url());
        Ok(url.into())
    }
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            service_url: Self::DEFAULT_SERVICE_URL.to_string(),
            login_base_url: Self::DEFAULT_LOGIN_BASE_URL.to_string(),
            login_url: None,
            ticket_login_url: Self::DEFAULT_TICKET_LOGIN_URL.to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Route opened after login
    pub landing_route: String,

    /// Identity provider endpoints
    pub ids: IdsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            landing_route: "/".to_string(),
            ids: IdsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config path, then applies env overrides.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_SERVICE_URL) {
            self.ids.service_url = url;
        }
        if let Some(url) = non_empty(ENV_LOGIN_URL) {
            self.ids.login_url = Some(url);
        }
        if let Some(url) = non_empty(ENV_TICKET_LOGIN_URL) {
            self.ids.ticket_login_url = url;
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

/// Returns the commented default config template.
pub fn default_config_template() -> &'static str {
    include_str!("default_config.toml")
}

fn ensure_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

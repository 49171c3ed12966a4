//! Configuration types for the Bee CLI

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pairing application registered for the production environment
pub const PRODUCTION_APP_ID: &str = "pk5z3a9m2q8w7e4r6t1y";

/// Pairing application registered for the staging environment
pub const STAGING_APP_ID: &str = "pk2b8n4v6c1x9z3l5k7j";

/// Remote environment the CLI talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl Environment {
    /// Key used to scope stored credentials
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }

    /// Application identifier sent with every pairing request
    pub fn app_id(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_APP_ID,
            Environment::Staging => STAGING_APP_ID,
        }
    }

    /// Base URL of the API serving `/apps/pairing/request`
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://api.bee.computer",
            Environment::Staging => "https://api.staging.bee.computer",
        }
    }

    /// Base URL of the site where users approve pairing requests
    pub fn connect_base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://bee.computer",
            Environment::Staging => "https://staging.bee.computer",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            _ => Err(Error::validation(format!(
                "Invalid environment: {}. Use: production, staging",
                s
            ))),
        }
    }
}

/// Which credential backend the store starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Platform keyring, degrading to files when it is unavailable
    #[default]
    Auto,
    /// Owner-only files in the credentials directory
    File,
}

impl std::str::FromStr for StoreMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "keyring" | "secure" => Ok(StoreMode::Auto),
            "file" => Ok(StoreMode::File),
            _ => Err(Error::validation(format!(
                "Invalid credential store: {}. Use: auto, keyring, file",
                s
            ))),
        }
    }
}

/// Interpret an environment flag value such as `BEE_EMOJI_HASH`
pub fn env_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "on" | "yes")
    )
}

/// Main configuration for the Bee CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target environment
    pub environment: Environment,
    /// Pairing API base URL (environment default if None)
    pub api_base_url: Option<String>,
    /// Connect site base URL (environment default if None)
    pub connect_base_url: Option<String>,
    /// Pairing application id (environment default if None)
    pub app_id: Option<String>,
    /// Directory for file-backed credentials (platform default if None)
    pub credentials_dir: Option<PathBuf>,
    /// Credential backend selection
    pub store_mode: StoreMode,
    /// Show the public key fingerprint during interactive login
    pub emoji_hash: bool,
}

impl Config {
    /// Create a configuration for an environment with default values
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            api_base_url: None,
            connect_base_url: None,
            app_id: None,
            credentials_dir: None,
            store_mode: StoreMode::Auto,
            emoji_hash: false,
        }
    }

    /// Builder pattern: override the pairing API base URL
    pub fn with_api_base_url(mut self, url: Option<String>) -> Self {
        self.api_base_url = url;
        self
    }

    /// Builder pattern: override the connect site base URL
    pub fn with_connect_base_url(mut self, url: Option<String>) -> Self {
        self.connect_base_url = url;
        self
    }

    /// Builder pattern: override the pairing application id
    pub fn with_app_id(mut self, app_id: Option<String>) -> Self {
        self.app_id = app_id;
        self
    }

    /// Builder pattern: set the credentials directory
    pub fn with_credentials_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.credentials_dir = dir;
        self
    }

    /// Builder pattern: set the credential store mode
    pub fn with_store_mode(mut self, mode: StoreMode) -> Self {
        self.store_mode = mode;
        self
    }

    /// Builder pattern: toggle fingerprint display
    pub fn with_emoji_hash(mut self, enabled: bool) -> Self {
        self.emoji_hash = enabled;
        self
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base_url())
    }

    pub fn connect_base_url(&self) -> &str {
        self.connect_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.connect_base_url())
    }

    pub fn app_id(&self) -> &str {
        self.app_id
            .as_deref()
            .unwrap_or_else(|| self.environment.app_id())
    }

    /// Resolve the credentials directory (~/.config/bee/credentials by default)
    pub fn credentials_dir(&self) -> Result<PathBuf> {
        match &self.credentials_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let config_dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
                Ok(config_dir.join("bee").join("credentials"))
            }
        }
    }

    /// URL the user opens to approve a pairing request
    pub fn pairing_url(&self, request_id: &str) -> String {
        format!(
            "{}/connect/{}",
            self.connect_base_url().trim_end_matches('/'),
            request_id
        )
    }
}

use crate::error::{Result, SsoStoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default container key template; `{}` is replaced by the parent token
pub const DEFAULT_KEY_TEMPLATE: &str = "sso:ptoken:{}";

/// How the container expiry reacts to sub-token registrations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Expiry is set once when the record is created and never refreshed.
    /// A sub-token may outlive the container that holds it.
    #[default]
    Fixed,
    /// Each sub-token registration extends the container expiry so that
    /// every live sub-token in the index stays reachable for its whole
    /// lifetime. The expiry is never shortened.
    ExtendToSubTokens,
}

/// Store backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    #[default]
    Memory,
    Redis { url: String },
}

/// Parent-token store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoStoreConfig {
    /// Container key naming template, must contain `{}`
    pub parent_token_key_template: String,
    /// Allow more than one user id bound to the same parent token
    pub enable_multiple_accounts: bool,
    pub expiry_policy: ExpiryPolicy,
    /// Per store call timeout in milliseconds
    pub store_timeout_ms: Option<u64>,
    pub backend: BackendConfig,
}

impl Default for SsoStoreConfig {
    fn default() -> Self {
        Self {
            parent_token_key_template: DEFAULT_KEY_TEMPLATE.to_string(),
            enable_multiple_accounts: false,
            expiry_policy: ExpiryPolicy::Fixed,
            store_timeout_ms: None,
            backend: BackendConfig::Memory,
        }
    }
}

impl SsoStoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.parent_token_key_template.matches("{}").count() != 1 {
            return Err(SsoStoreError::Config(format!(
                "parent_token_key_template must contain exactly one '{{}}' placeholder, got '{}'",
                self.parent_token_key_template
            )));
        }

        if self.store_timeout_ms == Some(0) {
            return Err(SsoStoreError::Config(
                "store_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if let BackendConfig::Redis { url } = &self.backend
            && url.trim().is_empty()
        {
            return Err(SsoStoreError::Config(
                "redis backend requires a non-empty url".to_string(),
            ));
        }

        Ok(())
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<SsoStoreConfig>> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path).map_err(|e| {
        SsoStoreError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: SsoStoreConfig = serde_yaml::from_str(&contents)
        .map_err(|e| SsoStoreError::Config(format!("Failed to parse YAML config: {}", e)))?;

    config.validate()?;

    info!(
        "Configuration loaded: multi-account={}, expiry policy={:?}, backend={:?}",
        config.enable_multiple_accounts, config.expiry_policy, config.backend
    );

    Ok(Arc::new(config))
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> Result<Arc<SsoStoreConfig>> {
    // Try loading from environment variable first
    if let Ok(config_path) = std::env::var("SSO_STORE_CONFIG") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from SSO_STORE_CONFIG ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["sso-store.yaml", "sso-store.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    info!("No configuration file found, using defaults");
    Ok(Arc::new(SsoStoreConfig::default()))
}

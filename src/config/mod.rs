//! Configuration management for threadengine
//!
//! Registry settings are merged from three layers, lowest priority first:
//! built-in defaults, a TOML file (`threadengine.toml` in the working
//! directory, or an explicit path), and `THREADENGINE_*` environment variables.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "threadengine.toml";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "THREADENGINE_";

/// Settings applied to every native thread the registry starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Threads are named `<prefix>-<worker id>`
    pub thread_name_prefix: String,

    /// Stack size in bytes for worker threads (platform default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "worker".to_string(),
            stack_size: None,
        }
    }
}

impl RegistryConfig {
    /// Load from `threadengine.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load using `custom_config` instead of the default file name.
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(custom_config: Option<&Path>) -> Result<Self> {
        let config: RegistryConfig = Self::figment(custom_config)
            .extract()
            .context("Failed to load registry configuration")?;
        config.validate()?;

        tracing::debug!(?config, "registry configuration loaded");
        Ok(config)
    }

    /// The merged provider stack, exposed so callers can layer their own sources
    pub fn figment(custom_config: Option<&Path>) -> Figment {
        let file = custom_config.unwrap_or_else(|| Path::new(CONFIG_FILE));

        Figment::from(Serialized::defaults(RegistryConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_name_prefix.trim().is_empty() {
            anyhow::bail!("Thread name prefix cannot be empty");
        }

        if self.thread_name_prefix.contains('\0') {
            anyhow::bail!("Thread name prefix cannot contain NUL bytes");
        }

        if self.stack_size == Some(0) {
            anyhow::bail!("Stack size cannot be 0");
        }

        Ok(())
    }

    /// Render as TOML, as it would appear in `threadengine.toml`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests;

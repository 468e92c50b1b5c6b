//! Configuration management for MIDI Macros
//!
//! Handles loading, validating and saving the YAML configuration file.

use crate::paths::AppPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Backend kinds bundled with this build
pub const KNOWN_BACKENDS: &[&str] = &["console"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ports: PortsConfig,
}

/// Persistence location
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// sled database path; defaults to the app state directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Execution backend selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    /// Macro ids the console backend refuses (for testing failure paths)
    #[serde(default)]
    pub reject: Vec<String>,
}

/// MIDI input port discovery
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortsConfig {
    /// Refresh period of the port list; 0 disables the refresh task
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            reject: Vec::new(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            client_name: default_client_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_BACKENDS.contains(&self.backend.kind.as_str()) {
            anyhow::bail!(
                "Unknown backend kind '{}' (expected one of: {})",
                self.backend.kind,
                KNOWN_BACKENDS.join(", ")
            );
        }
        if self.backend.reject.iter().any(|id| id.trim().is_empty()) {
            anyhow::bail!("backend.reject cannot contain empty macro ids");
        }
        if self.ports.client_name.trim().is_empty() {
            anyhow::bail!("ports.client_name cannot be empty");
        }
        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("storage.path cannot be empty");
            }
        }
        Ok(())
    }

    /// Resolved sled database path
    pub fn storage_path(&self, paths: &AppPaths) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| paths.sled_db_path())
    }
}

// Default value functions
fn default_backend_kind() -> String { "console".to_string() }
fn default_refresh_interval_ms() -> u64 { 2000 }
fn default_client_name() -> String { "midi-macros".to_string() }

//! Sync engine configuration
//!
//! Loaded from `~/.config/mailsync/sync.json` when present, with sensible
//! defaults otherwise.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config filename in the mailsync config directory
const SYNC_CONFIG_FILE: &str = "sync.json";

/// Get the config directory (~/.config/mailsync/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("mailsync"))
}

/// Tunables for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Labels walked during full sync, in order
    pub tracked_labels: Vec<String>,
    /// Page size for full-sync listings (provider caps at 500)
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tracked_labels: vec!["INBOX".to_string(), "SENT".to_string()],
            page_size: 100,
        }
    }
}

impl SyncConfig {
    /// Load from the config directory, falling back to defaults when the
    /// file does not exist
    pub fn load() -> Result<Self> {
        let Some(path) = config_dir().map(|dir| dir.join(SYNC_CONFIG_FILE)) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Persist to the config directory, creating it if needed
    pub fn save(&self) -> Result<()> {
        let dir = config_dir().context("Could not determine config directory")?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = dir.join(SYNC_CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

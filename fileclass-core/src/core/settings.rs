//! Per-vault settings persistence.
//!
//! Settings live in `<vault>/.fileclass/settings.json`. A missing or corrupt
//! file yields the defaults, so a fresh directory works without setup.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted vault settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Vault-relative folder holding one configuration document per type.
    pub types_folder: String,
    /// Front-matter key naming a record's type.
    pub class_key: String,
    /// Display name substituted for the `$me` default.
    pub user_name: String,
    /// Longest wait for a file's mutation lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            types_folder: "Classes".to_string(),
            class_key: "fileClass".to_string(),
            user_name: String::new(),
            lock_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    /// Returns the path to the settings file of the vault at `vault_root`.
    pub fn file_path(vault_root: &Path) -> PathBuf {
        vault_root.join(".fileclass").join("settings.json")
    }

    /// Loads settings from disk; returns defaults if the file is missing or corrupt.
    pub fn load(vault_root: &Path) -> Self {
        let path = Self::file_path(vault_root);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("ignoring corrupt settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Saves settings to disk, creating the settings directory as needed.
    pub fn save(&self, vault_root: &Path) -> Result<()> {
        let path = Self::file_path(vault_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

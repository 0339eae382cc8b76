//! Persistent application settings.
//!
//! The settings file lives at `~/.config/romhound/settings.toml`; every
//! field has a default, so a missing or partial file is fine. CLI flags
//! override anything loaded here.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Canonical path to the settings file: `~/.config/romhound/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("romhound").join("settings.toml")
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Number of scraping workers
    pub workers: usize,
    /// Media download concurrency; 0 means "same as workers"
    pub img_workers: usize,
    /// Extra full-sweep attempts after a transient failure
    pub retries: u32,
    /// Additional extensions treated as plain ROMs
    pub extra_exts: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            img_workers: 0,
            retries: 2,
            extra_exts: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Settings {
    /// Load from the canonical location. Missing file yields defaults;
    /// a file that exists but does not parse is an error worth surfacing.
    pub fn load() -> Result<Self, toml::de::Error> {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents),
            Err(_) => Ok(Self::default()),
        }
    }
}

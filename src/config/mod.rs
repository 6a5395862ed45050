use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::file::EntryFilter;
use crate::watch::{Backend, InitialEvent, WatchOptions};

/// Global configuration for treewatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watch node configuration
    pub watch: WatchConfig,

    /// Event output configuration
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Event kind for entries found by the initial scan ("add" or "create")
    pub initial_event: InitialEvent,

    /// Track dot-files and dot-directories
    pub include_hidden: bool,

    /// Gitignore-style patterns for entry names to skip
    pub ignore: Vec<String>,

    /// Poll every N milliseconds instead of using native notifications
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print events as JSON lines
    pub json: bool,

    /// Colorize text output
    pub color: bool,
}

impl Config {
    /// Load configuration from ~/.treewatch/config.json, or defaults if absent
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// ~/.treewatch/config.json
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".treewatch").join("config.json"))
    }
}

impl WatchConfig {
    /// Build node options from this configuration
    pub fn to_options(&self) -> Result<WatchOptions> {
        let mut filter = EntryFilter::ignoring(&self.ignore)?;
        if !self.include_hidden {
            filter = EntryFilter::hidden().and(filter);
        }

        let backend = match self.poll_interval_ms {
            Some(ms) => Backend::Poll(Duration::from_millis(ms.max(1))),
            None => Backend::Native,
        };

        Ok(WatchOptions::new()
            .initial_event(self.initial_event)
            .filter(filter)
            .backend(backend))
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            initial_event: InitialEvent::Add,
            include_hidden: false,
            ignore: Vec::new(),
            poll_interval_ms: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            color: true,
        }
    }
}

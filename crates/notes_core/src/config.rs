//! Configuration types for notes_core.
//!
//! [`Config`] carries the settings the core needs to read and write note
//! files: who is recorded in the version history, how the metadata line is
//! terminated, where attachments live and which anchor attribute marks a
//! link to another note. It is persisted as TOML (typically at
//! `~/.config/notes/config.toml` on Unix systems).
//!
//! # Example
//!
//! ```ignore
//! use notes_core::config::Config;
//!
//! let config = Config::load()?;
//! let path = config.attachment_path("scan.png");
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NotesError, Result};

/// Settings consumed by the notebook and its engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Author recorded in the version history when a note is saved
    pub author: String,

    /// Terminator written after the metadata comment line
    pub line_separator: String,

    /// Extension of note files, without the dot
    pub note_extension: String,

    /// Subdirectory holding note attachments
    pub attachments_dir: String,

    /// Anchor attribute whose value names the linked note's file
    pub link_attribute: String,

    /// Allow the metadata comment to be compressed when that makes it shorter
    pub compress_metadata: bool,
}

/// Native line separator of the platform.
pub fn native_line_separator() -> &'static str {
    if cfg!(windows) { "\r\n" } else { "\n" }
}

fn default_author() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            author: default_author(),
            line_separator: native_line_separator().to_string(),
            note_extension: "htm".to_string(),
            attachments_dir: "Attachments".to_string(),
            link_attribute: "data-note-link".to_string(),
            compress_metadata: true,
        }
    }
}

impl Config {
    /// Create a default config recording the given author
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }

    /// Path of an attachment relative to the notes directory
    pub fn attachment_path(&self, name: &str) -> PathBuf {
        Path::new(&self.attachments_dir).join(name)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load config from a path, returning default if it is missing or invalid.
    pub fn load_from_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config, could not load {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/notes/config.toml)
    /// Only available on native platforms
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("notes").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(NotesError::NoConfigDir)?;
        self.save_to(&path)
    }
}

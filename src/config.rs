//! Configuration file support for cineflow.
//!
//! User preferences live in a TOML file. Every field has a serde default so a
//! partial (or absent) file still yields a usable configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the configured TMDB API key.
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

/// User configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// TMDB API key (v3)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the TMDB REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL for TMDB images, without the size segment
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Base URL of the embedded player
    #[serde(default = "default_player_base_url")]
    pub player_base_url: String,

    /// How often the episode tracker polls the player location, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet period before a typed search query is sent, in milliseconds
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Directory for the watchlist and continue-watching files
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn default_api_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_image_base_url() -> String {
    "https://image.tmdb.org/t/p".to_string()
}

fn default_player_base_url() -> String {
    "https://vidzy.luna.tattoo/embed".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_search_debounce_ms() -> u64 {
    500
}

impl Config {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            image_base_url: default_image_base_url(),
            player_base_url: default_player_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            search_debounce_ms: default_search_debounce_ms(),
            data_dir: None,
        }
    }

    /// Get the path to the config file.
    ///
    /// Returns ~/.config/cineflow/config.toml on Linux,
    /// or a platform-appropriate location on other systems.
    pub fn get_config_path() -> std::result::Result<PathBuf, io::Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Could not find config directory")
            })?
            .join("cineflow");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::get_config_path()?;

        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Save config to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::get_config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// The API key to use: `TMDB_API_KEY` wins over the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    /// Directory holding persisted watch state.
    ///
    /// Returns ~/.local/share/cineflow on Linux unless overridden.
    pub fn resolve_data_dir(&self) -> std::result::Result<PathBuf, io::Error> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        Ok(dirs::data_local_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not find data directory"))?
            .join("cineflow"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

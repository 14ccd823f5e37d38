//! Texture store configuration
//!
//! This module provides the tunables of a [`TextureStore`](crate::TextureStore).
//! Configuration can be loaded from a file, environment variables, or created
//! programmatically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{CacheError, CacheResult};

/// Configuration for a texture store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureStoreConfig {
    /// Number of no-longer-visible tiles whose textures are retained
    pub previously_visible_cache_size: usize,
    /// Bucket count of the store's hashed containers
    pub map_capacity: usize,
    /// Total attempts allowed for an asset fetch failing with a network error
    pub max_load_attempts: u32,
}

impl Default for TextureStoreConfig {
    fn default() -> Self {
        Self {
            previously_visible_cache_size: 512,
            map_capacity: crate::map::DEFAULT_CAPACITY,
            max_load_attempts: 3,
        }
    }
}

impl TextureStoreConfig {
    /// Sets the number of retained no-longer-visible textures.
    pub fn with_previously_visible_cache_size(mut self, size: usize) -> Self {
        self.previously_visible_cache_size = size;
        self
    }

    /// Sets the bucket count of the hashed containers.
    pub fn with_map_capacity(mut self, capacity: usize) -> Self {
        self.map_capacity = capacity;
        self
    }

    /// Sets the total attempts allowed for an asset fetch.
    pub fn with_max_load_attempts(mut self, attempts: u32) -> Self {
        self.max_load_attempts = attempts;
        self
    }

    /// Checks that the configuration can build a store.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if the map capacity is zero or
    /// no load attempt is allowed.
    pub fn validate(&self) -> CacheResult<()> {
        if self.map_capacity == 0 {
            return Err(CacheError::invalid("map_capacity must be a positive integer"));
        }
        if self.max_load_attempts == 0 {
            return Err(CacheError::invalid("max_load_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/panoview/texture-store.toml
    /// - Linux: ~/.config/panoview/texture-store.toml
    /// - Windows: %APPDATA%\panoview\texture-store.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("panoview").join("texture-store.toml")
        } else {
            PathBuf::from("texture-store.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PANOVIEW_PREVIOUSLY_VISIBLE_CACHE_SIZE` (default: 512)
    /// - `PANOVIEW_MAP_CAPACITY` (default: 64)
    /// - `PANOVIEW_MAX_LOAD_ATTEMPTS` (default: 3)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PANOVIEW_PREVIOUSLY_VISIBLE_CACHE_SIZE") {
            config.previously_visible_cache_size =
                parse_value("PANOVIEW_PREVIOUSLY_VISIBLE_CACHE_SIZE", &val)?;
        }

        if let Ok(val) = std::env::var("PANOVIEW_MAP_CAPACITY") {
            config.map_capacity = parse_value("PANOVIEW_MAP_CAPACITY", &val)?;
        }

        if let Ok(val) = std::env::var("PANOVIEW_MAX_LOAD_ATTEMPTS") {
            config.max_load_attempts = parse_value("PANOVIEW_MAX_LOAD_ATTEMPTS", &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// previously_visible_cache_size = 512
    /// map_capacity = 64
    /// max_load_attempts = 3
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "previously_visible_cache_size" => {
                        config.previously_visible_cache_size = parse_value(key, value)?;
                    }
                    "map_capacity" => {
                        config.map_capacity = parse_value(key, value)?;
                    }
                    "max_load_attempts" => {
                        config.max_load_attempts = parse_value(key, value)?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    fn to_toml(&self) -> String {
        format!(
            "# Panoview Texture Store Configuration\n\
             previously_visible_cache_size = {}\n\
             map_capacity = {}\n\
             max_load_attempts = {}\n",
            self.previously_visible_cache_size, self.map_capacity, self.max_load_attempts
        )
    }
}

fn parse_value<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, ConfigError> {
    value
        .parse::<N>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

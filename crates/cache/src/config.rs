//! Cache configuration: where the caches live and how large they may grow.
//!
//! Configuration can be loaded from a TOML file, environment variables, or
//! created programmatically.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::DEFAULT_AUDIO_MAX_BYTES;
use crate::draft::DEFAULT_DRAFT_MAX_BYTES;
use crate::error::ConfigError;
use crate::images::{DEFAULT_IMAGE_MAX_BYTES, DEFAULT_IMAGE_MEMORY_MAX_BYTES};

const MB: u64 = 1024 * 1024;

/// Configuration for the file caches and the decoded-image memory tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory; each cache gets a subdirectory
    pub root_dir: PathBuf,
    /// Audio file cache cap in bytes
    pub audio_max_bytes: u64,
    /// Image file cache cap in bytes
    pub image_max_bytes: u64,
    /// Draft cache cap in bytes
    pub draft_max_bytes: u64,
    /// Budget for decoded images held in memory
    pub image_memory_max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: Self::default_root_dir(),
            audio_max_bytes: DEFAULT_AUDIO_MAX_BYTES,
            image_max_bytes: DEFAULT_IMAGE_MAX_BYTES,
            draft_max_bytes: DEFAULT_DRAFT_MAX_BYTES,
            image_memory_max_bytes: DEFAULT_IMAGE_MEMORY_MAX_BYTES,
        }
    }
}

impl CacheConfig {
    /// Sets the root directory.
    pub fn with_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.root_dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets the audio cache cap in megabytes.
    pub fn with_audio_mb(mut self, mb: u64) -> Self {
        self.audio_max_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the image cache cap in megabytes.
    pub fn with_image_mb(mut self, mb: u64) -> Self {
        self.image_max_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the draft cache cap in megabytes.
    pub fn with_draft_mb(mut self, mb: u64) -> Self {
        self.draft_max_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the decoded-image memory budget in megabytes.
    pub fn with_image_memory_mb(mut self, mb: usize) -> Self {
        self.image_memory_max_bytes = mb.saturating_mul(MB as usize);
        self
    }

    /// Returns the default root for the current platform.
    ///
    /// - macOS: ~/Library/Caches/sidechain
    /// - Linux: ~/.cache/sidechain
    /// - Windows: %LOCALAPPDATA%\sidechain
    pub fn default_root_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(cache_dir) => cache_dir.join("sidechain"),
            None => PathBuf::from("cache"),
        }
    }

    /// Loads configuration from environment variables, starting from defaults.
    ///
    /// Environment variables:
    /// - `SIDECHAIN_CACHE_DIR`: root directory
    /// - `SIDECHAIN_AUDIO_CACHE_MB`: audio cache cap in MB (default: 5120)
    /// - `SIDECHAIN_IMAGE_CACHE_MB`: image cache cap in MB (default: 500)
    /// - `SIDECHAIN_DRAFT_CACHE_MB`: draft cache cap in MB (default: 100)
    /// - `SIDECHAIN_IMAGE_MEMORY_MB`: decoded-image budget in MB (default: 64)
    ///
    /// # Errors
    /// Returns an error if any variable holds something other than a whole number,
    /// or a size too large to represent in bytes.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SIDECHAIN_CACHE_DIR") {
            config.root_dir = PathBuf::from(val);
        }
        if let Some(bytes) = env_bytes("SIDECHAIN_AUDIO_CACHE_MB")? {
            config.audio_max_bytes = bytes;
        }
        if let Some(bytes) = env_bytes("SIDECHAIN_IMAGE_CACHE_MB")? {
            config.image_max_bytes = bytes;
        }
        if let Some(bytes) = env_bytes("SIDECHAIN_DRAFT_CACHE_MB")? {
            config.draft_max_bytes = bytes;
        }
        if let Some(bytes) = env_bytes("SIDECHAIN_IMAGE_MEMORY_MB")? {
            config.image_memory_max_bytes = usize::try_from(bytes)
                .map_err(|_| ConfigError::InvalidValue("SIDECHAIN_IMAGE_MEMORY_MB".to_string()))?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file; missing keys take their defaults.
    ///
    /// ```toml
    /// root_dir = "/var/cache/sidechain"
    /// audio_max_bytes = 5368709120
    /// image_max_bytes = 524288000
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root_dir.join(crate::audio::AUDIO_DIR)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root_dir.join(crate::images::IMAGE_DIR)
    }

    pub fn draft_dir(&self) -> PathBuf {
        self.root_dir.join(crate::draft::DRAFT_DIR)
    }
}

/// Reads a megabyte count from `name` and converts it to bytes
fn env_bytes(name: &str) -> Result<Option<u64>, ConfigError> {
    let Ok(val) = std::env::var(name) else {
        return Ok(None);
    };
    val.trim()
        .parse::<u64>()
        .ok()
        .and_then(|mb| mb.checked_mul(MB))
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue(name.to_string()))
}

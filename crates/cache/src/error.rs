//! Error types for the file caches and cache configuration

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while storing or loading cached files
#[derive(Debug, Error)]
pub enum CacheError {
    /// The file handed to `cache_file` does not exist
    #[error("source file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// A filesystem operation failed
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest could not be encoded
    #[error("manifest encoding failed: {0}")]
    Manifest(#[from] serde_json::Error),

    /// A cached image could not be decoded
    #[error("image decoding failed for {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while loading or saving a [`CacheConfig`](crate::CacheConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing the configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is not valid TOML for this schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

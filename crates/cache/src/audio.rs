//! Cache of downloaded audio files
//!
//! Audio is only ever handed out as a path for the player to stream from;
//! nothing here decodes it.

use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::file::FileCache;
use crate::key::UrlKey;

/// Subdirectory of the cache root holding audio
pub const AUDIO_DIR: &str = "audio";

/// Default cap: 5 GB
pub const DEFAULT_AUDIO_MAX_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Downloaded audio files keyed by their source URL
pub struct AudioCache {
    files: FileCache<UrlKey>,
}

impl AudioCache {
    /// Open the audio cache under `root`
    pub fn open(root: &Path, max_bytes: u64) -> Result<Self, CacheError> {
        Ok(Self {
            files: FileCache::open(root.join(AUDIO_DIR), max_bytes)?,
        })
    }

    /// Local path for `url`, if it has been cached
    pub fn get_audio_file(&self, url: &str) -> Option<PathBuf> {
        self.files.get_file(url)
    }

    /// Copy a downloaded file into the cache
    pub fn cache_audio_file(&self, url: &str, source: &Path) -> Option<PathBuf> {
        self.files.cache_file(url, source)
    }

    pub fn remove(&self, url: &str) -> bool {
        self.files.remove_file(url)
    }

    pub fn clear(&self) {
        self.files.clear();
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.files.flush()
    }

    /// Underlying file cache, for stats and size queries
    pub fn files(&self) -> &FileCache<UrlKey> {
        &self.files
    }
}

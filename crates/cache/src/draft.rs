//! Locally saved drafts
//!
//! Drafts are small and written from user input, so besides the file API
//! this offers byte-level save and load.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::CacheError;
use crate::file::FileCache;
use crate::key::{DraftKey, DraftKeys};

/// Subdirectory of the cache root holding drafts
pub const DRAFT_DIR: &str = "drafts";

/// Default cap: 100 MB
pub const DEFAULT_DRAFT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Drafts keyed by kind, context and id
pub struct DraftCache {
    files: FileCache<DraftKeys>,
}

impl DraftCache {
    /// Open the draft cache under `root`
    pub fn open(root: &Path, max_bytes: u64) -> Result<Self, CacheError> {
        Ok(Self {
            files: FileCache::open(root.join(DRAFT_DIR), max_bytes)?,
        })
    }

    /// Store `contents` as the draft for `key`, replacing any previous version
    pub fn save_draft(&self, key: &DraftKey, contents: &[u8]) -> Option<PathBuf> {
        self.files.cache_bytes(key, contents, Some("json"))
    }

    /// Contents of the draft for `key`, if one is saved
    pub fn load_draft(&self, key: &DraftKey) -> Option<Vec<u8>> {
        let path = self.files.get_file(key)?;
        match fs::read(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "Failed to read draft");
                None
            }
        }
    }

    /// Path of the draft file for `key`
    pub fn get_draft_file(&self, key: &DraftKey) -> Option<PathBuf> {
        self.files.get_file(key)
    }

    /// Copy an existing file (e.g. a recording) in as the draft for `key`
    pub fn cache_draft_file(&self, key: &DraftKey, source: &Path) -> Option<PathBuf> {
        self.files.cache_file(key, source)
    }

    pub fn remove_draft(&self, key: &DraftKey) -> bool {
        self.files.remove_file(key)
    }

    pub fn clear(&self) {
        self.files.clear();
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.files.flush()
    }

    pub fn files(&self) -> &FileCache<DraftKeys> {
        &self.files
    }
}

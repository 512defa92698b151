//! Persistent file cache backed by a JSON manifest
//!
//! Files are stored under the cache directory as `sha256(key)` in hex plus the
//! source extension. Each cache keeps a manifest of what it holds, rewritten on
//! every insertion and removal so a restart picks up where it left off. When a
//! write pushes usage past the cap, the least recently accessed files are
//! evicted until usage is at or below half the cap.

use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use crate::error::CacheError;
use crate::key::KeyStrategy;
use crate::manifest::{self, ManifestEntry, MANIFEST_FILE};

/// Distinguishes temp files of concurrent writers
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Statistics for monitoring a file cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCacheStats {
    /// Number of files currently cached
    pub entry_count: usize,
    /// Bytes on disk according to the manifest
    pub total_bytes: u64,
    /// Configured cap in bytes
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Files removed to get back under the cap
    pub evictions: u64,
    /// Entries dropped because their file had disappeared
    pub healed: u64,
}

impl FileCacheStats {
    /// Calculate cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate disk utilization (0.0 to 1.0)
    pub fn disk_utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.max_bytes as f64
        }
    }
}

struct FileCacheState {
    entries: HashMap<String, ManifestEntry>,
    total_bytes: u64,
    /// Last access time handed out in epoch milliseconds, so timestamps never repeat
    last_access_ms: u64,
    stats: FileCacheStats,
}

impl FileCacheState {
    /// Next access timestamp in epoch seconds, strictly greater than the last
    ///
    /// Ticks at millisecond resolution, which an `f64` of epoch seconds still
    /// represents exactly enough to keep distinct.
    fn next_access_time(&mut self) -> f64 {
        let now = epoch_millis().max(self.last_access_ms + 1);
        self.last_access_ms = now;
        now as f64 / 1000.0
    }

    fn remove_entry(&mut self, key: &str) -> Option<ManifestEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.file_size);
        Some(entry)
    }
}

/// Manifest-backed cache of files on disk
///
/// `S` decides how domain keys map to the stored key string; see
/// [`UrlKey`](crate::UrlKey) and [`DraftKeys`](crate::DraftKeys).
pub struct FileCache<S: KeyStrategy> {
    dir: PathBuf,
    manifest_path: PathBuf,
    max_bytes: u64,
    state: Mutex<FileCacheState>,
    _strategy: PhantomData<fn() -> S>,
}

impl<S: KeyStrategy> FileCache<S> {
    /// Open (or create) a cache in `dir` holding at most `max_bytes`
    ///
    /// Existing contents are restored from the manifest. A `max_bytes` of 0
    /// disables eviction.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let mut entries = HashMap::new();
        for entry in manifest::load(&manifest_path) {
            entries.insert(entry.key.clone(), entry);
        }
        let total_bytes = entries.values().map(|e| e.file_size).sum();
        let last_access_ms = entries
            .values()
            .map(|e| (e.last_access_time * 1000.0).ceil().max(0.0) as u64)
            .max()
            .unwrap_or(0);

        info!(
            dir = %dir.display(),
            entries = entries.len(),
            bytes = total_bytes,
            max_bytes,
            "Opened file cache"
        );

        Ok(Self {
            dir,
            manifest_path,
            max_bytes,
            state: Mutex::new(FileCacheState {
                entries,
                total_bytes,
                last_access_ms,
                stats: FileCacheStats::default(),
            }),
            _strategy: PhantomData,
        })
    }

    fn lock(&self) -> MutexGuard<'_, FileCacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the cached file for `key`, if present
    ///
    /// A hit refreshes the entry's access time. An entry whose file has been
    /// deleted behind the cache's back is dropped and reported as a miss.
    pub fn get_file(&self, key: &S::Key) -> Option<PathBuf> {
        let cache_key = S::cache_key(key);
        let mut state = self.lock();

        let filename = match state.entries.get(&cache_key) {
            Some(entry) => entry.filename.clone(),
            None => {
                state.stats.misses += 1;
                trace!(key = %cache_key, "File cache miss");
                return None;
            }
        };

        let path = self.dir.join(&filename);
        if !path.is_file() {
            state.remove_entry(&cache_key);
            state.stats.misses += 1;
            state.stats.healed += 1;
            warn!(
                key = %cache_key,
                path = %path.display(),
                "Cached file disappeared, dropping entry"
            );
            self.persist(&state);
            return None;
        }

        let now = state.next_access_time();
        if let Some(entry) = state.entries.get_mut(&cache_key) {
            entry.last_access_time = now;
        }
        state.stats.hits += 1;
        trace!(key = %cache_key, "File cache hit");
        Some(path)
    }

    /// Copy `source` into the cache under `key`
    ///
    /// Returns the cached path, or `None` (with a warning logged) if the copy
    /// failed. Use [`try_cache_file`](Self::try_cache_file) to get the error.
    pub fn cache_file(&self, key: &S::Key, source: &Path) -> Option<PathBuf> {
        match self.try_cache_file(key, source) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(key = %S::cache_key(key), error = %e, "Failed to cache file");
                None
            }
        }
    }

    /// Copy `source` into the cache under `key`
    ///
    /// # Errors
    /// [`CacheError::SourceMissing`] if `source` is not a file, or
    /// [`CacheError::Io`] if the copy fails.
    pub fn try_cache_file(&self, key: &S::Key, source: &Path) -> Result<PathBuf, CacheError> {
        if !source.is_file() {
            return Err(CacheError::SourceMissing(source.to_path_buf()));
        }
        let extension = source.extension().and_then(|ext| ext.to_str());
        self.store(key, extension, |tmp| fs::copy(source, tmp))
    }

    /// Write `bytes` into the cache under `key`
    ///
    /// Returns `None` (with a warning logged) on failure.
    pub fn cache_bytes(
        &self,
        key: &S::Key,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Option<PathBuf> {
        let stored = self.store(key, extension, |tmp| {
            fs::write(tmp, bytes)?;
            Ok(bytes.len() as u64)
        });
        match stored {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(key = %S::cache_key(key), error = %e, "Failed to cache bytes");
                None
            }
        }
    }

    fn store(
        &self,
        key: &S::Key,
        extension: Option<&str>,
        write: impl FnOnce(&Path) -> io::Result<u64>,
    ) -> Result<PathBuf, CacheError> {
        let cache_key = S::cache_key(key);
        let filename = hashed_filename(&cache_key, extension);
        let path = self.dir.join(&filename);

        let tmp = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            filename,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let file_size = match write(&tmp) {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(CacheError::io(&tmp, e));
            }
        };

        {
            // Rename under the index lock so eviction or removal of the same
            // key cannot delete the file between rename and insert
            let mut state = self.lock();
            if let Err(e) = fs::rename(&tmp, &path) {
                let _ = fs::remove_file(&tmp);
                return Err(CacheError::io(&path, e));
            }
            let last_access_time = state.next_access_time();
            if let Some(previous) = state.remove_entry(&cache_key) {
                if previous.filename != filename {
                    remove_quietly(&self.dir.join(&previous.filename));
                }
            }
            state.total_bytes += file_size;
            state.entries.insert(
                cache_key.clone(),
                ManifestEntry {
                    key: cache_key.clone(),
                    filename,
                    file_size,
                    last_access_time,
                },
            );
            self.persist(&state);
            debug!(
                key = %cache_key,
                bytes = file_size,
                total = state.total_bytes,
                "Cached file"
            );
        }

        self.evict_if_needed(&cache_key);
        Ok(path)
    }

    /// Evict least recently accessed files until usage is at most half the cap
    ///
    /// `keep` is the entry just written; it is never a victim of its own insert.
    fn evict_if_needed(&self, keep: &str) {
        let mut state = self.lock();
        if self.max_bytes == 0 || state.total_bytes <= self.max_bytes {
            return;
        }

        let target = self.max_bytes / 2;
        let mut by_age: Vec<(f64, String)> = state
            .entries
            .values()
            .filter(|entry| entry.key != keep)
            .map(|entry| (entry.last_access_time, entry.key.clone()))
            .collect();
        by_age.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let before = state.total_bytes;
        let mut evicted = 0u64;
        for (_, key) in by_age {
            if state.total_bytes <= target {
                break;
            }
            if let Some(entry) = state.remove_entry(&key) {
                remove_quietly(&self.dir.join(&entry.filename));
                evicted += 1;
            }
        }

        state.stats.evictions += evicted;
        self.persist(&state);
        info!(
            dir = %self.dir.display(),
            evicted,
            freed_bytes = before - state.total_bytes,
            total = state.total_bytes,
            "Evicted cached files"
        );
    }

    /// Remove `key` and its file; returns whether it was cached
    pub fn remove_file(&self, key: &S::Key) -> bool {
        let cache_key = S::cache_key(key);
        let mut state = self.lock();
        match state.remove_entry(&cache_key) {
            Some(entry) => {
                remove_quietly(&self.dir.join(&entry.filename));
                self.persist(&state);
                debug!(key = %cache_key, "Removed cached file");
                true
            }
            None => false,
        }
    }

    /// Remove every cached file
    pub fn clear(&self) {
        let mut state = self.lock();
        for (_, entry) in state.entries.drain() {
            remove_quietly(&self.dir.join(&entry.filename));
        }
        state.total_bytes = 0;
        self.persist(&state);
        info!(dir = %self.dir.display(), "Cleared file cache");
    }

    /// Write the manifest, including access times refreshed by lookups
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be written.
    pub fn flush(&self) -> Result<(), CacheError> {
        let state = self.lock();
        let entries: Vec<ManifestEntry> = state.entries.values().cloned().collect();
        manifest::save(&self.manifest_path, &entries)
    }

    fn persist(&self, state: &FileCacheState) {
        let entries: Vec<ManifestEntry> = state.entries.values().cloned().collect();
        if let Err(e) = manifest::save(&self.manifest_path, &entries) {
            warn!(
                path = %self.manifest_path.display(),
                error = %e,
                "Failed to write cache manifest"
            );
        }
    }

    /// Check for `key` without touching its access time or the filesystem
    pub fn contains(&self, key: &S::Key) -> bool {
        self.lock().entries.contains_key(&S::cache_key(key))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes on disk according to the manifest
    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> FileCacheStats {
        let state = self.lock();
        FileCacheStats {
            entry_count: state.entries.len(),
            total_bytes: state.total_bytes,
            max_bytes: self.max_bytes,
            ..state.stats.clone()
        }
    }
}

/// `sha256(key)` in hex, plus `.extension` when there is one
pub fn hashed_filename(key: &str, extension: Option<&str>) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", digest, ext),
        _ => digest,
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete cached file");
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

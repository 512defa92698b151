//! Sidechain Cache Library
//!
//! Bounded in-memory cache with TTL and LRU eviction, plus manifest-backed
//! file caches for audio, images and drafts.
//!
//! # Example
//!
//! ```no_run
//! use sidechain_cache::{CacheConfig, Caches};
//!
//! let caches = Caches::open(&CacheConfig::from_env()?)?;
//! if let Some(path) = caches.audio.get_audio_file("https://cdn.example/loop.wav") {
//!     println!("playing {}", path.display());
//! }
//! caches.flush_all();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod draft;
pub mod error;
pub mod file;
pub mod images;
pub mod key;
pub mod manifest;
pub mod memory;

pub use audio::AudioCache;
pub use config::CacheConfig;
pub use draft::DraftCache;
pub use error::{CacheError, ConfigError};
pub use file::{FileCache, FileCacheStats};
pub use images::ImageCache;
pub use key::{DraftKey, DraftKeys, KeyStrategy, UrlKey};
pub use memory::{CacheStats, MemoryCache, MemoryCacheConfig, RemovalCause, Ttl};

use tracing::{info, warn};

/// The audio, image and draft caches sharing one root directory
pub struct Caches {
    pub audio: AudioCache,
    pub images: ImageCache,
    pub drafts: DraftCache,
}

impl Caches {
    /// Open every cache under `config.root_dir`
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let root = config.root_dir.as_path();
        let caches = Self {
            audio: AudioCache::open(root, config.audio_max_bytes)?,
            images: ImageCache::open(root, config.image_max_bytes, config.image_memory_max_bytes)?,
            drafts: DraftCache::open(root, config.draft_max_bytes)?,
        };
        info!(root = %root.display(), "Opened caches");
        Ok(caches)
    }

    /// Write every manifest, e.g. on shutdown
    ///
    /// Failures are logged; returns how many caches failed to flush.
    pub fn flush_all(&self) -> usize {
        let results = [
            ("audio", self.audio.flush()),
            ("images", self.images.flush()),
            ("drafts", self.drafts.flush()),
        ];
        let mut failed = 0;
        for (name, result) in results {
            if let Err(e) = result {
                warn!(cache = name, error = %e, "Failed to flush cache manifest");
                failed += 1;
            }
        }
        failed
    }

    /// Remove everything from every cache
    pub fn clear_all(&self) {
        self.audio.clear();
        self.images.clear();
        self.drafts.clear();
    }
}

//! Cache of downloaded images
//!
//! Two tiers: the encoded file on disk, and the decoded image in memory. A
//! disk hit with nothing decoded yet is decoded once and kept in memory,
//! weighed by its RGBA size.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::file::FileCache;
use crate::key::UrlKey;
use crate::memory::{CacheStats, MemoryCache, MemoryCacheConfig, Ttl};

/// Subdirectory of the cache root holding images
pub const IMAGE_DIR: &str = "images";

/// Default disk cap: 500 MB
pub const DEFAULT_IMAGE_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Default decoded-image budget: 64 MB
pub const DEFAULT_IMAGE_MEMORY_MAX_BYTES: usize = 64 * 1024 * 1024;

fn decoded_size(image: &Arc<DynamicImage>) -> usize {
    image.width() as usize * image.height() as usize * 4
}

/// Images keyed by their source URL
pub struct ImageCache {
    files: FileCache<UrlKey>,
    decoded: MemoryCache<String, Arc<DynamicImage>>,
}

impl ImageCache {
    /// Open the image cache under `root`
    ///
    /// # Arguments
    /// * `max_bytes` - cap for encoded files on disk
    /// * `memory_max_bytes` - budget for decoded images held in memory
    pub fn open(root: &Path, max_bytes: u64, memory_max_bytes: usize) -> Result<Self, CacheError> {
        let decoded = MemoryCache::new(MemoryCacheConfig::new(0).with_max_bytes(memory_max_bytes))
            .with_weigher(decoded_size);
        Ok(Self {
            files: FileCache::open(root.join(IMAGE_DIR), max_bytes)?,
            decoded,
        })
    }

    /// Local path of the encoded image for `url`
    pub fn get_image_file(&self, url: &str) -> Option<PathBuf> {
        self.files.get_file(url)
    }

    /// Decoded image for `url`
    ///
    /// Returns `None` on a miss, or if the cached file cannot be decoded.
    pub fn get_image(&self, url: &str) -> Option<Arc<DynamicImage>> {
        match self.load_decoded(url) {
            Ok(image) => image,
            Err(e) => {
                warn!(url, error = %e, "Failed to decode cached image");
                None
            }
        }
    }

    fn load_decoded(&self, url: &str) -> Result<Option<Arc<DynamicImage>>, CacheError> {
        let key = url.to_string();
        if let Some(image) = self.decoded.get(&key) {
            return Ok(Some(image));
        }

        let Some(path) = self.files.get_file(url) else {
            return Ok(None);
        };
        let image = image::open(&path).map_err(|source| CacheError::Decode {
            path: path.clone(),
            source,
        })?;
        debug!(
            url,
            width = image.width(),
            height = image.height(),
            "Decoded cached image"
        );

        let image = Arc::new(image);
        self.decoded.put(key, image.clone(), Ttl::Never);
        Ok(Some(image))
    }

    /// Copy a downloaded image into the cache
    ///
    /// Any decoded copy of the previous image for `url` is discarded.
    pub fn cache_image(&self, url: &str, source: &Path) -> Option<PathBuf> {
        self.decoded.remove(&url.to_string());
        self.files.cache_file(url, source)
    }

    pub fn remove(&self, url: &str) -> bool {
        self.decoded.remove(&url.to_string());
        self.files.remove_file(url)
    }

    pub fn clear(&self) {
        self.decoded.clear();
        self.files.clear();
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.files.flush()
    }

    pub fn files(&self) -> &FileCache<UrlKey> {
        &self.files
    }

    /// Statistics of the decoded-image tier
    pub fn memory_stats(&self) -> CacheStats {
        self.decoded.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 4]) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba(color))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn open_default(root: &TempDir) -> ImageCache {
        ImageCache::open(
            root.path(),
            DEFAULT_IMAGE_MAX_BYTES,
            DEFAULT_IMAGE_MEMORY_MAX_BYTES,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_once_then_memory_hit() {
        let root = TempDir::new().unwrap();
        let cache = open_default(&root);
        let source = write_png(root.path(), "avatar.png", 8, 4, [255, 0, 0, 255]);
        let url = "https://cdn.example/avatar.png";

        cache.cache_image(url, &source).unwrap();
        let first = cache.get_image(url).unwrap();
        assert_eq!((first.width(), first.height()), (8, 4));

        let second = cache.get_image(url).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.memory_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.memory_used, 8 * 4 * 4);
        assert_eq!(cache.files().stats().hits, 1);
    }

    #[test]
    fn test_recache_invalidates_decoded() {
        let root = TempDir::new().unwrap();
        let cache = open_default(&root);
        let url = "https://cdn.example/cover.png";

        let old = write_png(root.path(), "old.png", 2, 2, [0, 0, 0, 255]);
        cache.cache_image(url, &old).unwrap();
        assert_eq!(cache.get_image(url).unwrap().width(), 2);

        let new = write_png(root.path(), "new.png", 6, 6, [9, 9, 9, 255]);
        cache.cache_image(url, &new).unwrap();
        assert_eq!(cache.get_image(url).unwrap().width(), 6);
    }

    #[test]
    fn test_undecodable_file() {
        let root = TempDir::new().unwrap();
        let cache = open_default(&root);
        let bogus = root.path().join("bogus.png");
        fs::write(&bogus, b"not a png").unwrap();

        cache.cache_image("u", &bogus).unwrap();
        assert!(cache.get_image("u").is_none());
        assert!(matches!(cache.load_decoded("u"), Err(CacheError::Decode { .. })));
        assert!(cache.get_image_file("u").is_some());
    }

    #[test]
    fn test_memory_budget_evicts_decoded() {
        let root = TempDir::new().unwrap();
        let budget = 10 * 10 * 4 * 2;
        let cache = ImageCache::open(root.path(), DEFAULT_IMAGE_MAX_BYTES, budget).unwrap();
        for i in 0..3 {
            let name = format!("{}.png", i);
            let source = write_png(root.path(), &name, 10, 10, [i as u8, 0, 0, 255]);
            let url = format!("https://cdn.example/{}.png", i);
            cache.cache_image(&url, &source).unwrap();
            cache.get_image(&url).unwrap();
        }

        let stats = cache.memory_stats();
        assert_eq!(stats.entry_count, 2);
        assert!(stats.memory_used <= budget);
        assert_eq!(cache.files().len(), 3);
    }

    #[test]
    fn test_miss() {
        let root = TempDir::new().unwrap();
        let cache = ImageCache::open(root.path(), 1024, 1024).unwrap();
        assert!(cache.get_image("https://cdn.example/none.png").is_none());
    }
}

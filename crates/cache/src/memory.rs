//! In-memory cache with TTL expiry and LRU eviction
//!
//! Entries expire after their time-to-live and are evicted least recently
//! used first whenever the entry-count or byte-size bound is exceeded.
//! Lookups take a shared lock and refresh recency through atomics, so
//! concurrent readers never serialize on each other.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Time-to-live for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the cache's configured default
    #[default]
    Default,

    /// Never expire
    Never,

    /// Expire once this much time has passed since insertion; zero never expires
    After(Duration),
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::After(duration)
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Its time-to-live ran out
    Expired,

    /// Evicted to satisfy the size bounds
    Evicted,

    /// Overwritten by a `put` for the same key
    Replaced,

    /// Removed explicitly
    Removed,

    /// Dropped by `clear`
    Cleared,
}

/// Bounds and defaults for a [`MemoryCache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries (0 = unbounded)
    pub max_entries: usize,

    /// Maximum total weight in bytes (0 = unbounded)
    pub max_bytes: usize,

    /// TTL applied by [`Ttl::Default`]; `None` means entries never expire
    pub default_ttl: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 0,
            default_ttl: None,
        }
    }
}

impl MemoryCacheConfig {
    /// Create a configuration bounded to `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_mb(self, megabytes: usize) -> Self {
        self.with_max_bytes(megabytes * 1024 * 1024)
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of entries currently cached
    pub entry_count: usize,

    /// Total weight of cached entries (bytes)
    pub memory_used: usize,

    /// Byte bound (0 = unbounded)
    pub memory_limit: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Entries evicted to satisfy the bounds
    pub evictions: u64,

    /// Entries dropped because they expired
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Computes the weight of a value in bytes
pub type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Called for every entry that leaves the cache
pub type RemovalListener<K, V> = Arc<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Option<Duration>,
    size_bytes: usize,
    /// Nanoseconds since the cache epoch at the last access
    last_accessed_at: AtomicU64,
    /// Strictly increasing access sequence; orders entries touched within one clock tick
    access_seq: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.created_at) > ttl)
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    memory_used: usize,
}

type Removed<K, V> = Vec<(K, V, RemovalCause)>;

/// Thread-safe key/value cache with TTL expiry and LRU eviction
///
/// # Example
///
/// ```
/// use sidechain_cache::{MemoryCache, MemoryCacheConfig, Ttl};
/// use std::time::Duration;
///
/// let cache: MemoryCache<String, Vec<u8>> =
///     MemoryCache::new(MemoryCacheConfig::new(100).with_max_mb(16))
///         .with_weigher(|bytes: &Vec<u8>| bytes.len());
///
/// cache.put("avatar:42".to_string(), vec![0u8; 1024], Ttl::After(Duration::from_secs(300)));
///
/// if let Some(bytes) = cache.get(&"avatar:42".to_string()) {
///     println!("Cache hit: {} bytes", bytes.len());
/// }
///
/// let stats = cache.stats();
/// println!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
/// ```
pub struct MemoryCache<K, V> {
    state: RwLock<CacheState<K, V>>,
    config: MemoryCacheConfig,
    weigher: Weigher<V>,
    listener: RwLock<Option<RemovalListener<K, V>>>,
    epoch: Instant,
    access_clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
{
    /// Create a cache with the given bounds
    ///
    /// Entries weigh `size_of::<V>()` bytes unless a weigher is installed
    /// with [`MemoryCache::with_weigher`].
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                memory_used: 0,
            }),
            config,
            weigher: Arc::new(|_: &V| std::mem::size_of::<V>()),
            listener: RwLock::new(None),
            epoch: Instant::now(),
            access_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Create a cache bounded only by entry count
    pub fn with_capacity(max_entries: usize) -> Self {
        Self::new(MemoryCacheConfig::new(max_entries))
    }

    /// Weigh entries with `weigher` instead of `size_of::<V>()`
    pub fn with_weigher(mut self, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        self.weigher = Arc::new(weigher);
        self
    }

    /// Install a callback for entries leaving the cache
    ///
    /// The callback runs after the cache lock is released, so it may call
    /// back into the cache.
    pub fn set_removal_listener(
        &self,
        listener: impl Fn(&K, &V, RemovalCause) + Send + Sync + 'static,
    ) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    /// Store a value, weighing it with the cache's weigher
    ///
    /// Replaces any existing entry for `key`, then evicts least recently
    /// used entries until both bounds hold. The entry being inserted is never
    /// evicted by its own insertion, even if it alone exceeds the byte bound.
    ///
    /// # Arguments
    ///
    /// * `key` - Cache key
    /// * `value` - Value to store
    /// * `ttl` - Time-to-live for this entry
    pub fn put(&self, key: K, value: V, ttl: impl Into<Ttl>) {
        let size = (self.weigher)(&value);
        self.put_sized(key, value, size, ttl);
    }

    /// Store a value with an explicit weight in bytes
    pub fn put_sized(&self, key: K, value: V, size_bytes: usize, ttl: impl Into<Ttl>) {
        // A zero TTL means the entry never expires
        let ttl = match ttl.into() {
            Ttl::Default => self.config.default_ttl,
            Ttl::Never => None,
            Ttl::After(duration) => Some(duration),
        }
        .filter(|ttl| !ttl.is_zero());

        let now = Instant::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            ttl,
            size_bytes,
            last_accessed_at: AtomicU64::new(self.nanos_since_epoch(now)),
            access_seq: AtomicU64::new(self.next_access()),
        };

        let mut removed = Vec::new();
        {
            let mut state = self.write_state();
            state.memory_used += size_bytes;
            if let Some(old) = state.entries.insert(key.clone(), entry) {
                state.memory_used = state.memory_used.saturating_sub(old.size_bytes);
                removed.push((key.clone(), old.value, RemovalCause::Replaced));
            }
            self.evict_to_fit(&mut state, &key, &mut removed);
        }
        self.notify(removed);
    }

    /// Retrieve a value, refreshing its recency
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let state = self.read_state();
            match state.entries.get(key) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    trace!(key = ?key, "Memory cache miss");
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    self.touch(entry, now);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade to the write lock and re-check before removing
        let mut removed = Vec::new();
        {
            let mut state = self.write_state();
            if state.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
                if let Some(entry) = state.entries.remove(key) {
                    state.memory_used = state.memory_used.saturating_sub(entry.size_bytes);
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                    removed.push((key.clone(), entry.value, RemovalCause::Expired));
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = ?key, "Memory cache entry expired");
        self.notify(removed);
        None
    }

    /// Return the cached value, or compute, store and return a new one
    ///
    /// `factory` runs without any lock held. Two threads missing on the same
    /// key at once may both run it; the later `put` wins.
    pub fn get_or_create(&self, key: K, factory: impl FnOnce() -> V, ttl: impl Into<Ttl>) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = factory();
        self.put(key, value.clone(), ttl);
        value
    }

    /// Check if a live entry exists without updating recency
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.read_state()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove an entry
    ///
    /// # Returns
    ///
    /// The removed value, or `None` if it wasn't in the cache
    pub fn remove(&self, key: &K) -> Option<V> {
        let entry = {
            let mut state = self.write_state();
            let entry = state.entries.remove(key)?;
            state.memory_used = state.memory_used.saturating_sub(entry.size_bytes);
            entry
        };
        let value = entry.value.clone();
        self.notify(vec![(key.clone(), entry.value, RemovalCause::Removed)]);
        Some(value)
    }

    /// Remove every entry
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut state = self.write_state();
            state.memory_used = 0;
            state.entries.drain().collect()
        };
        let removed = drained
            .into_iter()
            .map(|(key, entry)| (key, entry.value, RemovalCause::Cleared))
            .collect();
        self.notify(removed);
    }

    /// Remove every expired entry
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = Vec::new();
        {
            let mut state = self.write_state();
            let expired: Vec<K> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                if let Some(entry) = state.entries.remove(&key) {
                    state.memory_used = state.memory_used.saturating_sub(entry.size_bytes);
                    removed.push((key, entry.value, RemovalCause::Expired));
                }
            }
        }

        let count = removed.len();
        if count > 0 {
            self.expirations.fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, "Removed expired memory cache entries");
        }
        self.notify(removed);
        count
    }

    /// Get the number of entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the total weight of cached entries in bytes
    pub fn memory_used(&self) -> usize {
        self.read_state().memory_used
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.read_state();
        CacheStats {
            entry_count: state.entries.len(),
            memory_used: state.memory_used,
            memory_limit: self.config.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn over_bounds(&self, state: &CacheState<K, V>) -> bool {
        (self.config.max_entries > 0 && state.entries.len() > self.config.max_entries)
            || (self.config.max_bytes > 0 && state.memory_used > self.config.max_bytes)
    }

    /// Evict least recently used entries, never `keep`, until both bounds hold
    fn evict_to_fit(&self, state: &mut CacheState<K, V>, keep: &K, removed: &mut Removed<K, V>) {
        if !self.over_bounds(state) {
            return;
        }

        let mut by_age: Vec<(u64, K)> = state
            .entries
            .iter()
            .filter(|(key, _)| *key != keep)
            .map(|(key, entry)| (entry.access_seq.load(Ordering::Relaxed), key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(seq, _)| *seq);

        let mut evicted = 0u64;
        for (_, victim) in by_age {
            if !self.over_bounds(state) {
                break;
            }
            if let Some(entry) = state.entries.remove(&victim) {
                state.memory_used = state.memory_used.saturating_sub(entry.size_bytes);
                trace!(
                    key = ?victim,
                    idle_ms = self.idle_millis(&entry),
                    "Evicting memory cache entry"
                );
                removed.push((victim, entry.value, RemovalCause::Evicted));
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!(
                evicted,
                entries = state.entries.len(),
                bytes = state.memory_used,
                "Evicted memory cache entries"
            );
        }
    }

    fn touch(&self, entry: &CacheEntry<V>, now: Instant) {
        entry
            .last_accessed_at
            .store(self.nanos_since_epoch(now), Ordering::Relaxed);
        entry.access_seq.store(self.next_access(), Ordering::Relaxed);
    }

    fn idle_millis(&self, entry: &CacheEntry<V>) -> u64 {
        let now = self.nanos_since_epoch(Instant::now());
        now.saturating_sub(entry.last_accessed_at.load(Ordering::Relaxed)) / 1_000_000
    }

    fn next_access(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    fn nanos_since_epoch(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_nanos() as u64
    }

    fn notify(&self, removed: Removed<K, V>) {
        if removed.is_empty() {
            return;
        }
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            for (key, value, cause) in &removed {
                listener(key, value, *cause);
            }
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState<K, V>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState<K, V>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
{
    /// Create a cache holding up to 1000 entries
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    fn bytes_cache(config: MemoryCacheConfig) -> MemoryCache<&'static str, Vec<u8>> {
        MemoryCache::new(config).with_weigher(|v: &Vec<u8>| v.len())
    }

    #[test]
    fn test_basic_put_get() {
        let cache = MemoryCache::with_capacity(10);
        cache.put("a", 1u32, Ttl::Never);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"a"));
    }

    #[test]
    fn test_cache_miss() {
        let cache: MemoryCache<u64, u64> = MemoryCache::default();

        assert!(cache.get(&999).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::with_capacity(2);
        cache.put("A", 1, Ttl::Never);
        cache.put("B", 2, Ttl::Never);
        assert_eq!(cache.get(&"A"), Some(1));
        cache.put("C", 3, Ttl::Never);

        assert!(cache.get(&"B").is_none());
        assert_eq!(cache.get(&"A"), Some(1));
        assert_eq!(cache.get(&"C"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::with_capacity(10);
        cache.put("short", "v", Duration::from_millis(100));

        assert_eq!(cache.get(&"short"), Some("v"));
        thread::sleep(Duration::from_millis(150));
        assert!(cache.get(&"short").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let config = MemoryCacheConfig::new(10).with_default_ttl(Duration::ZERO);
        let cache = MemoryCache::new(config);
        cache.put("explicit", 1, Duration::ZERO);
        cache.put("default", 2, Ttl::Default);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.cleanup_expired(), 0);
        assert_eq!(cache.get(&"explicit"), Some(1));
        assert_eq!(cache.get(&"default"), Some(2));
        assert_eq!(cache.stats().expirations, 0);
    }

    #[test]
    fn test_default_ttl_and_never() {
        let config = MemoryCacheConfig::new(10).with_default_ttl(Duration::from_millis(20));
        let cache = MemoryCache::new(config);
        cache.put("default", 1, Ttl::Default);
        cache.put("never", 2, Ttl::Never);

        thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&"default").is_none());
        assert_eq!(cache.get(&"never"), Some(2));
    }

    #[test]
    fn test_byte_bound_evicts_oldest() {
        let cache = bytes_cache(MemoryCacheConfig::new(0).with_max_bytes(1000));
        cache.put("one", vec![0u8; 400], Ttl::Never);
        cache.put("two", vec![0u8; 400], Ttl::Never);
        cache.put("three", vec![0u8; 400], Ttl::Never);

        assert!(!cache.contains(&"one"));
        assert!(cache.contains(&"two"));
        assert!(cache.contains(&"three"));
        assert_eq!(cache.memory_used(), 800);
    }

    #[test]
    fn test_oversized_entry_is_kept() {
        let cache = bytes_cache(MemoryCacheConfig::new(0).with_max_bytes(100));
        cache.put("small", vec![0u8; 50], Ttl::Never);
        cache.put("huge", vec![0u8; 500], Ttl::Never);

        assert!(!cache.contains(&"small"));
        assert!(cache.contains(&"huge"));
        assert_eq!(cache.memory_used(), 500);
    }

    #[test]
    fn test_update_existing_entry() {
        let cache = bytes_cache(MemoryCacheConfig::new(10));
        cache.put("k", vec![0u8; 10], Ttl::Never);
        cache.put("k", vec![1u8; 30], Ttl::Never);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_used(), 30);
        assert_eq!(cache.get(&"k"), Some(vec![1u8; 30]));
    }

    #[test]
    fn test_get_or_create() {
        let cache = MemoryCache::with_capacity(10);
        let mut calls = 0;
        let first = cache.get_or_create(
            "k",
            || {
                calls += 1;
                "made"
            },
            Ttl::Never,
        );
        let second = cache.get_or_create("k", || "remade", Ttl::Never);

        assert_eq!(first, "made");
        assert_eq!(second, "made");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::with_capacity(10);
        cache.put(1, "a", Ttl::Never);
        cache.put(2, "b", Ttl::Never);
        cache.put(3, "c", Ttl::Never);

        assert_eq!(cache.remove(&1), Some("a"));
        assert_eq!(cache.remove(&1), None);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_used(), 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = MemoryCache::with_capacity(10);
        cache.put("a", 1, Duration::from_millis(10));
        cache.put("b", 2, Duration::from_millis(10));
        cache.put("c", 3, Ttl::Never);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_removal_listener_causes() {
        let cache = MemoryCache::with_capacity(1);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        cache.set_removal_listener(move |key: &&str, _value: &u32, cause| {
            sink.lock().unwrap().push((*key, cause));
        });

        cache.put("a", 1, Ttl::Never);
        cache.put("a", 2, Ttl::Never);
        cache.put("b", 3, Ttl::Never);
        cache.remove(&"b");
        cache.put("c", 4, Ttl::Never);
        cache.clear();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ("a", RemovalCause::Replaced),
                ("a", RemovalCause::Evicted),
                ("b", RemovalCause::Removed),
                ("c", RemovalCause::Cleared),
            ]
        );
    }

    #[test]
    fn test_listener_may_reenter_cache() {
        let cache = Arc::new(MemoryCache::with_capacity(1));
        let inner = cache.clone();
        cache.set_removal_listener(move |_key: &u32, _value: &u32, _cause| {
            let _ = inner.len();
        });

        cache.put(1, 1, Ttl::Never);
        cache.put(2, 2, Ttl::Never);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats() {
        let cache = MemoryCache::with_capacity(10);
        cache.put("a", 1, Ttl::Never);
        cache.get(&"a");
        cache.get(&"a");
        cache.get(&"missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<MemoryCache<String, Vec<u8>>> = Arc::new(
            MemoryCache::new(MemoryCacheConfig::new(50).with_max_bytes(50 * 64))
                .with_weigher(|v: &Vec<u8>| v.len()),
        );

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("key-{}", i);
                        if (i + t) % 3 == 0 {
                            cache.put(key, vec![t as u8; 64], Ttl::Never);
                        } else {
                            let _ = cache.get(&key);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.entry_count <= 50);
        assert!(stats.memory_used <= 50 * 64);
    }
}

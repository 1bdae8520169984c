//! LRU cache implementation for PDF objects
//!
//! Caches resolved indirect objects so shared objects (fonts, pages,
//! resources) are parsed once. The cache sits behind a reader/writer lock and
//! is only ever locked to look up or commit a finished object; parsing happens
//! outside the lock.

use crate::objects::ObjectId;
use crate::parser::objects::PdfObject;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

struct Slot<V> {
    value: V,
    tick: u64,
    inserted: Instant,
}

/// Generic LRU (Least Recently Used) cache.
///
/// A capacity of 0 means unbounded.
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, Slot<V>>,
    /// Recency order: lowest tick is least recently used
    order: BTreeMap<u64, K>,
    tick: u64,
    evictions: u64,
}

impl<K: Clone + Eq + Hash, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let slot = self.map.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, key.clone());
        Some(&slot.value)
    }

    /// Get a value without touching its recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or replace a value, evicting the oldest entries past capacity.
    /// Returns the number of evictions.
    pub fn put(&mut self, key: K, value: V) -> usize {
        let tick = self.next_tick();
        if let Some(old) = self.map.insert(
            key.clone(),
            Slot {
                value,
                tick,
                inserted: Instant::now(),
            },
        ) {
            self.order.remove(&old.tick);
        }
        self.order.insert(tick, key);
        self.evict_excess()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    fn evict_excess(&mut self) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        let mut evicted = 0;
        while self.map.len() > self.capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.map.remove(&key);
            evicted += 1;
        }
        self.evictions += evicted as u64;
        evicted
    }

    /// Change the capacity; shrinking evicts immediately
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity;
        self.evict_excess()
    }

    /// Drop entries inserted more than `ttl` ago
    pub fn evict_expired(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .map
            .iter()
            .filter(|(_, slot)| now.duration_since(slot.inserted) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.evictions += expired.len() as u64;
        expired.len()
    }

    /// Keep only the entries `keep` accepts
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        let doomed: Vec<K> = self.map.keys().filter(|k| !keep(k)).cloned().collect();
        for key in &doomed {
            self.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }
}

/// Cache key: the owning document's namespace plus the object identity
type CacheKey = (u64, ObjectId);

static NEXT_NAMESPACE: AtomicU64 = AtomicU64::new(1);

struct Shared {
    lru: RwLock<LruCache<CacheKey, Arc<PdfObject>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Thread-safe cache for resolved PDF objects.
///
/// Cloning yields another handle to the same cache, which is how several
/// documents can share one. Each document resolves under its own namespace.
#[derive(Clone)]
pub struct ObjectCache {
    shared: Arc<Shared>,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                lru: RwLock::new(LruCache::new(capacity)),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// A namespace no other document uses
    pub fn new_namespace() -> u64 {
        NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up an object, promoting it to most recently used
    pub fn get(&self, namespace: u64, id: ObjectId) -> Option<Arc<PdfObject>> {
        let found = match self.shared.lru.write() {
            Ok(mut lru) => lru.get(&(namespace, id)).cloned(),
            Err(_) => None,
        };
        let counter = if found.is_some() {
            &self.shared.hits
        } else {
            &self.shared.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Whether an object is cached, without touching recency or stats
    pub fn contains(&self, namespace: u64, id: ObjectId) -> bool {
        self.shared
            .lru
            .read()
            .map(|lru| lru.contains(&(namespace, id)))
            .unwrap_or(false)
    }

    pub fn put(&self, namespace: u64, id: ObjectId, object: Arc<PdfObject>) {
        if let Ok(mut lru) = self.shared.lru.write() {
            let evicted = lru.put((namespace, id), object);
            if evicted > 0 {
                trace!("Object cache evicted {evicted} entries");
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut lru) = self.shared.lru.write() {
            lru.clear();
        }
    }

    /// Drop every entry belonging to one document
    pub fn clear_namespace(&self, namespace: u64) {
        if let Ok(mut lru) = self.shared.lru.write() {
            lru.retain(|(ns, _)| *ns != namespace);
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.lru.read().map(|lru| lru.capacity()).unwrap_or(0)
    }

    pub fn set_capacity(&self, capacity: usize) {
        if let Ok(mut lru) = self.shared.lru.write() {
            let evicted = lru.set_capacity(capacity);
            if evicted > 0 {
                trace!("Object cache shrunk to {capacity}, evicted {evicted} entries");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (size, capacity, evictions) = match self.shared.lru.read() {
            Ok(lru) => (lru.len(), lru.capacity(), lru.evictions()),
            Err(_) => (0, 0, 0),
        };
        CacheStats {
            size,
            capacity,
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            evictions,
        }
    }

    /// Start a background thread that drops entries older than `ttl` every
    /// `interval`. The thread ends when the returned handle is stopped or
    /// dropped, or when the last cache handle goes away.
    pub fn start_sweeper(&self, ttl: Duration, interval: Duration) -> std::io::Result<CacheSweeper> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("pdf-cache-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(shared) = weak.upgrade() else {
                            break;
                        };
                        let swept = match shared.lru.write() {
                            Ok(mut lru) => lru.evict_expired(ttl),
                            Err(_) => 0,
                        };
                        if swept > 0 {
                            debug!("Cache sweep dropped {swept} expired entries");
                        }
                    }
                    _ => break,
                }
            })?;

        Ok(CacheSweeper {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Handle to a running cache sweeper
pub struct CacheSweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Stop the sweeper and wait for its thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached items
    pub size: usize,
    /// Maximum capacity (0 = unbounded)
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

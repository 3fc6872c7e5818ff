//! Time-based cache for rendered tile results.
//!
//! Rendered tiles are cached under a `"{x}_{y}_{z}"` key with an insertion
//! timestamp. There is no background eviction timer: every write sweeps the
//! whole map and drops entries older than the TTL. The sweep is bounded by
//! the number of live entries, which the TTL itself keeps in check.
//!
//! A zero TTL disables the cache: gets miss, puts are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tokio::sync::RwLock;

// =============================================================================
// Cache key
// =============================================================================

/// Cache key for a tile at (x, y, zoom).
pub fn cache_key(x: u32, y: u32, zoom: u32) -> String {
    format!("{x}_{y}_{zoom}")
}

// =============================================================================
// TileResultCache
// =============================================================================

struct CacheEntry {
    inserted_at: Instant,
    image: Arc<RgbaImage>,
}

/// TTL-keyed store of rendered tiles.
pub struct TileResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TileResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Whether caching is active at all.
    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get an unexpired entry. Expired entries miss but stay in the map
    /// until the next write sweeps them.
    pub async fn get(&self, key: &str) -> Option<Arc<RgbaImage>> {
        if !self.enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.image.clone())
    }

    /// Insert a rendered tile, then sweep every entry past the TTL.
    pub async fn put(&self, key: String, image: Arc<RgbaImage>) {
        if !self.enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                image,
            },
        );
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    /// Whether a key currently resolves (enabled and unexpired).
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of entries in the map, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop everything. Used on disposal.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

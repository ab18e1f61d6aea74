//! Content hash / thumbnail service with an LRU thumbnail store.
//!
//! Key format: (asset_id, frame) -> encoded thumbnail bytes.
//! Invalidation is per asset; the LRU bounds the total entry count.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use crate::entities::attrs::Attrs;
use crate::entities::clip_type::ClipType;
use crate::entities::hash::{self, ContentHash};
use crate::entities::producer_cache::CacheStats;

/// Encoded thumbnail image
pub type Thumbnail = Arc<Vec<u8>>;

/// Default number of cached thumbnails
pub const DEFAULT_THUMB_ENTRIES: usize = 4096;

pub trait ThumbnailService: Send + Sync {
    fn compute_hash(&self, clip_type: ClipType, descriptor: &Attrs) -> Option<ContentHash>;
    fn has_thumbnail(&self, asset_id: &str, frame: i32) -> bool;
    fn get_thumbnail(&self, asset_id: &str, frame: i32) -> Option<Thumbnail>;
    fn store_thumbnail(&self, asset_id: &str, frame: i32, image: Thumbnail);
    /// Drop every thumbnail of an asset. Returns the number removed.
    fn invalidate(&self, asset_id: &str) -> usize;
}

#[derive(Debug)]
pub struct ThumbnailCache {
    cache: Mutex<LruCache<(String, i32), Thumbnail>>,
    stats: CacheStats,
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(DEFAULT_THUMB_ENTRIES)
    }
}

impl ThumbnailCache {
    /// Create store holding at most `capacity` thumbnails (0 = default)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_THUMB_ENTRIES))
            .unwrap_or(NonZeroUsize::MIN);
        debug!("ThumbnailCache created: capacity={}", capacity);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl ThumbnailService for ThumbnailCache {
    fn compute_hash(&self, clip_type: ClipType, descriptor: &Attrs) -> Option<ContentHash> {
        hash::compute(clip_type, descriptor)
    }

    fn has_thumbnail(&self, asset_id: &str, frame: i32) -> bool {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.peek(&(asset_id.to_string(), frame)).is_some()
    }

    fn get_thumbnail(&self, asset_id: &str, frame: i32) -> Option<Thumbnail> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let hit = cache.get(&(asset_id.to_string(), frame)).cloned();
        match hit {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        hit
    }

    fn store_thumbnail(&self, asset_id: &str, frame: i32, image: Thumbnail) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.push((asset_id.to_string(), frame), image);
    }

    fn invalidate(&self, asset_id: &str) -> usize {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<(String, i32)> = cache
            .iter()
            .filter(|((id, _), _)| id == asset_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            cache.pop(key);
        }
        if !keys.is_empty() {
            debug!("Invalidated {} thumbnails of {}", keys.len(), asset_id);
        }
        keys.len()
    }
}

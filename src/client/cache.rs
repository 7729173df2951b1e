//! Thumbnail cache boundary.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

// ============================================================================
// ThumbnailCache
// ============================================================================

/// Key-value store consulted before generating a thumbnail.
///
/// Implementations may be backed by disk or any other store; lookups that
/// fail should behave as misses.
#[async_trait]
pub trait ThumbnailCache: Send + Sync {
    /// Returns the cached value for `key`.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    async fn put(&self, key: &str, value: String);
}

/// Cache key for a thumbnail of `title` / `description`.
#[must_use]
pub fn thumbnail_key(title: &str, description: &str) -> String {
    format!("thumbnail:{title}:{description}")
}

// ============================================================================
// MemoryCache
// ============================================================================

/// Process-local [`ThumbnailCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<FxHashMap<String, String>>,
}

impl MemoryCache {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ThumbnailCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    async fn put(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();
        let key = thumbnail_key("Cats", "on a beach");

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, "data:image/png;base64,AAA".into()).await;

        assert_eq!(cache.get(&key).await.as_deref(), Some("data:image/png;base64,AAA"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_depends_on_both_fields() {
        assert_ne!(thumbnail_key("a", "b"), thumbnail_key("a", "c"));
    }
}

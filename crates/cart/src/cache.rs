//! Offline key-value persistence.
//!
//! The synchronizer owns the single `"cartItems"` slot: a JSON array of
//! `CartLine`. `CachedTokenStore` reads the session token from the `"token"`
//! slot of the same store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CartError;
use crate::types::CartLine;

/// Key holding the cart snapshot.
pub const CART_ITEMS_KEY: &str = "cartItems";

/// Key holding the session token.
pub const TOKEN_KEY: &str = "token";

/// Errors raised by an offline cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded for storage.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Key cannot be mapped onto the backend.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// String-keyed persistent store.
#[async_trait]
pub trait OfflineCache: Send + Sync {
    /// Read a value; `None` if the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Delete a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

// =============================================================================
// Cart Snapshot Encoding
// =============================================================================

/// Encode lines for the `"cartItems"` slot.
///
/// # Errors
///
/// Returns `CacheError::Encode` if serialization fails.
pub fn encode_lines(lines: &[CartLine]) -> Result<String, CacheError> {
    Ok(serde_json::to_string(lines)?)
}

/// Decode the `"cartItems"` slot.
///
/// Zero-quantity entries are dropped; anything that is not an array of lines
/// is malformed.
///
/// # Errors
///
/// Returns `CartError::MalformedLocalData` describing the parse failure.
pub fn decode_lines(raw: &str) -> Result<Vec<CartLine>, CartError> {
    let lines: Vec<CartLine> =
        serde_json::from_str(raw).map_err(|e| CartError::MalformedLocalData(e.to_string()))?;
    Ok(lines.into_iter().filter(|line| line.quantity > 0).collect())
}

// =============================================================================
// MemoryCache
// =============================================================================

/// Process-local cache, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileCache
// =============================================================================

/// One file per key under a directory (`<dir>/<key>.json`).
///
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a half-written cart behind.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl OfflineCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "Wrote cache entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dcraft_core::{Price, ProductId};

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dcraft-cache-{}-{name}", std::process::id()))
    }

    fn vase(quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(7),
            title: "Clay vase".to_string(),
            unit_price: Price::from_units(500),
            quantity,
            available_stock: Some(3),
            image_ref: None,
        }
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get(CART_ITEMS_KEY).await.unwrap(), None);

        cache.set(CART_ITEMS_KEY, "[]").await.unwrap();
        assert_eq!(cache.get(CART_ITEMS_KEY).await.unwrap().as_deref(), Some("[]"));

        cache.remove(CART_ITEMS_KEY).await.unwrap();
        cache.remove(CART_ITEMS_KEY).await.unwrap();
        assert_eq!(cache.get(CART_ITEMS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip() {
        let dir = temp_dir("roundtrip");
        let cache = FileCache::new(&dir);

        assert_eq!(cache.get(CART_ITEMS_KEY).await.unwrap(), None);
        cache.set(CART_ITEMS_KEY, r#"[{"a":1}]"#).await.unwrap();
        assert_eq!(
            cache.get(CART_ITEMS_KEY).await.unwrap().as_deref(),
            Some(r#"[{"a":1}]"#)
        );
        assert!(dir.join("cartItems.json").exists());
        assert!(!dir.join("cartItems.json.tmp").exists());

        cache.remove(CART_ITEMS_KEY).await.unwrap();
        cache.remove(CART_ITEMS_KEY).await.unwrap();
        assert_eq!(cache.get(CART_ITEMS_KEY).await.unwrap(), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_file_cache_rejects_path_like_keys() {
        let cache = FileCache::new(temp_dir("keys"));
        assert!(matches!(
            cache.get("../etc/passwd").await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(cache.set("", "x").await, Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_encode_decode_lines() {
        let lines = vec![vase(2)];
        let raw = encode_lines(&lines).unwrap();
        assert_eq!(decode_lines(&raw).unwrap(), lines);
    }

    #[test]
    fn test_decode_drops_zero_quantity() {
        let raw = encode_lines(&[vase(0), vase(1)]).unwrap();
        let decoded = decode_lines(&raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].quantity, 1);
    }

    #[test]
    fn test_decode_legacy_product_images() {
        let raw = r#"[{"id":7,"title":"Vase","price":500,"quantity":2,"product_images":[{"url":"https://x/a.jpg"}]},{"id":8,"title":"Bowl","price":20,"quantity":1,"product_images":{"id":3}}]"#;
        let lines = decode_lines(raw).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].product_id, ProductId::new(7));
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].image_ref.as_deref(), Some("https://x/a.jpg"));
        assert_eq!(lines[1].image_ref, None);
    }

    #[test]
    fn test_decode_malformed() {
        for raw in ["not json", r#"{"productId": 7}"#, r#"[{"productId": "x"}]"#, r#"[{"id": 1, "title": "t", "price": 1, "quantity": -1}]"#] {
            assert!(
                matches!(decode_lines(raw), Err(CartError::MalformedLocalData(_))),
                "expected malformed: {raw}"
            );
        }
    }
}

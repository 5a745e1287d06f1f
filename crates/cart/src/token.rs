//! Session token access.
//!
//! The synchronizer only ever reads the token; signing in and out is owned by
//! whoever holds the concrete store.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::warn;

use crate::cache::{CacheError, OfflineCache, TOKEN_KEY};

/// Source of the current bearer token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The current token, or `None` when signed out.
    async fn get_token(&self) -> Option<SecretString>;
}

/// In-memory token holder.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<SecretString>>,
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenStore")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl MemoryTokenStore {
    /// Signed-out store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts signed in.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(SecretString::from(token.into()))),
        }
    }

    /// Sign in.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(SecretString::from(token.into()));
    }

    /// Sign out.
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_token(&self) -> Option<SecretString> {
        self.token.read().await.clone()
    }
}

/// Token kept in the `"token"` slot of an offline cache, as the mobile app
/// persists its session.
pub struct CachedTokenStore {
    cache: Arc<dyn OfflineCache>,
}

impl CachedTokenStore {
    #[must_use]
    pub fn new(cache: Arc<dyn OfflineCache>) -> Self {
        Self { cache }
    }

    /// Persist a token (sign in).
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error if the write fails.
    pub async fn set_token(&self, token: &SecretString) -> Result<(), CacheError> {
        self.cache.set(TOKEN_KEY, token.expose_secret()).await
    }

    /// Forget the token (sign out).
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error if the removal fails.
    pub async fn clear_token(&self) -> Result<(), CacheError> {
        self.cache.remove(TOKEN_KEY).await
    }
}

#[async_trait]
impl TokenStore for CachedTokenStore {
    async fn get_token(&self) -> Option<SecretString> {
        match self.cache.get(TOKEN_KEY).await {
            Ok(Some(token)) if !token.trim().is_empty() => {
                Some(SecretString::from(token.trim().to_string()))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read session token; treating as signed out");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_memory_token_store() {
        let store = MemoryTokenStore::new();
        assert!(store.get_token().await.is_none());

        store.set_token("abc").await;
        assert_eq!(store.get_token().await.unwrap().expose_secret(), "abc");

        store.clear_token().await;
        assert!(store.get_token().await.is_none());
    }

    #[test]
    fn test_memory_token_store_debug_redacts() {
        let store = MemoryTokenStore::with_token("super-secret");
        assert!(!format!("{store:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_cached_token_store() {
        let cache: Arc<dyn OfflineCache> = Arc::new(MemoryCache::new());
        let store = CachedTokenStore::new(Arc::clone(&cache));
        assert!(store.get_token().await.is_none());

        store.set_token(&SecretString::from("jwt-1")).await.unwrap();
        assert_eq!(store.get_token().await.unwrap().expose_secret(), "jwt-1");
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap().as_deref(), Some("jwt-1"));

        cache.set(TOKEN_KEY, "   ").await.unwrap();
        assert!(store.get_token().await.is_none());

        store.clear_token().await.unwrap();
        assert!(store.get_token().await.is_none());
    }
}

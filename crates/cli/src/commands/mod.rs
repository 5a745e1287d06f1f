//! CLI command implementations.
//!
//! Every command runs against one [`Session`]: the synchronizer wired to the
//! file offline cache, the cache-backed token store and the HTTP cart client.

pub mod cart;
pub mod session;

use std::sync::Arc;

use dcraft_cart::{
    CacheError, CachedTokenStore, CartConfig, CartError, CartSynchronizer, ConfigError, FileCache,
    HttpCartClient, RemoteError, SignedInOnly,
};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] RemoteError),

    /// The offline cache rejected a token write.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// A cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Composition root for a single CLI invocation.
pub struct Session {
    pub tokens: Arc<CachedTokenStore>,
    pub cart: CartSynchronizer,
}

impl Session {
    /// Wire the synchronizer and its collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Client` if the HTTP client fails to build.
    pub fn open(config: &CartConfig, signed_in_only: bool) -> Result<Self, CommandError> {
        let cache = Arc::new(FileCache::new(&config.cache_dir));
        let tokens = Arc::new(CachedTokenStore::new(cache.clone()));
        let remote = Arc::new(HttpCartClient::new(&config.api)?);

        tracing::debug!(
            cache_dir = %config.cache_dir.display(),
            cart_url = remote.cart_url(),
            "Opening cart session"
        );

        let mut cart = CartSynchronizer::new(tokens.clone(), remote, cache);
        if signed_in_only {
            cart = cart.with_policy(SignedInOnly);
        }

        Ok(Self { tokens, cart })
    }
}

//! dcraft Cart - Cart synchronization engine.
//!
//! Owns the in-memory cart for one user, mediates between the remote
//! per-user cart API and a local offline cache, and enforces quantity and
//! stock rules.
//!
//! # Architecture
//!
//! - [`CartSynchronizer`] is the single owner of the cart state
//! - Collaborators are injected at construction, never looked up globally:
//!   - [`TokenStore`] - current session token (read-only here)
//!   - [`RemoteCartService`] - remote cart CRUD ([`HttpCartClient`])
//!   - [`OfflineCache`] - key-value persistence ([`FileCache`], [`MemoryCache`])
//!   - [`PurchasePolicy`] - whether an add needs a signed-in session
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dcraft_cart::{
//!     CartConfig, CartLineInput, CartSynchronizer, CachedTokenStore, FileCache, HttpCartClient,
//! };
//! use dcraft_core::{Price, ProductId};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CartConfig::from_env()?;
//! let cache = Arc::new(FileCache::new(&config.cache_dir));
//! let tokens = Arc::new(CachedTokenStore::new(cache.clone()));
//! let remote = Arc::new(HttpCartClient::new(&config.api)?);
//!
//! let cart = CartSynchronizer::new(tokens, remote, cache);
//! cart.reconcile().await?;
//! cart.add_to_cart(CartLineInput::new(ProductId::new(7), "Clay vase", "12.50".parse()?))
//!     .await?;
//! println!("total: {}", cart.total().await);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod error;
pub mod policy;
pub mod remote;
pub mod sync;
pub mod token;
pub mod types;

pub use cache::{CacheError, FileCache, MemoryCache, OfflineCache};
pub use config::{ApiConfig, CartConfig, ConfigError};
pub use error::{CartError, Result};
pub use policy::{GuestCheckout, PurchasePolicy, SignedInOnly};
pub use remote::{HttpCartClient, RemoteCartService, RemoteError};
pub use sync::CartSynchronizer;
pub use token::{CachedTokenStore, MemoryTokenStore, TokenStore};
pub use types::{CartLine, CartLineInput, CartMode, CartState, SyncStatus};

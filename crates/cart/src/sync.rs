//! The cart synchronizer.
//!
//! Owns the authoritative in-memory `CartState` and decides, per call, where
//! a mutation goes:
//!
//! - **Guest** (no token): the local lines are the source of truth. Mutations
//!   apply locally and the lines are written to the offline cache.
//! - **Authenticated**: the local lines are a read-through cache of the
//!   remote cart. Every mutation is sent to the server and followed by a full
//!   reconcile (mutate-then-reconcile), never an optimistic local patch.
//!
//! The mode follows the token store. When a mutation finds the token
//! disagreeing with the mode of the lines it holds (a login or logout since
//! the last load), the cart is reloaded from the new source of truth first.
//!
//! Mutations of the same product are serialized through a per-product lock;
//! different products proceed concurrently. The state lock is never held
//! across a network call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dcraft_core::{Price, ProductId};
use secrecy::SecretString;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CART_ITEMS_KEY, OfflineCache, decode_lines, encode_lines};
use crate::error::{CartError, Result};
use crate::policy::{GuestCheckout, PurchasePolicy};
use crate::remote::{RemoteCartService, RemoteError};
use crate::token::TokenStore;
use crate::types::{CartLine, CartLineInput, CartMode, CartState, SyncStatus};

/// Single owner of the current user's cart.
///
/// Construct one at the composition root and share it (`Arc`) with every
/// consumer; there is no global instance.
pub struct CartSynchronizer {
    tokens: Arc<dyn TokenStore>,
    remote: Arc<dyn RemoteCartService>,
    cache: Arc<dyn OfflineCache>,
    policy: Arc<dyn PurchasePolicy>,
    state: RwLock<CartState>,
    item_locks: ItemLocks,
    lifecycle: Lifecycle,
}

type ItemLocks = StdMutex<HashMap<ProductId, Arc<Mutex<()>>>>;

/// Held for the duration of one product's mutation.
///
/// On drop the product's mutex is forgotten unless another call holds a
/// clone of it (waiting or running), so the map only grows with the number
/// of products mutated concurrently.
struct ItemLock<'a> {
    locks: &'a ItemLocks,
    product_id: ProductId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ItemLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.product_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.product_id);
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    initialized: AtomicBool,
    loading: AtomicUsize,
    mutating: AtomicUsize,
}

/// Counts an operation as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CartSynchronizer {
    /// Create a synchronizer with the default `GuestCheckout` policy.
    ///
    /// The cart starts empty and `Uninitialized`; call
    /// [`reconcile`](Self::reconcile) to load it.
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        remote: Arc<dyn RemoteCartService>,
        cache: Arc<dyn OfflineCache>,
    ) -> Self {
        Self {
            tokens,
            remote,
            cache,
            policy: Arc::new(GuestCheckout),
            state: RwLock::new(CartState::default()),
            item_locks: StdMutex::new(HashMap::new()),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Replace the purchase policy consulted by `add_to_cart`.
    #[must_use]
    pub fn with_policy(mut self, policy: impl PurchasePolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    // =========================================================================
    // Read Accessors
    // =========================================================================

    /// Lines for display, in insertion order.
    pub async fn cart_items(&self) -> Vec<CartLine> {
        self.state.read().await.to_lines()
    }

    /// Snapshot of the whole state.
    pub async fn state(&self) -> CartState {
        self.state.read().await.clone()
    }

    /// Cart total, recomputed from the current lines.
    pub async fn total(&self) -> Price {
        self.state.read().await.total()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        if self.lifecycle.mutating.load(Ordering::SeqCst) > 0 {
            SyncStatus::Mutating
        } else if self.lifecycle.loading.load(Ordering::SeqCst) > 0 {
            SyncStatus::Loading
        } else if self.lifecycle.initialized.load(Ordering::SeqCst) {
            SyncStatus::Ready
        } else {
            SyncStatus::Uninitialized
        }
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Refresh the cart from its source of truth.
    ///
    /// Without a token the offline snapshot is adopted (a missing or malformed
    /// snapshot leaves the current state alone). If the lines still belong to
    /// a session that has since ended they are dropped instead, along with the
    /// snapshot. With a token the remote cart replaces the local lines
    /// wholesale.
    ///
    /// # Errors
    ///
    /// - `CartError::LoginRequired` if the server rejected the session
    /// - `CartError::SyncFailed` for any other remote failure
    ///
    /// The state is unchanged on error.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<CartState> {
        let result = {
            let _loading = InFlight::enter(&self.lifecycle.loading);
            match self.tokens.get_token().await {
                Some(token) => self.reconcile_remote(&token).await,
                None => Ok(self.reconcile_local().await),
            }
        };
        self.lifecycle.initialized.store(true, Ordering::SeqCst);
        result
    }

    /// Alias of [`reconcile`](Self::reconcile) for the UI layer.
    ///
    /// # Errors
    ///
    /// Same as [`reconcile`](Self::reconcile).
    pub async fn load_user_cart(&self) -> Result<CartState> {
        self.reconcile().await
    }

    async fn reconcile_local(&self) -> CartState {
        if self.state.read().await.mode() == CartMode::Authenticated {
            info!("Session ended; dropping the signed-in cart");
            self.reset_local(Some(CartMode::Guest)).await;
            return self.state.read().await.clone();
        }

        let snapshot = match self.cache.get(CART_ITEMS_KEY).await {
            Ok(Some(raw)) => match decode_lines(&raw) {
                Ok(lines) => Some(lines),
                Err(e) => {
                    warn!(error = %e, "Ignoring offline cart snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read offline cart snapshot");
                None
            }
        };

        self.update(|state| {
            state.set_mode(CartMode::Guest);
            if let Some(lines) = snapshot {
                state.replace_lines(lines);
                state.mark_synced();
            }
        })
        .await
        .1
    }

    async fn reconcile_remote(&self, token: &SecretString) -> Result<CartState> {
        let lines = self
            .remote
            .fetch_cart(token)
            .await
            .map_err(|e| remote_failure("fetch_cart", e))?;

        let count = lines.len();
        let (_, state) = self
            .update(|state| {
                state.set_mode(CartMode::Authenticated);
                state.replace_lines(lines);
                state.mark_synced();
            })
            .await;
        debug!(lines = count, "Adopted remote cart");
        Ok(state)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of a product.
    ///
    /// # Errors
    ///
    /// - `CartError::LoginRequired` if there is no session and the purchase
    ///   policy requires one (checked first), or the server rejected the session
    /// - `CartError::OutOfStock` if the line is already at its stock ceiling;
    ///   nothing is sent to the server
    /// - `CartError::SyncFailed` if the remote call, the follow-up reconcile,
    ///   or the reload after a login failed
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_to_cart(&self, input: CartLineInput) -> Result<()> {
        let _mutating = InFlight::enter(&self.lifecycle.mutating);
        let _item = self.lock_item(input.product_id).await;

        let token = self.tokens.get_token().await;
        if token.is_none() && self.policy.requires_login(&input) {
            info!("Add rejected: product requires a signed-in session");
            return Err(CartError::LoginRequired);
        }
        self.ensure_synced(token.is_some()).await?;

        self.state.read().await.check_stock(&input).inspect_err(|e| {
            info!(error = %e, "Add rejected");
        })?;

        match token {
            Some(token) => {
                self.remote
                    .add_item(&token, input.product_id)
                    .await
                    .map_err(|e| remote_failure("add_item", e))?;
                self.reconcile().await.map(drop)
            }
            None => {
                self.update(|state| {
                    state.set_mode(CartMode::Guest);
                    state.increment(input)
                })
                .await
                .0
            }
        }
    }

    /// Remove one unit of a product. Reaching zero removes the line.
    ///
    /// In guest mode an absent product is a no-op. In authenticated mode the
    /// server decides what a decrement of a single-unit line means.
    ///
    /// # Errors
    ///
    /// `CartError::LoginRequired` or `CartError::SyncFailed` in authenticated
    /// mode; the state is unchanged on error.
    #[instrument(skip(self))]
    pub async fn decrease_from_cart(&self, product_id: ProductId) -> Result<()> {
        let _mutating = InFlight::enter(&self.lifecycle.mutating);
        let _item = self.lock_item(product_id).await;

        let token = self.tokens.get_token().await;
        self.ensure_synced(token.is_some()).await?;

        match token {
            Some(token) => {
                self.remote
                    .decrement_item(&token, product_id)
                    .await
                    .map_err(|e| remote_failure("decrement_item", e))?;
                self.reconcile().await.map(drop)
            }
            None => {
                self.update(|state| {
                    state.set_mode(CartMode::Guest);
                    state.decrement(product_id)
                })
                .await;
                Ok(())
            }
        }
    }

    /// Remove a product's line entirely.
    ///
    /// # Errors
    ///
    /// `CartError::LoginRequired` or `CartError::SyncFailed` in authenticated
    /// mode; the state is unchanged on error.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, product_id: ProductId) -> Result<()> {
        let _mutating = InFlight::enter(&self.lifecycle.mutating);
        let _item = self.lock_item(product_id).await;

        let token = self.tokens.get_token().await;
        self.ensure_synced(token.is_some()).await?;

        match token {
            Some(token) => {
                self.remote
                    .remove_item(&token, product_id)
                    .await
                    .map_err(|e| remote_failure("remove_item", e))?;
                self.reconcile().await.map(drop)
            }
            None => {
                self.update(|state| {
                    state.set_mode(CartMode::Guest);
                    state.remove(product_id)
                })
                .await;
                Ok(())
            }
        }
    }

    /// Empty the cart.
    ///
    /// When signed in the remote clear is best-effort: a failure is logged and
    /// the local cart is emptied anyway so the UI never shows a stale cart.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the mutation API uniform.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<()> {
        let _mutating = InFlight::enter(&self.lifecycle.mutating);

        if let Some(token) = self.tokens.get_token().await
            && let Err(e) = self.remote.clear_cart(&token).await
        {
            warn!(error = %e, "Remote cart clear failed; clearing local cart anyway");
        }

        self.reset_local(None).await;
        self.lifecycle.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Logout reset: drop the local cart and its offline snapshot without
    /// touching the remote cart, and fall back to guest mode.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the mutation API uniform.
    #[instrument(skip(self))]
    pub async fn clear_user_cart(&self) -> Result<()> {
        let _mutating = InFlight::enter(&self.lifecycle.mutating);
        self.reset_local(Some(CartMode::Guest)).await;
        self.lifecycle.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Reload the cart before a mutation if it was never loaded, or if the
    /// lines belong to the other mode than the current token implies.
    ///
    /// Without this a first guest add would overwrite an unread snapshot, a
    /// signed-in add would be stock-checked against guest lines, and a guest
    /// mutation after logout would patch the server's cached lines.
    async fn ensure_synced(&self, signed_in: bool) -> Result<()> {
        let authenticated = self.state.read().await.mode() == CartMode::Authenticated;
        if self.lifecycle.initialized.load(Ordering::SeqCst) && authenticated == signed_in {
            return Ok(());
        }
        debug!(signed_in, authenticated, "Reloading cart before mutation");
        self.reconcile().await.map(drop)
    }

    async fn lock_item(&self, product_id: ProductId) -> ItemLock<'_> {
        let lock = {
            let mut locks = self.item_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(product_id).or_default())
        };
        let mut item = ItemLock {
            locks: &self.item_locks,
            product_id,
            guard: None,
        };
        item.guard = Some(lock.lock_owned().await);
        item
    }

    /// Apply a change to the state and persist the lines if they changed.
    ///
    /// The write lock is held through the cache write so concurrent guest
    /// mutations persist in the order they were applied.
    async fn update<T>(&self, change: impl FnOnce(&mut CartState) -> T) -> (T, CartState) {
        let mut state = self.state.write().await;
        let before = state.clone();
        let out = change(&mut state);
        if !state.same_lines(&before) {
            self.persist(&state).await;
        }
        (out, state.clone())
    }

    async fn persist(&self, state: &CartState) {
        let result = match encode_lines(&state.to_lines()) {
            Ok(raw) => self.cache.set(CART_ITEMS_KEY, &raw).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist cart snapshot");
        }
    }

    async fn reset_local(&self, mode: Option<CartMode>) {
        let mut state = self.state.write().await;
        state.clear();
        if let Some(mode) = mode {
            state.set_mode(mode);
        }
        if let Err(e) = self.cache.remove(CART_ITEMS_KEY).await {
            warn!(error = %e, "Failed to delete cart snapshot");
        }
    }
}

/// Log a remote failure and convert it into the UI-facing taxonomy.
fn remote_failure(operation: &str, err: RemoteError) -> CartError {
    if err.is_session_error() {
        warn!(operation, error = %err, "Cart session rejected; login required");
    } else {
        warn!(operation, error = %err, "Cart sync failed");
    }
    CartError::from(err)
}

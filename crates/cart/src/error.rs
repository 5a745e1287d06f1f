//! Error taxonomy surfaced to the UI layer.
//!
//! Every network and storage fault is caught at the synchronizer boundary and
//! converted into one of these kinds. None of them is fatal: the worst case is
//! a stale or empty cart plus a visible notice.

use dcraft_core::ProductId;
use thiserror::Error;

use crate::remote::RemoteError;

/// Cart operation error.
#[derive(Debug, Error)]
pub enum CartError {
    /// No valid session where one is mandatory; prompt the user to sign in.
    #[error("Login required")]
    LoginRequired,

    /// The requested increment would exceed the known stock.
    #[error("Product {product_id} is out of stock (available: {available})")]
    OutOfStock {
        product_id: ProductId,
        available: u32,
    },

    /// A remote call failed; local state was left at its last-known-good value.
    #[error("Cart sync failed: {0}")]
    SyncFailed(RemoteError),

    /// The offline cache held something that is not a cart.
    #[error("Malformed local cart data: {0}")]
    MalformedLocalData(String),
}

impl CartError {
    /// Whether the UI should route the user to sign-in.
    #[must_use]
    pub const fn is_login_required(&self) -> bool {
        matches!(self, Self::LoginRequired)
    }
}

impl From<RemoteError> for CartError {
    fn from(err: RemoteError) -> Self {
        if err.is_session_error() {
            Self::LoginRequired
        } else {
            Self::SyncFailed(err)
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

//! Whether a product may be added without signing in.

use crate::types::CartLineInput;

/// Purchase rule consulted before any add.
///
/// When it says a product needs a session and there is no token, the add is
/// rejected with `LoginRequired` before the stock check runs.
pub trait PurchasePolicy: Send + Sync {
    fn requires_login(&self, candidate: &CartLineInput) -> bool;
}

/// Guests may add anything; the cart lives in the offline cache until login.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestCheckout;

impl PurchasePolicy for GuestCheckout {
    fn requires_login(&self, _candidate: &CartLineInput) -> bool {
        false
    }
}

/// Every add requires a signed-in session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedInOnly;

impl PurchasePolicy for SignedInOnly {
    fn requires_login(&self, _candidate: &CartLineInput) -> bool {
        true
    }
}

impl<F> PurchasePolicy for F
where
    F: Fn(&CartLineInput) -> bool + Send + Sync,
{
    fn requires_login(&self, candidate: &CartLineInput) -> bool {
        self(candidate)
    }
}

//! Sign-in and sign-out.
//!
//! The token lives in the `"token"` slot of the offline cache, next to the
//! cart snapshot.

use secrecy::SecretString;
use tracing::info;

use super::cart::print_cart;
use super::{CommandError, Session};

/// Store the token and replace the local cart with the remote one.
///
/// The guest cart is not merged into the remote cart.
///
/// # Errors
///
/// Returns an error if the token cannot be stored or the server rejects it.
pub async fn login(session: &Session, token: &SecretString) -> Result<(), CommandError> {
    session.tokens.set_token(token).await?;
    let state = session.cart.load_user_cart().await?;
    info!(lines = state.len(), "Signed in");
    print_cart(&state);
    Ok(())
}

/// Forget the token and reset the local cart. The remote cart is untouched.
///
/// # Errors
///
/// Returns an error if the token cannot be removed from the cache.
pub async fn logout(session: &Session) -> Result<(), CommandError> {
    session.tokens.clear_token().await?;
    session.cart.clear_user_cart().await?;
    info!("Signed out");
    Ok(())
}

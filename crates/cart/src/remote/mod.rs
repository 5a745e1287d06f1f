//! Remote per-user cart store.
//!
//! # Architecture
//!
//! - `RemoteCartService` is the seam the synchronizer talks to; it is object
//!   safe so the composition root can inject any implementation
//! - `HttpCartClient` implements it over the dcraft REST API with `reqwest`
//! - Server payloads are normalized into `CartLine` in [`payload`], dropping
//!   malformed items instead of failing the whole response
//!
//! # Endpoints
//!
//! | Operation        | Request                                   |
//! |------------------|-------------------------------------------|
//! | `fetch_cart`     | `GET /api/cart`                           |
//! | `add_item`       | `POST /api/cart` `{product_id, quantity: 1}` |
//! | `decrement_item` | `PUT /api/cart/{id}` `{quantity: -1}`     |
//! | `remove_item`    | `DELETE /api/cart/{id}`                   |
//! | `clear_cart`     | `DELETE /api/cart/clear`                  |
//!
//! All requests carry `Authorization: Bearer <token>`.

mod http;
pub mod payload;

pub use http::HttpCartClient;

use async_trait::async_trait;
use dcraft_core::ProductId;
use secrecy::SecretString;
use thiserror::Error;

use crate::types::CartLine;

/// Server message the backend returns when the bearer token no longer maps to
/// a user.
pub const USER_NOT_FOUND_MESSAGE: &str = "User not found";

/// Errors that can occur when talking to the remote cart store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The session is invalid or expired.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl RemoteError {
    /// Whether the failure means the user must sign in again.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

/// HTTP CRUD on the signed-in user's cart.
///
/// Quantity changes are single-unit deltas; the server owns the resulting
/// totals, including removing a line that is decremented to zero.
#[async_trait]
pub trait RemoteCartService: Send + Sync {
    /// Fetch the full cart, normalized into canonical lines.
    async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<CartLine>, RemoteError>;

    /// Add one unit of a product.
    async fn add_item(&self, token: &SecretString, product_id: ProductId)
    -> Result<(), RemoteError>;

    /// Remove one unit of a product.
    async fn decrement_item(
        &self,
        token: &SecretString,
        product_id: ProductId,
    ) -> Result<(), RemoteError>;

    /// Remove a product's line entirely.
    async fn remove_item(
        &self,
        token: &SecretString,
        product_id: ProductId,
    ) -> Result<(), RemoteError>;

    /// Empty the cart.
    async fn clear_cart(&self, token: &SecretString) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Api {
            status: 502,
            message: "Bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 502 - Bad gateway");

        let err = RemoteError::SessionExpired(USER_NOT_FOUND_MESSAGE.to_string());
        assert_eq!(err.to_string(), "Session expired: User not found");
        assert!(err.is_session_error());
    }

    #[test]
    fn test_parse_error_is_not_session_error() {
        assert!(!RemoteError::Parse("cart_items missing".to_string()).is_session_error());
    }
}

//! `reqwest` implementation of the remote cart store.

use std::sync::Arc;

use async_trait::async_trait;
use dcraft_core::ProductId;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use super::payload::{AddItemRequest, ErrorBody, QuantityDeltaRequest, parse_cart_response};
use super::{RemoteCartService, RemoteError, USER_NOT_FOUND_MESSAGE};
use crate::config::ApiConfig;
use crate::types::CartLine;

/// Client for the dcraft cart REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpCartClient {
    inner: Arc<HttpCartClientInner>,
}

struct HttpCartClientInner {
    client: reqwest::Client,
    /// `{base}/api/cart`, without a trailing slash.
    cart_url: String,
}

impl std::fmt::Debug for HttpCartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartClient")
            .field("cart_url", &self.inner.cart_url)
            .finish_non_exhaustive()
    }
}

impl HttpCartClient {
    /// Create a new cart API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let cart_url = format!("{}/api/cart", config.base_url.as_str().trim_end_matches('/'));

        Ok(Self {
            inner: Arc::new(HttpCartClientInner { client, cart_url }),
        })
    }

    /// The cart collection endpoint.
    #[must_use]
    pub fn cart_url(&self) -> &str {
        &self.inner.cart_url
    }

    fn item_url(&self, product_id: ProductId) -> String {
        format!("{}/{product_id}", self.inner.cart_url)
    }

    /// Send a request and turn non-2xx responses into `RemoteError`.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let err = classify_failure(status, &body);
        warn!(
            status = %status,
            error = %err,
            "Cart API returned non-success status"
        );
        Err(err)
    }
}

/// Map a non-2xx response onto the error taxonomy.
///
/// 401/403, or a body message of `"User not found"`, means the session is no
/// longer valid.
fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    let message = ErrorBody::parse(body).into_message();

    let session_rejected = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || message.as_deref() == Some(USER_NOT_FOUND_MESSAGE);

    if session_rejected {
        return RemoteError::SessionExpired(
            message.unwrap_or_else(|| status.canonical_reason().unwrap_or("Unauthorized").to_string()),
        );
    }

    RemoteError::Api {
        status: status.as_u16(),
        message: message.unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            if snippet.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                snippet
            }
        }),
    }
}

#[async_trait]
impl RemoteCartService for HttpCartClient {
    #[instrument(skip(self, token))]
    async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<CartLine>, RemoteError> {
        let body = self
            .send(
                self.inner
                    .client
                    .get(&self.inner.cart_url)
                    .bearer_auth(token.expose_secret()),
            )
            .await?;

        let lines = parse_cart_response(&body).inspect_err(|e| {
            warn!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse cart response"
            );
        })?;
        debug!(lines = lines.len(), "Fetched remote cart");
        Ok(lines)
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_item(
        &self,
        token: &SecretString,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        self.send(
            self.inner
                .client
                .post(&self.inner.cart_url)
                .bearer_auth(token.expose_secret())
                .json(&AddItemRequest::one(product_id)),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn decrement_item(
        &self,
        token: &SecretString,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        self.send(
            self.inner
                .client
                .put(self.item_url(product_id))
                .bearer_auth(token.expose_secret())
                .json(&QuantityDeltaRequest::DECREMENT),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_item(
        &self,
        token: &SecretString,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        self.send(
            self.inner
                .client
                .delete(self.item_url(product_id))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn clear_cart(&self, token: &SecretString) -> Result<(), RemoteError> {
        self.send(
            self.inner
                .client
                .delete(format!("{}/clear", self.inner.cart_url))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }
}

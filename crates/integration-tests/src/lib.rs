//! Integration tests for the dcraft cart engine.
//!
//! [`MockBackend`] serves the cart REST API from memory on an ephemeral port
//! so `HttpCartClient` and `CartSynchronizer` can be exercised over real HTTP
//! without the production backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dcraft-integration-tests
//! ```
//!
//! # Backend Behaviour
//!
//! - Requests must carry `Authorization: Bearer <token>`; a missing header is
//!   a 401, an unknown token a 404 `{"message": "User not found"}`
//! - `GET /api/cart` returns `{"cart_items": [...]}` in the backend's legacy
//!   shape (string prices, `product_images` as `[{url}]`)
//! - [`MockBackend::fail_with`] makes every request return the given status

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use dcraft_cart::{ApiConfig, ConfigError};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub use axum::http::StatusCode;

/// Token the mock backend accepts.
pub const VALID_TOKEN: &str = "valid-token";

/// Catalog entry served by the mock backend.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: i32,
    pub title: &'static str,
    pub price: &'static str,
    pub stock: Option<u32>,
    pub image: Option<&'static str>,
}

impl Product {
    #[must_use]
    pub const fn new(id: i32, title: &'static str, price: &'static str) -> Self {
        Self {
            id,
            title,
            price,
            stock: None,
            image: None,
        }
    }

    #[must_use]
    pub const fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    #[must_use]
    pub const fn with_image(mut self, image: &'static str) -> Self {
        self.image = Some(image);
        self
    }

    fn to_item(&self, quantity: u32) -> Value {
        let mut item = json!({
            "id": self.id,
            "title": self.title,
            "price": self.price,
            "quantity": quantity,
        });
        if let Some(stock) = self.stock {
            item["stock"] = json!(stock);
        }
        if let Some(image) = self.image {
            item["product_images"] = json!([{ "url": image }]);
        }
        item
    }
}

#[derive(Default)]
struct BackendState {
    catalog: HashMap<i32, Product>,
    /// `(product_id, quantity)` in insertion order.
    items: Vec<(i32, u32)>,
    /// Raw items appended verbatim to every cart response.
    raw_items: Vec<Value>,
    requests: Vec<String>,
    failing: Option<StatusCode>,
}

type SharedState = Arc<Mutex<BackendState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process cart backend.
#[derive(Clone)]
pub struct MockBackend {
    addr: SocketAddr,
    state: SharedState,
}

impl MockBackend {
    /// Bind to `127.0.0.1:0` and start serving in the background.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the listener cannot be bound.
    pub async fn start(catalog: impl IntoIterator<Item = Product>) -> std::io::Result<Self> {
        let state: SharedState = Arc::new(Mutex::new(BackendState {
            catalog: catalog.into_iter().map(|p| (p.id, p)).collect(),
            ..BackendState::default()
        }));

        let app = Router::new()
            .route("/api/cart", get(get_cart).post(add_item))
            .route("/api/cart/clear", delete(clear_cart))
            .route("/api/cart/{id}", put(decrement_item).delete(remove_item))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state })
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Errors
    ///
    /// Never fails for a bound socket address.
    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        ApiConfig::with_base_url(&self.base_url())
    }

    /// Replace the server-side cart.
    pub fn seed(&self, items: &[(i32, u32)]) {
        lock(&self.state).items = items.to_vec();
    }

    /// Server-side cart as `(product_id, quantity)`.
    #[must_use]
    pub fn items(&self) -> Vec<(i32, u32)> {
        lock(&self.state).items.clone()
    }

    /// Append a raw item to every cart response.
    pub fn push_raw_item(&self, item: Value) {
        lock(&self.state).raw_items.push(item);
    }

    /// Make every request fail with `status`, or recover with `None`.
    pub fn fail_with(&self, status: Option<StatusCode>) {
        lock(&self.state).failing = status;
    }

    /// Requests received so far, as `"METHOD /path"`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

impl BackendState {
    fn record(&mut self, request: String, headers: &HeaderMap) -> Result<(), Response> {
        self.requests.push(request);

        if let Some(status) = self.failing {
            return Err(message(status, "Service unavailable"));
        }

        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            None => Err(message(StatusCode::UNAUTHORIZED, "No token provided")),
            Some(VALID_TOKEN) => Ok(()),
            Some(_) => Err(message(StatusCode::NOT_FOUND, "User not found")),
        }
    }

    fn cart_body(&self) -> Value {
        let mut items: Vec<Value> = self
            .items
            .iter()
            .filter_map(|(id, quantity)| self.catalog.get(id).map(|p| p.to_item(*quantity)))
            .collect();
        items.extend(self.raw_items.iter().cloned());
        json!({ "cart_items": items })
    }
}

async fn get_cart(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let mut backend = lock(&state);
    if let Err(rejection) = backend.record("GET /api/cart".to_string(), &headers) {
        return rejection;
    }
    Json(backend.cart_body()).into_response()
}

async fn add_item(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = lock(&state);
    if let Err(rejection) = backend.record("POST /api/cart".to_string(), &headers) {
        return rejection;
    }

    let product_id = body["product_id"].as_i64().and_then(|id| i32::try_from(id).ok());
    let quantity = body["quantity"].as_i64().and_then(|q| u32::try_from(q).ok());
    let (Some(product_id), Some(quantity)) = (product_id, quantity) else {
        return message(StatusCode::BAD_REQUEST, "product_id and quantity are required");
    };
    if !backend.catalog.contains_key(&product_id) {
        return message(StatusCode::NOT_FOUND, "Product not found");
    }

    if let Some(item) = backend.items.iter_mut().find(|(id, _)| *id == product_id) {
        item.1 += quantity;
    } else {
        backend.items.push((product_id, quantity));
    }
    message(StatusCode::CREATED, "Item added to cart")
}

async fn decrement_item(
    State(state): State<SharedState>,
    Path(product_id): Path<i32>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = lock(&state);
    if let Err(rejection) = backend.record(format!("PUT /api/cart/{product_id}"), &headers) {
        return rejection;
    }

    if body["quantity"].as_i64() != Some(-1) {
        return message(StatusCode::BAD_REQUEST, "quantity must be -1");
    }
    let Some(item) = backend.items.iter_mut().find(|(id, _)| *id == product_id) else {
        return message(StatusCode::NOT_FOUND, "Item not found in cart");
    };
    item.1 = item.1.saturating_sub(1);
    backend.items.retain(|(_, quantity)| *quantity > 0);
    message(StatusCode::OK, "Cart updated")
}

async fn remove_item(
    State(state): State<SharedState>,
    Path(product_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let mut backend = lock(&state);
    if let Err(rejection) = backend.record(format!("DELETE /api/cart/{product_id}"), &headers) {
        return rejection;
    }
    backend.items.retain(|(id, _)| *id != product_id);
    message(StatusCode::OK, "Item removed from cart")
}

async fn clear_cart(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let mut backend = lock(&state);
    if let Err(rejection) = backend.record("DELETE /api/cart/clear".to_string(), &headers) {
        return rejection;
    }
    backend.items.clear();
    message(StatusCode::OK, "Cart cleared")
}

//! End-to-end cart synchronization over HTTP.
//!
//! Each test starts its own `MockBackend` on an ephemeral port and drives a
//! `CartSynchronizer` wired to the real `HttpCartClient`.
//!
//! Run with: cargo test -p dcraft-integration-tests

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use dcraft_cart::{
    ApiConfig, CachedTokenStore, CartError, CartLineInput, CartMode, CartSynchronizer, FileCache,
    HttpCartClient, MemoryCache, MemoryTokenStore, OfflineCache, RemoteCartService, RemoteError,
};
use dcraft_core::{Price, ProductId};
use dcraft_integration_tests::{MockBackend, Product, StatusCode, VALID_TOKEN};
use secrecy::SecretString;
use serde_json::json;

fn catalog() -> Vec<Product> {
    vec![
        Product::new(7, "Clay vase", "500")
            .with_stock(3)
            .with_image("https://cdn.example/vase.jpg"),
        Product::new(9, "Jute rug", "1200.50"),
        Product::new(11, "Brass bell", "75"),
    ]
}

fn vase() -> CartLineInput {
    CartLineInput::new(ProductId::new(7), "Clay vase", Price::from_units(500)).with_stock(3)
}

fn rug() -> CartLineInput {
    CartLineInput::new(ProductId::new(9), "Jute rug", "1200.50".parse().unwrap())
}

struct Client {
    tokens: Arc<MemoryTokenStore>,
    cache: Arc<MemoryCache>,
    cart: CartSynchronizer,
}

fn client_for(config: &ApiConfig, tokens: MemoryTokenStore) -> Client {
    let tokens = Arc::new(tokens);
    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(HttpCartClient::new(config).unwrap());
    let cart = CartSynchronizer::new(tokens.clone(), remote, cache.clone());
    Client {
        tokens,
        cache,
        cart,
    }
}

async fn signed_in() -> (MockBackend, Client) {
    let backend = MockBackend::start(catalog()).await.unwrap();
    let client = client_for(
        &backend.api_config().unwrap(),
        MemoryTokenStore::with_token(VALID_TOKEN),
    );
    (backend, client)
}

// ============================================================================
// Authenticated mode
// ============================================================================

#[tokio::test]
async fn test_reconcile_normalizes_backend_payload() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 2), (9, 1)]);

    let state = client.cart.reconcile().await.unwrap();

    assert_eq!(state.mode(), CartMode::Authenticated);
    let vase = state.line(ProductId::new(7)).unwrap();
    assert_eq!(vase.quantity, 2);
    assert_eq!(vase.title, "Clay vase");
    assert_eq!(vase.available_stock, Some(3));
    assert_eq!(vase.image_ref.as_deref(), Some("https://cdn.example/vase.jpg"));
    assert_eq!(state.total(), "2200.50".parse::<Price>().unwrap());
    assert_eq!(backend.requests(), vec!["GET /api/cart"]);
}

#[tokio::test]
async fn test_add_posts_then_reconciles() {
    let (backend, client) = signed_in().await;
    client.cart.reconcile().await.unwrap();

    client.cart.add_to_cart(vase()).await.unwrap();
    client.cart.add_to_cart(vase()).await.unwrap();

    assert_eq!(backend.items(), vec![(7, 2)]);
    assert_eq!(client.cart.state().await.quantity_of(ProductId::new(7)), 2);
    assert_eq!(
        backend.requests(),
        vec![
            "GET /api/cart",
            "POST /api/cart",
            "GET /api/cart",
            "POST /api/cart",
            "GET /api/cart",
        ]
    );
}

#[tokio::test]
async fn test_add_at_stock_ceiling_sends_nothing() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 3)]);
    client.cart.reconcile().await.unwrap();

    let err = client.cart.add_to_cart(vase()).await.unwrap_err();

    assert!(matches!(err, CartError::OutOfStock { available: 3, .. }));
    assert_eq!(backend.requests(), vec!["GET /api/cart"]);
}

#[tokio::test]
async fn test_decrease_and_remove() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 2), (9, 1), (11, 4)]);
    client.cart.reconcile().await.unwrap();

    client.cart.decrease_from_cart(ProductId::new(7)).await.unwrap();
    client.cart.decrease_from_cart(ProductId::new(9)).await.unwrap();
    client.cart.remove_from_cart(ProductId::new(11)).await.unwrap();

    assert_eq!(backend.items(), vec![(7, 1)]);
    let items = client.cart.cart_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, ProductId::new(7));
    assert_eq!(items[0].quantity, 1);
    assert!(backend.requests().contains(&"PUT /api/cart/7".to_string()));
    assert!(backend.requests().contains(&"DELETE /api/cart/11".to_string()));
}

#[tokio::test]
async fn test_clear_cart() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 2), (9, 1)]);
    client.cart.reconcile().await.unwrap();

    client.cart.clear_cart().await.unwrap();

    assert!(backend.items().is_empty());
    assert!(client.cart.cart_items().await.is_empty());
    assert!(backend.requests().contains(&"DELETE /api/cart/clear".to_string()));
}

#[tokio::test]
async fn test_clear_cart_survives_backend_outage() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 2)]);
    client.cart.reconcile().await.unwrap();

    backend.fail_with(Some(StatusCode::SERVICE_UNAVAILABLE));
    client.cart.clear_cart().await.unwrap();

    assert!(client.cart.cart_items().await.is_empty());
    assert_eq!(client.cache.get("cartItems").await.unwrap(), None);
    assert_eq!(backend.items(), vec![(7, 2)]);
}

#[tokio::test]
async fn test_malformed_items_are_dropped() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(9, 1)]);
    backend.push_raw_item(json!({ "title": "no id", "price": "5", "quantity": 1 }));
    backend.push_raw_item(json!({ "id": 40, "title": "bad price", "price": "abc", "quantity": 1 }));
    backend.push_raw_item(json!({ "id": 41, "title": "zero", "price": 5, "quantity": 0 }));
    backend.push_raw_item(json!({
        "id": 42, "product_name": "Legacy lamp", "price": 19.99, "quantity": "2",
        "image": "https://cdn.example/lamp.jpg", "stock": "oops"
    }));

    let state = client.cart.reconcile().await.unwrap();

    let ids: Vec<i32> = state.lines().map(|l| l.product_id.as_i32()).collect();
    assert_eq!(ids, vec![9, 42]);
    let lamp = state.line(ProductId::new(42)).unwrap();
    assert_eq!(lamp.title, "Legacy lamp");
    assert_eq!(lamp.quantity, 2);
    assert_eq!(lamp.unit_price, "19.99".parse::<Price>().unwrap());
    assert_eq!(lamp.available_stock, None);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_user_is_login_required() {
    let backend = MockBackend::start(catalog()).await.unwrap();
    let client = client_for(
        &backend.api_config().unwrap(),
        MemoryTokenStore::with_token("revoked-token"),
    );

    assert!(client.cart.reconcile().await.unwrap_err().is_login_required());
    assert!(client.cart.add_to_cart(rug()).await.unwrap_err().is_login_required());
    assert!(client.cart.cart_items().await.is_empty());
    assert!(backend.items().is_empty());
}

#[tokio::test]
async fn test_outage_keeps_last_known_cart() {
    let (backend, client) = signed_in().await;
    backend.seed(&[(7, 2)]);
    client.cart.reconcile().await.unwrap();
    let before = client.cart.state().await;

    backend.fail_with(Some(StatusCode::SERVICE_UNAVAILABLE));
    let err = client.cart.decrease_from_cart(ProductId::new(7)).await.unwrap_err();

    assert!(matches!(
        err,
        CartError::SyncFailed(RemoteError::Api { status: 503, .. })
    ));
    assert_eq!(client.cart.state().await, before);
}

#[tokio::test]
async fn test_unreachable_backend_is_sync_failed() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ApiConfig::with_base_url(&format!("http://127.0.0.1:{port}")).unwrap();
    let client = client_for(&config, MemoryTokenStore::with_token(VALID_TOKEN));

    let err = client.cart.reconcile().await.unwrap_err();
    assert!(matches!(err, CartError::SyncFailed(RemoteError::Http(_))));
}

#[tokio::test]
async fn test_http_client_reports_api_errors() {
    let backend = MockBackend::start(catalog()).await.unwrap();
    let client = HttpCartClient::new(&backend.api_config().unwrap()).unwrap();
    let token = SecretString::from(VALID_TOKEN);

    let err = client.add_item(&token, ProductId::new(404)).await.unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Api { status: 404, ref message } if message == "Product not found"
    ));

    let err = client
        .fetch_cart(&SecretString::from("someone-else"))
        .await
        .unwrap_err();
    assert!(err.is_session_error());
}

// ============================================================================
// Guest mode & sign-in
// ============================================================================

#[tokio::test]
async fn test_guest_cart_never_touches_backend() {
    let backend = MockBackend::start(catalog()).await.unwrap();
    let client = client_for(&backend.api_config().unwrap(), MemoryTokenStore::new());

    client.cart.add_to_cart(vase()).await.unwrap();
    client.cart.add_to_cart(vase()).await.unwrap();
    client.cart.add_to_cart(rug()).await.unwrap();
    client.cart.decrease_from_cart(ProductId::new(9)).await.unwrap();

    let state = client.cart.state().await;
    assert_eq!(state.mode(), CartMode::Guest);
    assert_eq!(state.total(), Price::from_units(1000));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_login_adopts_remote_cart_and_logout_resets() {
    let (backend, client) = {
        let backend = MockBackend::start(catalog()).await.unwrap();
        let client = client_for(&backend.api_config().unwrap(), MemoryTokenStore::new());
        (backend, client)
    };
    backend.seed(&[(11, 3)]);

    client.cart.add_to_cart(vase()).await.unwrap();
    client.cart.add_to_cart(vase()).await.unwrap();

    client.tokens.set_token(VALID_TOKEN).await;
    let state = client.cart.load_user_cart().await.unwrap();
    assert_eq!(state.mode(), CartMode::Authenticated);
    assert_eq!(state.len(), 1);
    assert_eq!(state.quantity_of(ProductId::new(11)), 3);
    assert_eq!(state.quantity_of(ProductId::new(7)), 0);

    client.tokens.clear_token().await;
    client.cart.clear_user_cart().await.unwrap();
    assert!(client.cart.cart_items().await.is_empty());
    assert_eq!(backend.items(), vec![(11, 3)]);
    assert_eq!(backend.requests(), vec!["GET /api/cart"]);
}

#[tokio::test]
async fn test_file_cache_and_cached_token_across_restarts() {
    let backend = MockBackend::start(catalog()).await.unwrap();
    let config = backend.api_config().unwrap();
    let dir = std::env::temp_dir().join(format!("dcraft-it-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let open = || {
        let cache: Arc<dyn OfflineCache> = Arc::new(FileCache::new(&dir));
        let tokens = Arc::new(CachedTokenStore::new(Arc::clone(&cache)));
        let remote = Arc::new(HttpCartClient::new(&config).unwrap());
        (
            tokens.clone(),
            CartSynchronizer::new(tokens, remote, cache),
        )
    };

    // Guest session persists to disk
    let (_, cart) = open();
    cart.add_to_cart(vase()).await.unwrap();
    cart.add_to_cart(rug()).await.unwrap();
    drop(cart);

    let (tokens, cart) = open();
    let state = cart.reconcile().await.unwrap();
    assert_eq!(state.mode(), CartMode::Guest);
    assert_eq!(state.len(), 2);

    // Sign in; the next process sees the token and the remote cart
    tokens.set_token(&SecretString::from(VALID_TOKEN)).await.unwrap();
    backend.seed(&[(9, 2)]);
    drop(cart);

    let (tokens, cart) = open();
    let state = cart.reconcile().await.unwrap();
    assert_eq!(state.mode(), CartMode::Authenticated);
    assert_eq!(state.quantity_of(ProductId::new(9)), 2);

    tokens.clear_token().await.unwrap();
    cart.clear_user_cart().await.unwrap();
    let (_, cart) = open();
    assert!(cart.reconcile().await.unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

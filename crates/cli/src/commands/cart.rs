//! Cart commands.
//!
//! Each process starts with an uninitialized synchronizer; the first
//! operation loads the guest snapshot or the remote cart before mutating.

use dcraft_cart::{CartLineInput, CartMode, CartState};
use dcraft_core::ProductId;
use tracing::info;

use super::{CommandError, Session};

/// Load the cart and print it.
///
/// # Errors
///
/// Returns an error if the remote cart could not be loaded.
pub async fn show(session: &Session) -> Result<(), CommandError> {
    let state = session.cart.reconcile().await?;
    print_cart(&state);
    Ok(())
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns `CartError::OutOfStock`, `LoginRequired` or `SyncFailed`.
pub async fn add(session: &Session, input: CartLineInput) -> Result<(), CommandError> {
    let product_id = input.product_id;
    session.cart.add_to_cart(input).await?;
    info!(%product_id, "Added to cart");
    print_cart(&session.cart.state().await);
    Ok(())
}

/// Remove one unit of a product.
///
/// # Errors
///
/// Returns `CartError::LoginRequired` or `SyncFailed` when signed in.
pub async fn decrease(session: &Session, product_id: ProductId) -> Result<(), CommandError> {
    session.cart.decrease_from_cart(product_id).await?;
    print_cart(&session.cart.state().await);
    Ok(())
}

/// Remove a product's line.
///
/// # Errors
///
/// Returns `CartError::LoginRequired` or `SyncFailed` when signed in.
pub async fn remove(session: &Session, product_id: ProductId) -> Result<(), CommandError> {
    session.cart.remove_from_cart(product_id).await?;
    print_cart(&session.cart.state().await);
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Does not fail today; kept fallible like the other commands.
pub async fn clear(session: &Session) -> Result<(), CommandError> {
    session.cart.clear_cart().await?;
    info!("Cart cleared");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn print_cart(state: &CartState) {
    let mode = match state.mode() {
        CartMode::Guest => "guest",
        CartMode::Authenticated => "signed in",
    };

    if state.is_empty() {
        println!("Cart is empty ({mode})");
        return;
    }

    println!("{:>8}  {:>4}  {:>10}  {:>10}  Title", "Product", "Qty", "Unit", "Line");
    for line in state.lines() {
        let max = if line.is_at_max() { " (max)" } else { "" };
        println!(
            "{:>8}  {:>4}  {:>10}  {:>10}  {}{max}",
            line.product_id,
            line.quantity,
            line.unit_price.to_string(),
            line.line_total().to_string(),
            line.title,
        );
    }
    println!(
        "{} items, total {} ({mode})",
        state.item_count(),
        state.total()
    );
}

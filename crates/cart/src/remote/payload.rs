//! Wire types for the cart API and normalization into `CartLine`.
//!
//! The backend has shipped several payload shapes over time (`title` vs
//! `product_name`, `product_images` vs `image`, prices as numbers or
//! strings). Items are decoded one at a time from raw JSON so a single bad
//! item is dropped with a warning while the rest of the cart still loads.

use std::str::FromStr;

use dcraft_core::{Price, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::RemoteError;
use crate::types::{CartLine, image_ref_from_value};

// =============================================================================
// Requests
// =============================================================================

/// Body of `POST /api/cart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl AddItemRequest {
    /// Request adding a single unit.
    #[must_use]
    pub const fn one(product_id: ProductId) -> Self {
        Self {
            product_id,
            quantity: 1,
        }
    }
}

/// Body of `PUT /api/cart/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityDeltaRequest {
    pub quantity: i32,
}

impl QuantityDeltaRequest {
    /// Request removing a single unit.
    pub const DECREMENT: Self = Self { quantity: -1 };
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best-effort parse; a missing or non-JSON body yields no message.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
    }
}

// =============================================================================
// Cart Response
// =============================================================================

/// Parse a `GET /api/cart` body into canonical lines.
///
/// # Errors
///
/// Returns `RemoteError::Parse` if the body is not JSON or `cart_items` is
/// missing or not an array. Individual malformed items are skipped.
pub fn parse_cart_response(body: &str) -> Result<Vec<CartLine>, RemoteError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Parse(e.to_string()))?;

    let Some(items) = value.get("cart_items").and_then(Value::as_array) else {
        return Err(RemoteError::Parse(
            "unexpected cart_items format".to_string(),
        ));
    };

    Ok(items.iter().filter_map(normalize_item).collect())
}

/// Normalize a single server item.
///
/// Required fields (`id`, `quantity >= 1`, `price`) drop the item when bad;
/// optional fields (`title`, image, `stock`) are dropped on their own.
#[must_use]
pub fn normalize_item(item: &Value) -> Option<CartLine> {
    let Some(id) = ["id", "product_id"].iter().find_map(|key| {
        item.get(*key)
            .and_then(as_i64)
            .and_then(|id| i32::try_from(id).ok())
    }) else {
        warn!(item = %item, "Dropping cart item without a usable id");
        return None;
    };
    let product_id = ProductId::new(id);

    let quantity = item
        .get("quantity")
        .and_then(as_i64)
        .and_then(|q| u32::try_from(q).ok())
        .filter(|q| *q > 0);
    let Some(quantity) = quantity else {
        warn!(%product_id, "Dropping cart item with missing or non-positive quantity");
        return None;
    };

    let Some(unit_price) = item.get("price").and_then(as_price) else {
        warn!(%product_id, "Dropping cart item with missing or invalid price");
        return None;
    };

    let title = item
        .get("title")
        .or_else(|| item.get("product_name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();

    let available_stock = item
        .get("stock")
        .and_then(as_i64)
        .and_then(|s| u32::try_from(s).ok());

    let image_ref = item
        .get("product_images")
        .and_then(image_ref_from_value)
        .or_else(|| item.get("image").and_then(image_ref_from_value));

    Some(CartLine {
        product_id,
        title,
        unit_price,
        quantity,
        available_stock,
        image_ref,
    })
}

/// Integer from a JSON integer or numeric string.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative price from a JSON number or decimal string.
fn as_price(value: &Value) -> Option<Price> {
    let decimal = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }?;
    let price = Price::new(decimal);
    (!price.is_negative()).then_some(price)
}

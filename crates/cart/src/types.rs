//! Domain types for the cart engine.
//!
//! `CartLine` is the one canonical line schema. Remote payloads are
//! normalized into it at the HTTP boundary (see `remote::payload`), and it is
//! the shape written to the offline cache.

use chrono::{DateTime, Utc};
use dcraft_core::{Price, ProductId};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CartError;

// =============================================================================
// Cart Lines
// =============================================================================

/// One product's presence in the cart.
///
/// Title, price, stock and image are copied from the catalog when the product
/// is added and are not re-fetched on render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product ID, unique within a cart.
    #[serde(alias = "id")]
    pub product_id: ProductId,
    /// Product title for display.
    pub title: String,
    /// Price of a single unit.
    #[serde(alias = "price")]
    pub unit_price: Price,
    /// Number of units; at least 1 while the line exists.
    pub quantity: u32,
    /// Known stock ceiling, if the catalog reported one.
    #[serde(default, alias = "stock", skip_serializing_if = "Option::is_none")]
    pub available_stock: Option<u32>,
    /// Opaque image reference (URL), display only.
    ///
    /// Older snapshots stored the backend's `product_images` verbatim, so any
    /// shape `image_ref_from_value` understands is accepted and anything else
    /// reads as no image.
    #[serde(
        default,
        alias = "product_images",
        alias = "image",
        deserialize_with = "deserialize_image_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_ref: Option<String>,
}

/// Image URL from a string, an array of strings, or `{ url }` objects.
pub(crate) fn image_ref_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(image_ref_from_value),
        Value::Object(fields) => ["url", "image_url", "src"]
            .iter()
            .find_map(|key| fields.get(*key))
            .and_then(image_ref_from_value),
        _ => None,
    }
}

fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(image_ref_from_value))
}

impl CartLine {
    /// Line total (`quantity × unit_price`).
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }

    /// Whether the line has reached (or exceeded) its known stock ceiling.
    ///
    /// A line whose stock shrank below its quantity is reported as at max but
    /// its stored quantity is left alone; the server corrects it on the next
    /// reconcile.
    #[must_use]
    pub fn is_at_max(&self) -> bool {
        self.available_stock
            .is_some_and(|stock| self.quantity >= stock)
    }
}

/// Candidate passed to `add_to_cart`, taken from the product catalog.
///
/// Every add is a single-unit step, so there is no quantity here: a new line
/// starts at 1 and an existing line grows by 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineInput {
    /// Product to add.
    pub product_id: ProductId,
    /// Product title for display.
    pub title: String,
    /// Price of a single unit.
    pub unit_price: Price,
    /// Known stock ceiling, if any.
    pub available_stock: Option<u32>,
    /// Opaque image reference (URL).
    pub image_ref: Option<String>,
}

impl CartLineInput {
    /// Create a candidate with no stock ceiling and no image.
    #[must_use]
    pub fn new(product_id: ProductId, title: impl Into<String>, unit_price: Price) -> Self {
        Self {
            product_id,
            title: title.into(),
            unit_price,
            available_stock: None,
            image_ref: None,
        }
    }

    /// Set the stock ceiling.
    #[must_use]
    pub const fn with_stock(mut self, stock: u32) -> Self {
        self.available_stock = Some(stock);
        self
    }

    /// Set the image reference.
    #[must_use]
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    fn into_line(self) -> CartLine {
        CartLine {
            product_id: self.product_id,
            title: self.title,
            unit_price: self.unit_price,
            quantity: 1,
            available_stock: self.available_stock,
            image_ref: self.image_ref,
        }
    }
}

// =============================================================================
// Cart State
// =============================================================================

/// Where mutations are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartMode {
    /// No session: the local lines are the source of truth.
    #[default]
    Guest,
    /// Signed in: the local lines are a read-through cache of the remote cart.
    Authenticated,
}

/// Lifecycle of a synchronizer instance.
///
/// `Uninitialized -> Loading -> Ready`, with `Mutating` entered while any
/// add/decrease/remove/clear is in flight. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Mutating,
}

/// The aggregate owned by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartState {
    lines: IndexMap<ProductId, CartLine>,
    mode: CartMode,
    last_synced_at: Option<DateTime<Utc>>,
}

impl CartState {
    /// Build a state from lines; later duplicates of a product replace earlier
    /// ones and zero-quantity lines are dropped.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>, mode: CartMode) -> Self {
        let mut state = Self {
            mode,
            ..Self::default()
        };
        state.replace_lines(lines);
        state
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    /// Owned copy of the lines in insertion order.
    #[must_use]
    pub fn to_lines(&self) -> Vec<CartLine> {
        self.lines.values().cloned().collect()
    }

    /// Look up a single line.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.get(&product_id)
    }

    /// Quantity of a product, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.line(product_id).map_or(0, |line| line.quantity)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.values().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `quantity × unit_price`, computed on every call.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.values().map(CartLine::line_total).sum()
    }

    /// Whether a further increment of this product is disallowed by stock.
    #[must_use]
    pub fn is_at_max(&self, product_id: ProductId) -> bool {
        self.line(product_id).is_some_and(CartLine::is_at_max)
    }

    #[must_use]
    pub const fn mode(&self) -> CartMode {
        self.mode
    }

    /// When the lines were last confirmed against their source of truth.
    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub(crate) const fn set_mode(&mut self, mode: CartMode) {
        self.mode = mode;
    }

    pub(crate) fn mark_synced(&mut self) {
        self.last_synced_at = Some(Utc::now());
    }

    /// Reject an add that would exceed the known stock ceiling.
    ///
    /// The candidate's stock wins over the stored line's, since it comes from
    /// a fresher catalog read.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutOfStock` if the current quantity is already at
    /// or above the ceiling.
    pub fn check_stock(&self, input: &CartLineInput) -> Result<(), CartError> {
        let existing = self.line(input.product_id);
        let ceiling = input
            .available_stock
            .or_else(|| existing.and_then(|line| line.available_stock));

        match ceiling {
            Some(available) if self.quantity_of(input.product_id) >= available => {
                Err(CartError::OutOfStock {
                    product_id: input.product_id,
                    available,
                })
            }
            _ => Ok(()),
        }
    }

    /// Add one unit locally: bump an existing line or insert a new one at 1.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutOfStock` without changing anything if the line is
    /// already at its stock ceiling.
    pub fn increment(&mut self, input: CartLineInput) -> Result<(), CartError> {
        self.check_stock(&input)?;

        if let Some(line) = self.lines.get_mut(&input.product_id) {
            line.quantity = line.quantity.saturating_add(1);
            if input.available_stock.is_some() {
                line.available_stock = input.available_stock;
            }
        } else {
            self.lines.insert(input.product_id, input.into_line());
        }
        Ok(())
    }

    /// Take one unit away locally; a line reaching zero is removed.
    ///
    /// Returns `false` if the product was not in the cart.
    pub fn decrement(&mut self, product_id: ProductId) -> bool {
        let Some(line) = self.lines.get_mut(&product_id) else {
            return false;
        };

        if line.quantity <= 1 {
            self.lines.shift_remove(&product_id);
        } else {
            line.quantity -= 1;
        }
        true
    }

    /// Remove a line. Returns `false` if it was not present.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        self.lines.shift_remove(&product_id).is_some()
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Replace all lines wholesale (authoritative overwrite, not a merge).
    pub fn replace_lines(&mut self, lines: impl IntoIterator<Item = CartLine>) {
        self.lines = lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| (line.product_id, line))
            .collect();
    }

    /// Whether two states hold the same lines in the same order.
    pub(crate) fn same_lines(&self, other: &Self) -> bool {
        self.lines.len() == other.lines.len()
            && self.lines.values().zip(other.lines.values()).all(|(a, b)| a == b)
    }
}

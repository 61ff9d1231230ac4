//! Cart reconciliation subsystem.
//!
//! # Architecture
//!
//! - [`LocalCartStore`] - persists the anonymous cart as one JSON blob
//! - [`GuestCartManager`] - business rules over the local store
//! - [`AuthenticatedCartManager`] - same operations against the remote cart
//! - [`UnifiedCart`] - picks the active manager from the auth status, merges
//!   the guest cart into the server cart on login, and raises the transient
//!   "added to cart" feedback
//!
//! Exactly one of the two carts is active at any time. Guest contents flow
//! into the authenticated cart once per login, never the other way.
//!
//! # Units
//!
//! Prices and subtotals are in the major currency unit. Conversion to minor
//! units only happens in [`crate::checkout`].

mod facade;
mod feedback;
mod guest;
mod remote;
mod store;

pub use facade::{CartMode, MergeOutcome, UnifiedCart};
pub use feedback::AddedFeedback;
pub use guest::GuestCartManager;
pub use remote::AuthenticatedCartManager;
pub use store::{LocalCartStore, SYNC_INTERVAL_MS};

use std::sync::Arc;

use marketplace_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source of "now" in Unix epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The wall clock.
#[must_use]
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

// =============================================================================
// Persisted Types
// =============================================================================

/// Display data captured when a product is added to the guest cart.
///
/// The guest cart cannot resolve product IDs through the authenticated API,
/// so it keeps a denormalized copy of what the UI needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    /// Unit price in the major currency unit.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
}

/// One line of the guest cart as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Epoch milliseconds of the last add/update touching this line.
    pub added_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSnapshot>,
}

/// The guest cart blob.
///
/// Holds at most one item per `product_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCart {
    pub items: Vec<LocalCartItem>,
    /// Epoch milliseconds of the last persist or sync mark; `0` means never.
    #[serde(default)]
    pub last_sync: i64,
    /// Identity this cart was last merged into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<marketplace_core::UserId>,
}

/// A guest line stripped of display data, as sent in the merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

// =============================================================================
// Shared View
// =============================================================================

/// A cart line as seen by the UI, whichever cart it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub product: Option<ProductSnapshot>,
}

impl CartLine {
    /// Unit price, treating a missing snapshot as free.
    #[must_use]
    pub fn unit_price(&self) -> Decimal {
        self.product.as_ref().map_or(Decimal::ZERO, |p| p.price)
    }

    /// `unit_price × quantity`, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price().saturating_mul(Decimal::from(self.quantity))
    }
}

impl From<&LocalCartItem> for CartLine {
    fn from(item: &LocalCartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            product: item.product.clone(),
        }
    }
}

/// The lines of whichever cart is active, with the derived getters every
/// surface needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartContents {
    lines: Vec<CartLine>,
}

impl CartContents {
    /// Wrap a list of lines.
    #[must_use]
    pub const fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// Build from the persisted guest cart.
    #[must_use]
    pub fn from_local(cart: &LocalCart) -> Self {
        Self::new(cart.items.iter().map(CartLine::from).collect())
    }

    /// All lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity held for `product_id`, `0` when absent.
    #[must_use]
    pub fn item_quantity(&self, product_id: &ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| &line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `price × quantity` in the major currency unit.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(CartLine::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Whether `product_id` has a line.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.lines.iter().any(|line| &line.product_id == product_id)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::snapshot;
    use super::*;

    #[test]
    fn test_contents_derived_values() {
        let contents = CartContents::new(vec![
            CartLine {
                product_id: ProductId::new("p1"),
                quantity: 2,
                product: Some(snapshot("p1", 100)),
            },
            CartLine {
                product_id: ProductId::new("p2"),
                quantity: 3,
                product: None,
            },
        ]);

        assert_eq!(contents.item_count(), 2);
        assert_eq!(contents.total_items(), 5);
        // Missing snapshot counts as price 0
        assert_eq!(contents.subtotal(), Decimal::from(200));
        assert_eq!(contents.item_quantity(&ProductId::new("p2")), 3);
        assert_eq!(contents.item_quantity(&ProductId::new("p9")), 0);
        assert!(contents.contains(&ProductId::new("p1")));
        assert!(!contents.contains(&ProductId::new("p9")));
    }

    #[test]
    fn test_local_cart_wire_format() {
        let cart = LocalCart {
            items: vec![LocalCartItem {
                product_id: ProductId::new("p1"),
                quantity: 2,
                added_at: 1_700_000_000_000,
                product: Some(snapshot("p1", 100)),
            }],
            last_sync: 1_700_000_000_000,
            user_id: None,
        };

        let json: serde_json::Value = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["items"][0]["productId"], "p1");
        assert_eq!(json["items"][0]["addedAt"], 1_700_000_000_000_i64);
        assert_eq!(json["items"][0]["product"]["price"], 100.0);
        assert_eq!(json["items"][0]["product"]["imageUrl"], "https://cdn.example.com/p1.jpg");
        assert_eq!(json["lastSync"], 1_700_000_000_000_i64);
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let mut product = snapshot("p1", 0);
        product.price = Decimal::MAX;
        let contents = CartContents::new(vec![
            CartLine {
                product_id: ProductId::new("p1"),
                quantity: 1000,
                product: Some(product),
            },
            CartLine {
                product_id: ProductId::new("p2"),
                quantity: 1,
                product: Some(snapshot("p2", 10)),
            },
        ]);

        assert_eq!(contents.lines()[0].line_total(), Decimal::MAX);
        assert_eq!(contents.subtotal(), Decimal::MAX);
    }

    #[test]
    fn test_stored_huge_price_saturates_subtotal() {
        let cart: LocalCart = serde_json::from_str(
            r#"{"items":[{"productId":"p1","quantity":1000,"addedAt":1,
                "product":{"id":"p1","name":"Gold","price":1e26}}],"lastSync":1}"#,
        )
        .unwrap();

        assert_eq!(CartContents::from_local(&cart).subtotal(), Decimal::MAX);
    }
}

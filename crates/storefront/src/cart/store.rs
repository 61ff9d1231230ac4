//! Persistent local cart store.
//!
//! Durable CRUD over a single serialized [`LocalCart`] stored under
//! [`CART_STORAGE_KEY`]. Storage failures never reach callers: reads of a
//! missing or corrupt blob yield `None`, failed writes are logged and dropped.
//! Every mutating method reads, modifies and writes the blob in one call and
//! returns what it wrote.

use std::sync::Arc;

use marketplace_core::{ProductId, UserId};

use super::{Clock, LocalCart, LocalCartItem, ProductSnapshot, SyncItem, system_clock};
use crate::storage::{CART_STORAGE_KEY, KeyValueStorage};

/// Age after which the cart is considered stale (5 minutes).
pub const SYNC_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// The guest cart's persistence layer.
///
/// Constructed without a backend (see [`LocalCartStore::detached`]) every
/// operation is a no-op, mirroring a runtime with no client storage.
#[derive(Clone)]
pub struct LocalCartStore {
    storage: Option<Arc<dyn KeyValueStorage>>,
    clock: Clock,
}

impl std::fmt::Debug for LocalCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCartStore")
            .field("attached", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl LocalCartStore {
    /// Create a store over `storage` using the wall clock.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_clock(Some(storage), system_clock())
    }

    /// Create a store with no backing storage.
    #[must_use]
    pub fn detached() -> Self {
        Self::with_clock(None, system_clock())
    }

    /// Create a store with an explicit backend and clock.
    #[must_use]
    pub fn with_clock(storage: Option<Arc<dyn KeyValueStorage>>, clock: Clock) -> Self {
        Self { storage, clock }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Read the stored cart.
    ///
    /// Returns `None` when nothing is stored, the backend is unavailable, or
    /// the payload does not parse.
    #[must_use]
    pub fn get_cart(&self) -> Option<LocalCart> {
        let storage = self.storage.as_ref()?;

        let raw = match storage.get(CART_STORAGE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read local cart");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(cart) => Some(cart),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse local cart");
                None
            }
        }
    }

    /// Overwrite the stored cart.
    pub fn save_cart(&self, cart: &LocalCart) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };

        let result = serde_json::to_string(cart)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                storage
                    .set(CART_STORAGE_KEY, &json)
                    .map_err(|e| e.to_string())
            });

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to save local cart");
        }
    }

    /// Remove the stored cart entirely.
    pub fn clear_cart(&self) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };

        if let Err(e) = storage.remove(CART_STORAGE_KEY) {
            tracing::warn!(error = %e, "Failed to clear local cart");
        }
    }

    /// Add `quantity` of `product_id`.
    ///
    /// An existing line accumulates the quantity and has its timestamp and
    /// snapshot (when given) refreshed; otherwise a new line is appended.
    pub fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        product: Option<ProductSnapshot>,
    ) -> LocalCart {
        let now = self.now();
        let mut cart = self.get_cart().unwrap_or_default();

        if let Some(item) = cart
            .items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
            item.added_at = now;
            if product.is_some() {
                item.product = product;
            }
        } else {
            cart.items.push(LocalCartItem {
                product_id: product_id.clone(),
                quantity,
                added_at: now,
                product,
            });
        }

        cart.last_sync = now;
        self.save_cart(&cart);
        cart
    }

    /// Set the absolute quantity of an existing line.
    ///
    /// A quantity of zero or less removes the line. Updating a product that
    /// has no line does nothing to the items, but the cart is still persisted
    /// with a fresh `last_sync`.
    pub fn update_item(
        &self,
        product_id: &ProductId,
        quantity: i64,
        product: Option<ProductSnapshot>,
    ) -> LocalCart {
        let now = self.now();
        let mut cart = self.get_cart().unwrap_or_default();

        if quantity <= 0 {
            cart.items.retain(|item| &item.product_id != product_id);
        } else if let Some(item) = cart
            .items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
        {
            item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            item.added_at = now;
            if product.is_some() {
                item.product = product;
            }
        }

        cart.last_sync = now;
        self.save_cart(&cart);
        cart
    }

    /// Drop the line for `product_id`, if any.
    pub fn remove_item(&self, product_id: &ProductId) -> LocalCart {
        let mut cart = self.get_cart().unwrap_or_default();
        cart.items.retain(|item| &item.product_id != product_id);
        cart.last_sync = self.now();
        self.save_cart(&cart);
        cart
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn get_item_count(&self) -> usize {
        self.get_cart().map_or(0, |cart| cart.items.len())
    }

    /// Whether the cart was last persisted more than [`SYNC_INTERVAL_MS`] ago.
    #[must_use]
    pub fn needs_sync(&self) -> bool {
        self.get_cart()
            .is_some_and(|cart| self.now().saturating_sub(cart.last_sync) > SYNC_INTERVAL_MS)
    }

    /// Stamp the cart as synced, pinning it to `user_id` when given.
    pub fn mark_synced(&self, user_id: Option<&UserId>) {
        let mut cart = self.get_cart().unwrap_or_default();
        cart.last_sync = self.now();
        if let Some(user_id) = user_id {
            cart.user_id = Some(user_id.clone());
        }
        self.save_cart(&cart);
    }

    /// The lines stripped of display data, for the merge request.
    #[must_use]
    pub fn get_cart_for_sync(&self) -> Vec<SyncItem> {
        self.get_cart()
            .map(|cart| {
                cart.items
                    .into_iter()
                    .map(|item| SyncItem {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this cart has already been merged into `user_id`'s cart.
    #[must_use]
    pub fn has_been_synced_for_user(&self, user_id: &UserId) -> bool {
        self.get_cart()
            .is_some_and(|cart| cart.user_id.as_ref() == Some(user_id) && cart.last_sync > 0)
    }
}

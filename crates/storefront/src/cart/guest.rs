//! Guest cart manager.
//!
//! Business rules over [`LocalCartStore`] for the anonymous identity. After
//! every mutation the in-memory mirror is re-read from the store rather than
//! patched, so what callers see is what was actually persisted.

use std::sync::{PoisonError, RwLock};

use marketplace_core::{ProductId, UserId};
use rust_decimal::Decimal;

use super::{CartContents, LocalCart, LocalCartStore, ProductSnapshot, SyncItem};
use crate::auth::AuthSession;
use crate::error::{CartError, Result};
use crate::notify::Notifications;

const WRONG_IDENTITY_MESSAGE: &str = "Please use the authenticated cart system";

/// Cart operations for a signed-out user.
#[derive(Debug)]
pub struct GuestCartManager {
    store: LocalCartStore,
    session: AuthSession,
    notifications: Notifications,
    mirror: RwLock<LocalCart>,
}

impl GuestCartManager {
    /// Create a manager and load whatever the store holds.
    #[must_use]
    pub fn new(store: LocalCartStore, session: AuthSession, notifications: Notifications) -> Self {
        let mirror = RwLock::new(store.get_cart().unwrap_or_default());
        Self {
            store,
            session,
            notifications,
            mirror,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &LocalCartStore {
        &self.store
    }

    /// Add `quantity` of `product_id`, accumulating onto an existing line.
    ///
    /// # Errors
    ///
    /// `WrongIdentity` while signed in, `InvalidQuantity` for zero.
    pub fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
        product: Option<ProductSnapshot>,
    ) -> Result<CartContents> {
        self.ensure_guest()?;
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(i64::from(quantity)));
        }

        self.store.add_item(product_id, quantity, product);
        tracing::debug!(product_id = %product_id, quantity, "Added to guest cart");
        Ok(self.refresh_cart())
    }

    /// Set the absolute quantity of an existing line.
    ///
    /// Quantities below 1 are rejected without touching storage; removal goes
    /// through [`Self::remove_from_cart`].
    ///
    /// # Errors
    ///
    /// `WrongIdentity` while signed in, `InvalidQuantity` below 1.
    pub fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
        product: Option<ProductSnapshot>,
    ) -> Result<CartContents> {
        self.ensure_guest()?;
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        self.store.update_item(product_id, quantity, product);
        Ok(self.refresh_cart())
    }

    /// Drop the line for `product_id`. Absent lines are fine.
    ///
    /// # Errors
    ///
    /// `WrongIdentity` while signed in.
    pub fn remove_from_cart(&self, product_id: &ProductId) -> Result<CartContents> {
        self.ensure_guest()?;
        self.store.remove_item(product_id);
        Ok(self.refresh_cart())
    }

    /// Delete the stored cart and empty the mirror.
    ///
    /// # Errors
    ///
    /// `WrongIdentity` while signed in.
    pub fn clear_cart(&self) -> Result<()> {
        self.ensure_guest()?;
        self.store.clear_cart();
        self.replace_mirror(LocalCart::default());
        Ok(())
    }

    /// Re-read the store into the mirror and return the new contents.
    pub fn refresh_cart(&self) -> CartContents {
        let cart = self.store.get_cart().unwrap_or_default();
        let contents = CartContents::from_local(&cart);
        self.replace_mirror(cart);
        contents
    }

    /// Current contents.
    #[must_use]
    pub fn contents(&self) -> CartContents {
        let mirror = self.mirror.read().unwrap_or_else(PoisonError::into_inner);
        CartContents::from_local(&mirror)
    }

    #[must_use]
    pub fn get_item_quantity(&self, product_id: &ProductId) -> u32 {
        self.contents().item_quantity(product_id)
    }

    /// Distinct lines.
    #[must_use]
    pub fn get_item_count(&self) -> usize {
        self.contents().item_count()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn get_total_items(&self) -> u64 {
        self.contents().total_items()
    }

    #[must_use]
    pub fn get_subtotal(&self) -> Decimal {
        self.contents().subtotal()
    }

    #[must_use]
    pub fn is_in_cart(&self, product_id: &ProductId) -> bool {
        self.contents().contains(product_id)
    }

    /// Lines for the merge request.
    #[must_use]
    pub fn get_cart_for_sync(&self) -> Vec<SyncItem> {
        self.store.get_cart_for_sync()
    }

    /// Flag the stored cart as merged into `user_id`'s cart.
    pub fn mark_synced(&self, user_id: &UserId) {
        self.store.mark_synced(Some(user_id));
        self.refresh_cart();
    }

    #[must_use]
    pub fn has_been_synced_for_user(&self, user_id: &UserId) -> bool {
        self.store.has_been_synced_for_user(user_id)
    }

    fn ensure_guest(&self) -> Result<()> {
        if self.session.is_authenticated() {
            self.notifications.error(WRONG_IDENTITY_MESSAGE);
            return Err(CartError::WrongIdentity);
        }
        Ok(())
    }

    fn replace_mirror(&self, cart: LocalCart) {
        *self.mirror.write().unwrap_or_else(PoisonError::into_inner) = cart;
    }
}

//! Authenticated cart manager.
//!
//! The remote cart is authoritative. Mutations call the API and then re-fetch
//! the whole cart instead of patching local state. Each fetch takes a sequence
//! number when it starts; a response is applied only if no later fetch has
//! already been applied, so a slow early response cannot overwrite a newer
//! cart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use marketplace_core::ProductId;
use rust_decimal::Decimal;
use tracing::instrument;

use super::{CartContents, SyncItem};
use crate::api::{ApiError, CartService};
use crate::auth::AuthSession;
use crate::error::{CartError, Result};
use crate::notify::Notifications;

const SIGN_IN_MESSAGE: &str = "Please sign in to add items to cart";
const ADD_FAILED_MESSAGE: &str = "Failed to add product to cart";
const UPDATE_FAILED_MESSAGE: &str = "Failed to update cart item";
const REMOVE_FAILED_MESSAGE: &str = "Failed to remove item from cart";

#[derive(Debug, Default)]
struct RemoteState {
    contents: CartContents,
    applied_seq: u64,
}

/// Cart operations for a signed-in user, backed by a [`CartService`].
#[derive(Debug)]
pub struct AuthenticatedCartManager<S> {
    service: S,
    session: AuthSession,
    notifications: Notifications,
    state: RwLock<RemoteState>,
    next_seq: AtomicU64,
}

impl<S: CartService> AuthenticatedCartManager<S> {
    #[must_use]
    pub fn new(service: S, session: AuthSession, notifications: Notifications) -> Self {
        Self {
            service,
            session,
            notifications,
            state: RwLock::new(RemoteState::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// The remote cart service.
    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Add `quantity` of `product_id` to the remote cart, then re-fetch.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `InvalidQuantity` for zero, or
    /// the API error. Failures are also sent as notices.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(&self, product_id: &ProductId, quantity: u32) -> Result<CartContents> {
        if !self.session.is_authenticated() {
            self.notifications.error(SIGN_IN_MESSAGE);
            return Err(CartError::NotAuthenticated);
        }
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(i64::from(quantity)));
        }

        self.service
            .add_item(product_id, quantity)
            .await
            .map_err(|e| self.report(ADD_FAILED_MESSAGE, e))?;
        Ok(self.refetch_after_mutation().await)
    }

    /// Set the absolute quantity of a line, then re-fetch.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` below 1 (checked before any call), `NotAuthenticated`
    /// without a session, or the API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(&self, product_id: &ProductId, quantity: i64) -> Result<CartContents> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.ensure_authenticated()?;

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.service
            .update_item(product_id, quantity)
            .await
            .map_err(|e| self.report(UPDATE_FAILED_MESSAGE, e))?;
        Ok(self.refetch_after_mutation().await)
    }

    /// Remove a line, then re-fetch.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, or the API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<CartContents> {
        self.ensure_authenticated()?;

        self.service
            .remove_item(product_id)
            .await
            .map_err(|e| self.report(REMOVE_FAILED_MESSAGE, e))?;
        Ok(self.refetch_after_mutation().await)
    }

    /// Remove every line, one request each. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, or the first API error.
    pub async fn clear_cart(&self) -> Result<CartContents> {
        self.ensure_authenticated()?;

        let lines = self.contents();
        for line in lines.lines() {
            self.service
                .remove_item(&line.product_id)
                .await
                .map_err(|e| self.report(REMOVE_FAILED_MESSAGE, e))?;
        }
        Ok(self.refetch_after_mutation().await)
    }

    /// Fetch the remote cart and apply it unless a newer fetch already was.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session (no request is made), or the API
    /// error. The last applied cart is kept on failure.
    #[instrument(skip(self))]
    pub async fn refresh_cart(&self) -> Result<CartContents> {
        self.ensure_authenticated()?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = self.service.fetch_cart().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to fetch cart");
            CartError::Api(e)
        })?;
        Ok(self.apply(seq, fetched))
    }

    /// Send the guest lines to the merge endpoint and apply the merged cart.
    ///
    /// # Errors
    ///
    /// The API error; nothing is applied.
    #[instrument(skip(self, local_items), fields(items = local_items.len()))]
    pub async fn merge(&self, local_items: &[SyncItem]) -> std::result::Result<CartContents, ApiError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let merged = self.service.merge_cart(local_items).await?;
        Ok(self.apply(seq, merged))
    }

    /// Forget the remote cart, discarding any fetch still in flight.
    pub fn reset(&self) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = RemoteState {
            contents: CartContents::default(),
            applied_seq: seq,
        };
    }

    /// Last applied cart.
    #[must_use]
    pub fn contents(&self) -> CartContents {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contents
            .clone()
    }

    #[must_use]
    pub fn get_item_quantity(&self, product_id: &ProductId) -> u32 {
        self.contents().item_quantity(product_id)
    }

    #[must_use]
    pub fn get_item_count(&self) -> usize {
        self.contents().item_count()
    }

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

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CartError::NotAuthenticated)
        }
    }

    fn report(&self, message: &str, error: ApiError) -> CartError {
        tracing::warn!(error = %error, "{message}");
        self.notifications.error(message);
        CartError::Api(error)
    }

    /// Re-fetch after a successful mutation. A failed re-fetch keeps the
    /// last-known cart; the mutation itself still succeeded.
    async fn refetch_after_mutation(&self) -> CartContents {
        match self.refresh_cart().await {
            Ok(contents) => contents,
            Err(_) => self.contents(),
        }
    }

    fn apply(&self, seq: u64, contents: CartContents) -> CartContents {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if seq < state.applied_seq {
            tracing::debug!(seq, applied = state.applied_seq, "Discarding stale cart response");
            return state.contents.clone();
        }
        state.applied_seq = seq;
        state.contents = contents;
        state.contents.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use marketplace_core::{UserId, UserRole};
    use url::Url;

    use super::*;
    use crate::auth::{AuthTokens, AuthUser, TokenStore};
    use crate::cart::CartLine;
    use crate::cart::test_support::{FakeCartService, snapshot};
    use crate::notify::Notice;
    use crate::storage::MemoryStorage;

    fn session(signed_in: bool) -> AuthSession {
        let session = AuthSession::new(TokenStore::new(
            Some(Arc::new(MemoryStorage::new())),
            Url::parse("http://localhost:4000/").unwrap(),
        ));
        if signed_in {
            session.establish(
                &AuthTokens::new("a", "r"),
                AuthUser {
                    id: UserId::new("u1"),
                    email: None,
                    role: UserRole::Customer,
                },
            );
        }
        session
    }

    fn manager(signed_in: bool) -> (AuthenticatedCartManager<FakeCartService>, Notifications) {
        let notifications = Notifications::new();
        let manager = AuthenticatedCartManager::new(
            FakeCartService::default(),
            session(signed_in),
            notifications.clone(),
        );
        (manager, notifications)
    }

    fn p(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn contents_with(id: &str, quantity: u32) -> CartContents {
        CartContents::new(vec![CartLine {
            product_id: p(id),
            quantity,
            product: Some(snapshot(id, 10)),
        }])
    }

    #[tokio::test]
    async fn test_mutations_refetch_server_state() {
        let (manager, _) = manager(true);

        manager.add_to_cart(&p("p1"), 2).await.unwrap();
        manager.add_to_cart(&p("p1"), 1).await.unwrap();
        assert_eq!(manager.get_item_quantity(&p("p1")), 3);
        assert_eq!(manager.get_subtotal(), Decimal::from(30));

        manager.update_quantity(&p("p1"), 5).await.unwrap();
        assert_eq!(manager.get_total_items(), 5);

        manager.remove_from_cart(&p("p1")).await.unwrap();
        assert!(!manager.is_in_cart(&p("p1")));
        assert_eq!(manager.service().fetch_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_update_below_one_is_rejected_locally() {
        let (manager, _) = manager(true);
        manager.add_to_cart(&p("p1"), 2).await.unwrap();

        let err = manager.update_quantity(&p("p1"), -1).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity(-1)));
        assert_eq!(manager.service().server_quantity("p1"), 2);
        assert_eq!(manager.get_item_quantity(&p("p1")), 2);
    }

    #[tokio::test]
    async fn test_add_requires_session() {
        let (manager, notifications) = manager(false);
        let mut notices = notifications.subscribe();

        let err = manager.add_to_cart(&p("p1"), 1).await.unwrap_err();
        assert!(matches!(err, CartError::NotAuthenticated));
        assert_eq!(
            notices.try_recv().unwrap().text(),
            Some("Please sign in to add items to cart")
        );

        // The query is disabled without a session
        assert!(matches!(
            manager.refresh_cart().await,
            Err(CartError::NotAuthenticated)
        ));
        assert_eq!(manager.service().fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_known_good_and_notifies() {
        let (manager, notifications) = manager(true);
        manager.add_to_cart(&p("p1"), 2).await.unwrap();
        let mut notices = notifications.subscribe();

        manager.service().fail_mutations.store(true, Ordering::SeqCst);
        let err = manager.update_quantity(&p("p1"), 9).await.unwrap_err();
        assert!(matches!(err, CartError::Api(_)));
        assert_eq!(manager.get_item_quantity(&p("p1")), 2);

        let notice = notices.try_recv().unwrap();
        assert!(matches!(notice, Notice::Message { .. }));
        assert_eq!(notice.text(), Some("Failed to update cart item"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_is_discarded() {
        let (manager, _) = manager(true);
        {
            let mut script = manager.service().fetch_script.lock().unwrap();
            script.push_back((Duration::from_millis(100), contents_with("old", 1)));
            script.push_back((Duration::ZERO, contents_with("new", 2)));
        }

        let slow = manager.refresh_cart();
        let fast = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.refresh_cart().await
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert!(fast.unwrap().contains(&p("new")));
        // The slow response arrived last but was older
        assert!(slow.unwrap().contains(&p("new")));
        assert!(manager.is_in_cart(&p("new")));
        assert!(!manager.is_in_cart(&p("old")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_fetch() {
        let (manager, _) = manager(true);
        manager
            .service()
            .fetch_script
            .lock()
            .unwrap()
            .push_back((Duration::from_millis(50), contents_with("p1", 1)));

        let fetch = manager.refresh_cart();
        let reset = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.reset();
        };
        let (fetched, ()) = tokio::join!(fetch, reset);

        assert!(fetched.unwrap().is_empty());
        assert!(manager.contents().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_every_line() {
        let (manager, _) = manager(true);
        manager.add_to_cart(&p("p1"), 1).await.unwrap();
        manager.add_to_cart(&p("p2"), 1).await.unwrap();

        let contents = manager.clear_cart().await.unwrap();
        assert!(contents.is_empty());
        assert!(manager.service().lines.lock().unwrap().is_empty());
    }
}

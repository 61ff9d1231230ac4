//! Unified cart facade.
//!
//! The single entry point for cart UI code. It tracks which identity it has
//! observed, routes every operation to the matching manager through
//! [`CartMode`], merges the guest cart into the server cart once per login,
//! and raises the "added to cart" feedback.
//!
//! # Ordering
//!
//! Identity transitions take the mode gate exclusively and run the merge while
//! holding it; operations take it shared. Before taking it, an operation
//! compares the session with the observed identity and runs the transition
//! itself if the watcher has not caught up yet. An authenticated mutation can
//! therefore never start before the merge attempt for that login finished.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use marketplace_core::ProductId;
use rust_decimal::Decimal;
use tokio::sync::{RwLockReadGuard, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

use super::{
    AddedFeedback, AuthenticatedCartManager, CartContents, GuestCartManager, ProductSnapshot,
};
use crate::api::CartService;
use crate::auth::{AuthSession, AuthStatus};
use crate::error::{Result, add_breadcrumb};
use crate::notify::Notifications;

const SYNC_FAILED_MESSAGE: &str = "Failed to sync cart";

/// What happened to the guest cart when a login was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No transition, nothing to merge, or already merged for this user.
    NotAttempted,
    /// The merge request succeeded with this many lines.
    Merged(usize),
    /// The merge request failed; the guest cart stays unsynced.
    Failed,
}

/// The active cart, selected from the observed identity.
#[derive(Debug)]
pub enum CartMode<'a, S> {
    Guest(&'a GuestCartManager),
    Authenticated(&'a AuthenticatedCartManager<S>),
}

impl<S: CartService> CartMode<'_, S> {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Current contents of the active cart.
    #[must_use]
    pub fn contents(&self) -> CartContents {
        match self {
            Self::Guest(guest) => guest.contents(),
            Self::Authenticated(remote) => remote.contents(),
        }
    }

    /// Add to the active cart. The snapshot is only kept by the guest cart.
    ///
    /// # Errors
    ///
    /// Whatever the active manager rejects or fails with.
    pub async fn add(
        &self,
        product_id: &ProductId,
        quantity: u32,
        product: Option<ProductSnapshot>,
    ) -> Result<CartContents> {
        match self {
            Self::Guest(guest) => guest.add_to_cart(product_id, quantity, product),
            Self::Authenticated(remote) => remote.add_to_cart(product_id, quantity).await,
        }
    }

    /// # Errors
    ///
    /// `InvalidQuantity` below 1, or whatever the active manager fails with.
    pub async fn update(&self, product_id: &ProductId, quantity: i64) -> Result<CartContents> {
        match self {
            Self::Guest(guest) => guest.update_quantity(product_id, quantity, None),
            Self::Authenticated(remote) => remote.update_quantity(product_id, quantity).await,
        }
    }

    /// # Errors
    ///
    /// Whatever the active manager fails with.
    pub async fn remove(&self, product_id: &ProductId) -> Result<CartContents> {
        match self {
            Self::Guest(guest) => guest.remove_from_cart(product_id),
            Self::Authenticated(remote) => remote.remove_from_cart(product_id).await,
        }
    }

    /// Re-read the active cart from its source of truth.
    ///
    /// # Errors
    ///
    /// Fetch failures of the authenticated cart.
    pub async fn refresh(&self) -> Result<CartContents> {
        match self {
            Self::Guest(guest) => Ok(guest.refresh_cart()),
            Self::Authenticated(remote) => remote.refresh_cart().await,
        }
    }

    /// # Errors
    ///
    /// Whatever the active manager fails with.
    pub async fn clear(&self) -> Result<CartContents> {
        match self {
            Self::Guest(guest) => guest.clear_cart().map(|()| CartContents::default()),
            Self::Authenticated(remote) => remote.clear_cart().await,
        }
    }
}

/// One cart per session, whichever identity it belongs to.
#[derive(Debug)]
pub struct UnifiedCart<S> {
    guest: GuestCartManager,
    remote: AuthenticatedCartManager<S>,
    session: AuthSession,
    notifications: Notifications,
    feedback: AddedFeedback,
    gate: tokio::sync::RwLock<()>,
    observed: RwLock<AuthStatus>,
    revision: watch::Sender<u64>,
}

impl<S: CartService> UnifiedCart<S> {
    /// Wire the two managers together. Nothing is observed yet: the first
    /// operation or [`Self::observe_auth`] call applies the session's status.
    #[must_use]
    pub fn new(
        guest: GuestCartManager,
        remote: AuthenticatedCartManager<S>,
        session: AuthSession,
        notifications: Notifications,
        feedback_duration: Duration,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            guest,
            remote,
            session,
            notifications,
            feedback: AddedFeedback::new(feedback_duration),
            gate: tokio::sync::RwLock::new(()),
            observed: RwLock::new(AuthStatus::Anonymous),
            revision,
        }
    }

    /// The active cart.
    #[must_use]
    pub fn mode(&self) -> CartMode<'_, S> {
        if self.observed_status().is_authenticated() {
            CartMode::Authenticated(&self.remote)
        } else {
            CartMode::Guest(&self.guest)
        }
    }

    #[must_use]
    pub const fn guest(&self) -> &GuestCartManager {
        &self.guest
    }

    #[must_use]
    pub const fn remote(&self) -> &AuthenticatedCartManager<S> {
        &self.remote
    }

    /// Bumped after every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Apply an auth status.
    ///
    /// On a transition to a signed-in user, merges the guest lines unless the
    /// cart is empty or already merged for that user, then fetches the server
    /// cart. A failed merge is reported and not retried until the next login
    /// transition. On sign-out, the remote cart is forgotten and the guest
    /// cart resumes from storage.
    #[instrument(skip(self, status), fields(authenticated = status.is_authenticated()))]
    pub async fn observe_auth(&self, status: &AuthStatus) -> MergeOutcome {
        let _gate = self.gate.write().await;
        let previous = self.observed_status();

        let outcome = match (previous.user(), status.user()) {
            (Some(before), Some(now)) if before.id == now.id => {
                self.set_observed(status);
                return MergeOutcome::NotAttempted;
            }
            (None, None) => return MergeOutcome::NotAttempted,
            (Some(_), None) => {
                tracing::info!("Signed out, switching to guest cart");
                self.set_observed(status);
                self.remote.reset();
                self.guest.refresh_cart();
                MergeOutcome::NotAttempted
            }
            (_, Some(user)) => {
                if previous.is_authenticated() {
                    self.remote.reset();
                }
                let outcome = self.merge_guest_cart(&user.id).await;
                if let Err(e) = self.remote.refresh_cart().await {
                    tracing::warn!(error = %e, "Failed to load cart after sign-in");
                }
                // Only now does the authenticated cart become current
                self.set_observed(status);
                outcome
            }
        };

        self.bump();
        outcome
    }

    async fn merge_guest_cart(&self, user_id: &marketplace_core::UserId) -> MergeOutcome {
        let items = self.guest.get_cart_for_sync();
        if items.is_empty() {
            return MergeOutcome::NotAttempted;
        }
        // Checked on every attempt, not once per process
        if self.guest.has_been_synced_for_user(user_id) {
            tracing::debug!(user_id = %user_id, "Guest cart already merged for user");
            return MergeOutcome::NotAttempted;
        }

        match self.remote.merge(&items).await {
            Ok(_) => {
                self.guest.mark_synced(user_id);
                add_breadcrumb(
                    "cart",
                    "Merged guest cart",
                    Some(&[("user_id", user_id.as_str())]),
                );
                tracing::info!(user_id = %user_id, items = items.len(), "Merged guest cart");
                MergeOutcome::Merged(items.len())
            }
            Err(e) => {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    error = %e,
                    sentry_event_id = %event_id,
                    "Guest cart merge failed"
                );
                self.notifications.error(SYNC_FAILED_MESSAGE);
                MergeOutcome::Failed
            }
        }
    }

    /// Follow the session and apply every status change.
    ///
    /// The task runs until aborted.
    pub fn spawn_auth_watcher(self: &Arc<Self>) -> JoinHandle<()>
    where
        S: 'static,
    {
        let cart = Arc::clone(self);
        let mut changes = cart.session.subscribe();
        tokio::spawn(async move {
            loop {
                let status = changes.borrow_and_update().clone();
                cart.observe_auth(&status).await;
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Add to the active cart and raise the feedback signal.
    ///
    /// # Errors
    ///
    /// Whatever the active manager rejects or fails with; no feedback is
    /// raised then.
    #[instrument(skip(self, product), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
        product: Option<ProductSnapshot>,
    ) -> Result<CartContents> {
        let _gate = self.enter().await;
        let contents = self
            .mode()
            .add(product_id, quantity, product.clone())
            .await?;

        add_breadcrumb(
            "cart",
            "Added to cart",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.feedback.raise();

        let shown = product.or_else(|| {
            contents
                .lines()
                .iter()
                .find(|line| &line.product_id == product_id)
                .and_then(|line| line.product.clone())
        });
        if let Some(shown) = shown {
            self.notifications.cart_added(shown, quantity);
        }

        self.bump();
        Ok(contents)
    }

    /// # Errors
    ///
    /// `InvalidQuantity` below 1, or whatever the active manager fails with.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(&self, product_id: &ProductId, quantity: i64) -> Result<CartContents> {
        let _gate = self.enter().await;
        let contents = self.mode().update(product_id, quantity).await?;
        self.bump();
        Ok(contents)
    }

    /// # Errors
    ///
    /// Whatever the active manager fails with.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<CartContents> {
        let _gate = self.enter().await;
        let contents = self.mode().remove(product_id).await?;
        add_breadcrumb(
            "cart",
            "Removed from cart",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.bump();
        Ok(contents)
    }

    /// # Errors
    ///
    /// Fetch failures of the authenticated cart.
    pub async fn refresh_cart(&self) -> Result<CartContents> {
        let _gate = self.enter().await;
        let contents = self.mode().refresh().await?;
        self.bump();
        Ok(contents)
    }

    /// Empty the active cart.
    ///
    /// # Errors
    ///
    /// Whatever the active manager fails with.
    pub async fn clear_cart(&self) -> Result<CartContents> {
        let _gate = self.enter().await;
        let contents = self.mode().clear().await?;
        self.bump();
        Ok(contents)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    #[must_use]
    pub fn contents(&self) -> CartContents {
        self.mode().contents()
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

    /// Sum of `price × quantity`, major currency unit.
    #[must_use]
    pub fn get_subtotal(&self) -> Decimal {
        self.contents().subtotal()
    }

    #[must_use]
    pub fn is_in_cart(&self, product_id: &ProductId) -> bool {
        self.contents().contains(product_id)
    }

    /// Whether the authenticated cart is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.observed_status().is_authenticated()
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    #[must_use]
    pub const fn feedback(&self) -> &AddedFeedback {
        &self.feedback
    }

    /// Whether the "added to cart" feedback is up.
    #[must_use]
    pub fn show_added_feedback(&self) -> bool {
        self.feedback.is_visible()
    }

    /// Close the "added to cart" feedback early.
    pub fn dismiss_added_feedback(&self) {
        self.feedback.dismiss();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn observed_status(&self) -> AuthStatus {
        self.observed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_observed(&self, status: &AuthStatus) {
        *self.observed.write().unwrap_or_else(PoisonError::into_inner) = status.clone();
    }

    /// Catch up with the session, then hold the gate shared.
    async fn enter(&self) -> RwLockReadGuard<'_, ()> {
        let status = self.session.status();
        if self.observed_status() != status {
            self.observe_auth(&status).await;
        }
        self.gate.read().await
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

//! Client state shared across commands and views.

use std::sync::Arc;

use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthSession, TokenStore};
use crate::cart::{AuthenticatedCartManager, GuestCartManager, LocalCartStore, UnifiedCart};
use crate::checkout::CheckoutService;
use crate::config::StorefrontConfig;
use crate::notify::Notifications;
use crate::storage::{FileStorage, KeyValueStorage, StorageError};

/// Error wiring up the storefront.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state directory: {0}")]
    Storage(#[from] StorageError),
    #[error("api client: {0}")]
    Api(#[from] ApiError),
}

/// Everything a storefront session needs, built once from configuration.
///
/// This struct is cheaply cloneable via `Arc`. The cart, auth session and
/// API client share one storage backend and one notification channel.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    storage: Arc<dyn KeyValueStorage>,
    session: AuthSession,
    api: ApiClient,
    cart: Arc<UnifiedCart<ApiClient>>,
    notifications: Notifications,
    checkout: CheckoutService,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("api_url", &self.inner.config.api_url.as_str())
            .field("status", &self.inner.session.status())
            .finish_non_exhaustive()
    }
}

impl Storefront {
    /// Create the storefront with file-backed storage under `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be created or the HTTP
    /// client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::open(&config.state_dir)?);
        Self::with_storage(config, storage)
    }

    /// Create the storefront over an existing storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_storage(
        config: StorefrontConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, StateError> {
        let notifications = Notifications::new();
        let session = AuthSession::new(TokenStore::new(
            Some(Arc::clone(&storage)),
            config.api_url.clone(),
        ));
        let api = ApiClient::new(config.api_url.clone(), config.http_timeout, session.clone())?;

        let guest = GuestCartManager::new(
            LocalCartStore::new(Arc::clone(&storage)),
            session.clone(),
            notifications.clone(),
        );
        let remote = AuthenticatedCartManager::new(api.clone(), session.clone(), notifications.clone());
        let cart = Arc::new(UnifiedCart::new(
            guest,
            remote,
            session.clone(),
            notifications.clone(),
            config.cart_feedback,
        ));

        let checkout = CheckoutService::new(
            api.clone(),
            notifications.clone(),
            config.payment_callback_url.clone(),
        );

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                storage,
                session,
                api,
                cart,
                notifications,
                checkout,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.inner.storage
    }

    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    /// Get a reference to the marketplace API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// The unified cart; clone the `Arc` to spawn its auth watcher.
    #[must_use]
    pub fn cart(&self) -> &Arc<UnifiedCart<ApiClient>> {
        &self.inner.cart
    }

    #[must_use]
    pub fn notifications(&self) -> &Notifications {
        &self.inner.notifications
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}

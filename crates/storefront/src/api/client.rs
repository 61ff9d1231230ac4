//! HTTP client for the marketplace REST API.

use std::sync::Arc;
use std::time::Duration;

use marketplace_core::ProductId;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::instrument;
use url::Url;

use super::types::{
    AddItemRequest, AuthResponse, LoginRequest, MergeRequest, PaymentInitRequest,
    PaymentInitResponse, PaymentVerifyRequest, PaymentVerifyResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, ServerCartEnvelope, UpdateItemRequest,
};
use super::{ApiError, CartService};
use crate::auth::{AuthSession, AuthTokens, AuthUser};
use crate::cart::{CartContents, SyncItem};

/// Longest response body excerpt written to logs.
const LOG_BODY_LIMIT: usize = 500;

/// Marketplace REST API client.
///
/// Cloning is cheap; clones share the connection pool, cookie jar and
/// session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    session: AuthSession,
    /// Serializes refreshes so concurrent `401`s spend the refresh token once.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration, session: AuthSession) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(session.cookie_jar())
            .build()?;

        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url,
                session,
                refresh_lock: Mutex::new(()),
            }),
        })
    }

    /// The session this client authenticates with.
    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    /// API root, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Sign in and establish the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for rejected credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<AuthUser, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&LoginRequest {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await?;

        let body: AuthResponse = parse_json(response).await?;
        Ok(self.establish(body))
    }

    /// Create an account and establish the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the API refuses the registration.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &SecretString,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<AuthUser, ApiError> {
        let url = self.endpoint(&["auth", "register"])?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&RegisterRequest {
                email,
                password: password.expose_secret(),
                first_name,
                last_name,
            })
            .send()
            .await?;

        let body: AuthResponse = parse_json(response).await?;
        Ok(self.establish(body))
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::SessionExpired` when there is no refresh token, or
    /// the API error when the exchange is rejected.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let refresh_token = self
            .inner
            .session
            .refresh_token()
            .ok_or(ApiError::SessionExpired)?;

        let url = self.endpoint(&["auth", "refresh"])?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        let body: RefreshResponse = parse_json(response).await?;
        self.inner
            .session
            .replace_tokens(&AuthTokens::new(body.access_token, body.refresh_token));
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    fn establish(&self, body: AuthResponse) -> AuthUser {
        let tokens = AuthTokens::new(body.access_token, body.refresh_token);
        self.inner.session.establish(&tokens, body.user)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// `POST /payments/initialize`.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` if the request fails.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount))]
    pub async fn initialize_payment(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitResponse, ApiError> {
        let url = self.endpoint(&["payments", "initialize"])?;
        let response = self
            .send_authorized(|client| client.post(url.clone()).json(request))
            .await?;
        parse_json(response).await
    }

    /// `POST /payments/verify`.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` if the request fails.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, reference: &str) -> Result<PaymentVerifyResponse, ApiError> {
        let url = self.endpoint(&["payments", "verify"])?;
        let response = self
            .send_authorized(|client| {
                client
                    .post(url.clone())
                    .json(&PaymentVerifyRequest { reference })
            })
            .await?;
        parse_json(response).await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Build an endpoint URL from path segments. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send with the bearer token; on `401` refresh once and retry once.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.inner.session.access_token();
        let response = with_bearer(build(&self.inner.client), token.as_ref())
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Access token rejected, attempting refresh");
        self.refresh_after_rejection(token.as_ref()).await?;

        let token = self.inner.session.access_token();
        let response = with_bearer(build(&self.inner.client), token.as_ref())
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.inner.session.expire();
            return Err(ApiError::SessionExpired);
        }
        Ok(response)
    }

    async fn refresh_after_rejection(&self, rejected: Option<&SecretString>) -> Result<(), ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;

        // Another request refreshed while this one waited for the lock
        if let (Some(rejected), Some(current)) = (rejected, self.inner.session.access_token())
            && rejected.expose_secret() != current.expose_secret()
        {
            return Ok(());
        }

        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.inner.session.expire();
                Err(ApiError::SessionExpired)
            }
        }
    }
}

impl CartService for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<CartContents, ApiError> {
        let url = self.endpoint(&["enhanced-cart"])?;
        let response = self.send_authorized(|client| client.get(url.clone())).await?;
        let envelope: ServerCartEnvelope = parse_json(response).await?;
        Ok(envelope.cart.map(CartContents::from).unwrap_or_default())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_item(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        let url = self.endpoint(&["enhanced-cart", "items"])?;
        let body = AddItemRequest {
            product_id,
            quantity,
        };
        let response = self
            .send_authorized(|client| client.post(url.clone()).json(&body))
            .await?;
        ensure_success(response).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn update_item(&self, product_id: &ProductId, quantity: u32) -> Result<(), ApiError> {
        let url = self.endpoint(&["enhanced-cart", "items", product_id.as_str()])?;
        let body = UpdateItemRequest { quantity };
        let response = self
            .send_authorized(|client| client.put(url.clone()).json(&body))
            .await?;
        ensure_success(response).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_item(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let url = self.endpoint(&["enhanced-cart", "items", product_id.as_str()])?;
        let response = self
            .send_authorized(|client| client.delete(url.clone()))
            .await?;
        ensure_success(response).await
    }

    #[instrument(skip(self, local_items), fields(items = local_items.len()))]
    async fn merge_cart(&self, local_items: &[SyncItem]) -> Result<CartContents, ApiError> {
        let url = self.endpoint(&["enhanced-cart", "sync"])?;
        let body = MergeRequest { local_items };
        let response = self
            .send_authorized(|client| client.post(url.clone()).json(&body))
            .await?;
        let envelope: ServerCartEnvelope = parse_json(response).await?;
        Ok(envelope.cart.map(CartContents::from).unwrap_or_default())
    }
}

fn with_bearer(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Pull a human-readable message out of an error body.
fn error_message(text: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| excerpt(text, 200))
}

async fn read_body(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    // Read the body as text first for better error diagnostics
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            body = %excerpt(&text, LOG_BODY_LIMIT),
            "Marketplace API returned non-success status"
        );
        return Err(ApiError::Status {
            status,
            message: error_message(&text),
        });
    }
    Ok(text)
}

async fn ensure_success(response: Response) -> Result<(), ApiError> {
    read_body(response).await.map(|_| ())
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let text = read_body(response).await?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %excerpt(&text, LOG_BODY_LIMIT),
            "Failed to parse marketplace API response"
        );
        ApiError::Parse(e)
    })
}

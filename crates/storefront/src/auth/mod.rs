//! Client-side auth session.
//!
//! The session owns the persisted token pair and publishes the current
//! [`AuthStatus`] through a `tokio::sync::watch` channel. Everything that
//! behaves differently for signed-in users (the cart facade, the route guard,
//! the HTTP client) reads the status from here; nothing else decides it.
//!
//! A session is authenticated iff both tokens are present and the access
//! token's payload decodes to an identity.

mod claims;
mod guard;
mod tokens;

pub use claims::{AuthClaims, decode_claims};
pub use guard::{RouteAccess, route_access};
pub use tokens::{AuthTokens, TokenStore};

#[cfg(test)]
pub(crate) use claims::encode_test_token;

use std::sync::Arc;

use marketplace_core::{UserId, UserRole};
use reqwest::cookie::Jar;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::{clear_sentry_user, set_sentry_user};

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

impl From<AuthClaims> for AuthUser {
    fn from(claims: AuthClaims) -> Self {
        Self {
            id: claims.id,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Who the client is acting as.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Anonymous,
    Authenticated(AuthUser),
}

impl AuthStatus {
    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Shared handle on the auth session.
///
/// Cheaply cloneable; all clones observe the same status.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<AuthSessionInner>,
}

struct AuthSessionInner {
    tokens: TokenStore,
    status: watch::Sender<AuthStatus>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Create a session, restoring a previous sign-in from `tokens` if the
    /// stored pair is complete and decodes.
    #[must_use]
    pub fn new(tokens: TokenStore) -> Self {
        let status = tokens
            .load()
            .and_then(|pair| decode_claims(pair.access_token.expose_secret()))
            .map_or(AuthStatus::Anonymous, |claims| {
                AuthStatus::Authenticated(claims.into())
            });

        if let AuthStatus::Authenticated(user) = &status {
            tracing::info!(user_id = %user.id, "Restored signed-in session");
        }

        let (status, _) = watch::channel(status);
        Self {
            inner: Arc::new(AuthSessionInner { tokens, status }),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.inner.status.borrow().clone()
    }

    /// Whether a user is signed in right now.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.status.borrow().is_authenticated()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.status.borrow().user().cloned()
    }

    /// Receive every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.inner.status.subscribe()
    }

    /// Cookie jar mirroring the tokens.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.inner.tokens.cookie_jar()
    }

    /// The bearer token to attach to requests.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.inner.tokens.load().map(|pair| pair.access_token)
    }

    /// The token to exchange on `401`.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.inner.tokens.load().map(|pair| pair.refresh_token)
    }

    /// Record a successful login or registration.
    ///
    /// Claims in the access token win over the `user` returned alongside it
    /// when both are present.
    pub fn establish(&self, tokens: &AuthTokens, user: AuthUser) -> AuthUser {
        self.inner.tokens.save(tokens);

        let user = decode_claims(tokens.access_token.expose_secret())
            .map_or(user, AuthUser::from);

        set_sentry_user(&user.id, user.email.as_deref());
        tracing::info!(user_id = %user.id, role = %user.role, "Signed in");

        self.inner
            .status
            .send_replace(AuthStatus::Authenticated(user.clone()));
        user
    }

    /// Store a refreshed token pair without changing who is signed in.
    pub fn replace_tokens(&self, tokens: &AuthTokens) {
        self.inner.tokens.save(tokens);
    }

    /// Sign out: drop the tokens and publish [`AuthStatus::Anonymous`].
    pub fn logout(&self) {
        self.inner.tokens.clear();
        clear_sentry_user();
        tracing::info!("Signed out");
        self.inner.status.send_replace(AuthStatus::Anonymous);
    }

    /// Tear the session down after the refresh token was rejected.
    pub fn expire(&self) {
        tracing::warn!("Session expired, re-authentication required");
        self.logout();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::storage::{KeyValueStorage, MemoryStorage};

    fn token_store(storage: &MemoryStorage) -> TokenStore {
        TokenStore::new(
            Some(Arc::new(storage.clone())),
            Url::parse("http://localhost:4000/").unwrap(),
        )
    }

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: UserId::new(id),
            email: None,
            role: UserRole::Customer,
        }
    }

    #[test]
    fn test_starts_anonymous_without_tokens() {
        let session = AuthSession::new(token_store(&MemoryStorage::new()));
        assert_eq!(session.status(), AuthStatus::Anonymous);
        assert!(session.access_token().is_none());
    }

    #[test]
    fn test_restores_from_storage() {
        let storage = MemoryStorage::new();
        let access = encode_test_token(&json!({ "id": "u7", "role": "ADMIN" }));
        storage.set("accessToken", &access).unwrap();
        storage.set("refreshToken", "r").unwrap();

        let session = AuthSession::new(token_store(&storage));
        let user = session.current_user().unwrap();
        assert_eq!(user.id, UserId::new("u7"));
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_undecodable_token_is_anonymous() {
        let storage = MemoryStorage::new();
        storage.set("accessToken", "opaque").unwrap();
        storage.set("refreshToken", "r").unwrap();

        let session = AuthSession::new(token_store(&storage));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_establish_and_logout_publish_status() {
        let storage = MemoryStorage::new();
        let session = AuthSession::new(token_store(&storage));
        let mut rx = session.subscribe();

        let signed_in = session.establish(&AuthTokens::new("opaque", "r"), user("u1"));
        assert_eq!(signed_in.id, UserId::new("u1"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), AuthStatus::Authenticated(user("u1")));
        assert_eq!(storage.get("accessToken").unwrap().as_deref(), Some("opaque"));

        session.logout();
        assert_eq!(*rx.borrow_and_update(), AuthStatus::Anonymous);
        assert_eq!(storage.get("accessToken").unwrap(), None);
    }

    #[test]
    fn test_establish_prefers_token_claims() {
        let session = AuthSession::new(token_store(&MemoryStorage::new()));
        let access = encode_test_token(&json!({ "id": "from-claims", "role": "VENDOR" }));

        let signed_in = session.establish(&AuthTokens::new(access, "r"), user("from-body"));
        assert_eq!(signed_in.id, UserId::new("from-claims"));
        assert_eq!(signed_in.role, UserRole::Vendor);
    }

    #[test]
    fn test_replace_tokens_keeps_user() {
        let session = AuthSession::new(token_store(&MemoryStorage::new()));
        session.establish(&AuthTokens::new("a1", "r1"), user("u1"));

        session.replace_tokens(&AuthTokens::new("a2", "r2"));
        assert_eq!(session.access_token().unwrap().expose_secret(), "a2");
        assert_eq!(session.current_user().unwrap().id, UserId::new("u1"));
    }
}

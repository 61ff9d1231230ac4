//! Access/refresh token persistence.
//!
//! Tokens live in client storage under [`ACCESS_TOKEN_KEY`] and
//! [`REFRESH_TOKEN_KEY`], and are mirrored into the HTTP cookie jar so that
//! request-time checks performed by the server see them too.

use std::sync::Arc;

use reqwest::cookie::Jar;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::storage::{ACCESS_TOKEN_KEY, KeyValueStorage, REFRESH_TOKEN_KEY};

/// Cookie lifetime of the access token (1 hour).
const ACCESS_COOKIE_MAX_AGE: u32 = 3600;
/// Cookie lifetime of the refresh token (1 day).
const REFRESH_COOKIE_MAX_AGE: u32 = 86_400;

/// A pair of bearer tokens issued by login, register or refresh.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl AuthTokens {
    /// Wrap raw token strings.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }
}

/// Durable token storage with a cookie mirror.
#[derive(Clone)]
pub struct TokenStore {
    storage: Option<Arc<dyn KeyValueStorage>>,
    cookies: Arc<Jar>,
    origin: Url,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("attached", &self.storage.is_some())
            .field("origin", &self.origin.as_str())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Create a token store whose cookies are scoped to `origin`.
    #[must_use]
    pub fn new(storage: Option<Arc<dyn KeyValueStorage>>, origin: Url) -> Self {
        Self {
            storage,
            cookies: Arc::new(Jar::default()),
            origin,
        }
    }

    /// The cookie jar the HTTP client should send from.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookies)
    }

    /// Load both tokens. A half-present pair counts as absent.
    #[must_use]
    pub fn load(&self) -> Option<AuthTokens> {
        let storage = self.storage.as_ref()?;
        let read = |key: &str| match storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, key, "Failed to read token");
                None
            }
        };

        let access = read(ACCESS_TOKEN_KEY)?;
        let refresh = read(REFRESH_TOKEN_KEY)?;
        let tokens = AuthTokens::new(access, refresh);
        self.mirror(&tokens);
        Some(tokens)
    }

    /// Persist both tokens and refresh the cookie mirror.
    pub fn save(&self, tokens: &AuthTokens) {
        if let Some(storage) = self.storage.as_ref() {
            for (key, value) in [
                (ACCESS_TOKEN_KEY, &tokens.access_token),
                (REFRESH_TOKEN_KEY, &tokens.refresh_token),
            ] {
                if let Err(e) = storage.set(key, value.expose_secret()) {
                    tracing::warn!(error = %e, key, "Failed to save token");
                }
            }
        }
        self.mirror(tokens);
    }

    /// Remove both tokens and expire their cookies.
    pub fn clear(&self) {
        if let Some(storage) = self.storage.as_ref() {
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                if let Err(e) = storage.remove(key) {
                    tracing::warn!(error = %e, key, "Failed to clear token");
                }
            }
        }
        for name in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            self.cookies.add_cookie_str(
                &format!("{name}=; Path=/; Max-Age=0; SameSite=Strict"),
                &self.origin,
            );
        }
    }

    fn mirror(&self, tokens: &AuthTokens) {
        self.cookies.add_cookie_str(
            &format!(
                "{ACCESS_TOKEN_KEY}={}; Path=/; Max-Age={ACCESS_COOKIE_MAX_AGE}; SameSite=Strict",
                tokens.access_token.expose_secret()
            ),
            &self.origin,
        );
        self.cookies.add_cookie_str(
            &format!(
                "{REFRESH_TOKEN_KEY}={}; Path=/; Max-Age={REFRESH_COOKIE_MAX_AGE}; SameSite=Strict",
                tokens.refresh_token.expose_secret()
            ),
            &self.origin,
        );
    }
}

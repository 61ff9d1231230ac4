//! Access token payload decoding.
//!
//! The client reads identity and role out of the JWT payload segment. No
//! signature check happens here; the API verifies tokens on every request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use marketplace_core::{UserId, UserRole};
use serde::Deserialize;

/// Claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthClaims {
    #[serde(alias = "sub", alias = "userId")]
    pub id: UserId,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload of a compact JWT.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON payload carrying at least an id.
#[must_use]
pub fn decode_claims(token: &str) -> Option<AuthClaims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

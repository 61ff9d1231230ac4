//! Cart error type and Sentry helpers.
//!
//! Cart operations return `Result<T, CartError>`. Storage problems never show
//! up here; the local store logs and swallows them.

use thiserror::Error;

use crate::api::ApiError;

/// Why a cart operation was refused or failed.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity below 1 passed to add or update.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Guest cart used while signed in.
    #[error("Guest cart is unavailable while signed in")]
    WrongIdentity,

    /// Authenticated cart used without a session.
    #[error("Not signed in")]
    NotAuthenticated,

    /// Remote cart call failed.
    #[error("Cart API error: {0}")]
    Api(#[from] ApiError),
}

impl CartError {
    /// Whether the failure came from a torn-down session.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::Api(ApiError::SessionExpired))
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Record a cart action breadcrumb.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data.unwrap_or_default() {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

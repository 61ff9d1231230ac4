//! Marketplace REST API client.
//!
//! # Architecture
//!
//! - [`ApiClient`] - `reqwest` client with bearer auth and one-shot refresh
//! - [`CartService`] - the remote cart operations the authenticated cart
//!   manager depends on; implemented by [`ApiClient`] and by test fakes
//!
//! A `401` on any authorized call triggers exactly one `POST /auth/refresh`.
//! If that succeeds the original request is retried once; otherwise the
//! session is torn down and the call fails with [`ApiError::SessionExpired`].

mod client;
pub mod types;

pub use client::ApiClient;
pub use types::*;

use std::future::Future;

use marketplace_core::ProductId;
use thiserror::Error;

use crate::cart::{CartContents, SyncItem};

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    /// Refresh token missing or rejected; the user must sign in again.
    #[error("Session expired")]
    SessionExpired,

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A response was missing a field the client needs.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    /// HTTP status of a rejected request, if that is what this is.
    #[must_use]
    pub const fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Remote cart operations.
///
/// Mutations return nothing useful: the caller re-fetches the cart afterwards
/// and treats that as ground truth.
pub trait CartService: Send + Sync {
    /// `GET /enhanced-cart`.
    fn fetch_cart(&self) -> impl Future<Output = Result<CartContents, ApiError>> + Send;

    /// `POST /enhanced-cart/items`.
    fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `PUT /enhanced-cart/items/{productId}`.
    fn update_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /enhanced-cart/items/{productId}`.
    fn remove_item(&self, product_id: &ProductId)
    -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /enhanced-cart/sync`, returning the merged cart.
    fn merge_cart(
        &self,
        local_items: &[SyncItem],
    ) -> impl Future<Output = Result<CartContents, ApiError>> + Send;
}

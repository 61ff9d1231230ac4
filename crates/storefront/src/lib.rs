//! Marketplace storefront client library.
//!
//! Keeps a shopper's cart consistent across sign-in: an anonymous cart
//! persisted locally, an authenticated cart owned by the marketplace API, and
//! a one-time merge of the former into the latter when a session starts.
//! Also carries the auth session (tokens, refresh, route guard) and the
//! checkout handoff to the payment gateway.
//!
//! [`state::Storefront`] wires everything together from a
//! [`config::StorefrontConfig`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notify;
pub mod presentation;
pub mod state;
pub mod storage;

pub use auth::{AuthSession, AuthStatus, AuthUser};
pub use cart::{CartContents, CartLine, MergeOutcome, ProductSnapshot, UnifiedCart};
pub use config::StorefrontConfig;
pub use error::{CartError, Result};
pub use state::Storefront;

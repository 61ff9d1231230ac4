//! Marketplace Core - Shared types library.
//!
//! This crate provides common types used across all marketplace components:
//! - `storefront` - Client-side cart, auth session and checkout subsystem
//! - `cli` - Command-line driver for the storefront subsystem
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, roles and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

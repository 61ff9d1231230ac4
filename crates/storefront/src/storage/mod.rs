//! Durable client-side key-value storage.
//!
//! # Keys
//!
//! Everything the client persists lives under a handful of fixed keys:
//!
//! - [`CART_STORAGE_KEY`] - serialized guest cart (`{items, lastSync, userId?}`)
//! - [`ACCESS_TOKEN_KEY`] - bearer token attached to API requests
//! - [`REFRESH_TOKEN_KEY`] - token exchanged for a new access token on `401`
//!
//! # Backends
//!
//! - [`MemoryStorage`] - process-local map, used by tests and ephemeral sessions
//! - [`FileStorage`] - one file per key under a state directory, used by the CLI
//!
//! Storage is synchronous on purpose: every read-modify-write of the cart blob
//! happens inside a single store call, so nothing can interleave with it.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Key holding the guest cart blob.
pub const CART_STORAGE_KEY: &str = "marketplace_cart";
/// Key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the operation (quota, permissions, disabled).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A previous writer panicked while holding the backend lock.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// A synchronous string key-value store.
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

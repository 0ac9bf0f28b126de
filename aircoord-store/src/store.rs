//! The shared state store abstraction
//!
//! Every aircoord process sees the same key/value space through this trait.
//! Writes are unconditional and last-writer-wins; there are no transactions
//! and no compare-and-swap.

use aircoord_core::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Expiry state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (or already expired)
    Missing,
    /// Key exists and never expires
    Persistent,
    /// Key exists and expires after the given time
    Expires(Duration),
}

/// Key/value store with per-key expiry
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a key without expiry
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Overwrite a key that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Expiry state of a key
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Set the expiry of an existing key, returning whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remaining time to live; zero when the key is absent.
    ///
    /// Keys without expiry report `Duration::MAX`.
    async fn ttl_remaining(&self, key: &str) -> Result<Duration> {
        Ok(match self.ttl(key).await? {
            KeyTtl::Missing => Duration::ZERO,
            KeyTtl::Persistent => Duration::MAX,
            KeyTtl::Expires(remaining) => remaining,
        })
    }

    /// Does the key currently exist?
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(!matches!(self.ttl(key).await?, KeyTtl::Missing))
    }
}

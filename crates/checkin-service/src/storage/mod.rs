//! Storage backends for the token registry and the customer store.
//!
//! Both stores come in two flavours: an in-process implementation used for
//! single-instance deployments and tests, and a Redis implementation for
//! anything that must survive a restart or be shared between instances.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_common::{AccessToken, Customer, Error, PhoneNumber, Result};
use std::future::Future;
use std::time::Duration;

pub use self::memory::{MemoryCustomerStore, MemoryTokenRegistry};
pub use self::redis_store::{RedisCustomerStore, RedisTokenRegistry};

/// Process-wide registry of issued access tokens.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Register a token. Returns `Ok(false)` if the value is already taken.
    async fn insert(&self, token: &AccessToken) -> Result<bool>;

    async fn get(&self, value: &str) -> Result<Option<AccessToken>>;

    /// Returns `Ok(true)` if this call removed the entry.
    async fn remove(&self, value: &str) -> Result<bool>;

    /// Drop every entry expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn health_check(&self) -> Result<()>;
}

/// A stored value tagged with the version it was read at.
///
/// Version 0 means "not stored yet"; every successful write bumps it by one.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Durable keyed store of customer records.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<Versioned<Customer>>>;

    /// Write `customer` only if the stored version still equals `expected_version`
    /// (0 to create). Returns `Ok(false)` on a lost race.
    async fn compare_and_swap(&self, expected_version: u64, customer: &Customer) -> Result<bool>;

    /// Allocate the next customer id.
    async fn next_id(&self) -> Result<u64>;

    async fn count(&self) -> Result<usize>;

    async fn health_check(&self) -> Result<()>;
}

/// Run a storage future with an upper time bound.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::StorageUnavailable(format!(
            "storage did not respond within {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

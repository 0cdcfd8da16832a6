//! In-process stores. State is lost on restart.

use super::{CustomerStore, TokenRegistry, Versioned};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_common::{AccessToken, Customer, PhoneNumber, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

// Critical sections below never await and never panic mid-update, so a
// poisoned lock still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryTokenRegistry {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl MemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.tokens).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenRegistry for MemoryTokenRegistry {
    async fn insert(&self, token: &AccessToken) -> Result<bool> {
        let mut tokens = lock(&self.tokens);
        if tokens.contains_key(&token.value) {
            return Ok(false);
        }
        tokens.insert(token.value.clone(), token.clone());
        Ok(true)
    }

    async fn get(&self, value: &str) -> Result<Option<AccessToken>> {
        Ok(lock(&self.tokens).get(value).cloned())
    }

    async fn remove(&self, value: &str) -> Result<bool> {
        Ok(lock(&self.tokens).remove(value).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tokens = lock(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired(now));
        let purged = before - tokens.len();
        if purged > 0 {
            debug!("Purged {} expired tokens", purged);
        }
        Ok(purged)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCustomerStore {
    customers: Mutex<HashMap<PhoneNumber, Versioned<Customer>>>,
    last_id: AtomicU64,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<Versioned<Customer>>> {
        Ok(lock(&self.customers).get(phone).cloned())
    }

    async fn compare_and_swap(&self, expected_version: u64, customer: &Customer) -> Result<bool> {
        let mut customers = lock(&self.customers);
        let current_version = customers
            .get(&customer.phone)
            .map(|stored| stored.version)
            .unwrap_or(0);

        if current_version != expected_version {
            return Ok(false);
        }

        customers.insert(
            customer.phone.clone(),
            Versioned {
                version: expected_version + 1,
                value: customer.clone(),
            },
        );
        Ok(true)
    }

    async fn next_id(&self) -> Result<u64> {
        Ok(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn count(&self) -> Result<usize> {
        Ok(lock(&self.customers).len())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn customer(id: u64) -> Customer {
        Customer::new(
            id,
            PhoneNumber::parse("5551234567").unwrap(),
            "Ada".to_string(),
            "ada@example.com".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_token_insert_is_exclusive() {
        let registry = MemoryTokenRegistry::new();
        let token = AccessToken::generate(Utc::now(), Duration::seconds(300));

        assert!(registry.insert(&token).await.unwrap());
        assert!(!registry.insert(&token).await.unwrap());
        assert_eq!(registry.get(&token.value).await.unwrap(), Some(token.clone()));

        assert!(registry.remove(&token.value).await.unwrap());
        assert!(!registry.remove(&token.value).await.unwrap());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_tokens() {
        let registry = MemoryTokenRegistry::new();
        let now = Utc::now();
        let old = AccessToken::generate(now - Duration::seconds(600), Duration::seconds(300));
        let fresh = AccessToken::generate(now, Duration::seconds(300));
        registry.insert(&old).await.unwrap();
        registry.insert(&fresh).await.unwrap();

        assert_eq!(registry.purge_expired(now).await.unwrap(), 1);
        assert!(registry.get(&old.value).await.unwrap().is_none());
        assert!(registry.get(&fresh.value).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_compare_and_swap_versions() {
        let store = MemoryCustomerStore::new();
        let mut c = customer(1);

        assert!(store.compare_and_swap(0, &c).await.unwrap());
        // A second create loses.
        assert!(!store.compare_and_swap(0, &c).await.unwrap());

        let stored = store.load(&c.phone).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);

        c.total_visits = 1;
        assert!(store.compare_and_swap(1, &c).await.unwrap());
        assert!(!store.compare_and_swap(1, &c).await.unwrap());
        assert_eq!(store.load(&c.phone).await.unwrap().unwrap().version, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = MemoryCustomerStore::new();
        assert_eq!(store.next_id().await.unwrap(), 1);
        assert_eq!(store.next_id().await.unwrap(), 2);
    }
}

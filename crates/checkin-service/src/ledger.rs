//! Loyalty ledger: the per-customer accrual transition.
//!
//! Updates for one phone number are serialized twice over: an in-process
//! lock keyed by phone keeps local requests in line, and the store's
//! compare-and-swap catches writers in other processes sharing the store.
//! Different phone numbers never wait on each other.

use crate::storage::{bounded, CustomerStore};
use loyalty_common::{AccrualResult, Clock, Customer, Error, PhoneNumber, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Optimistic write attempts before reporting the store as unavailable.
const MAX_SWAP_ATTEMPTS: usize = 8;

/// Smallest table size at which idle lock entries are pruned.
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 1024;

struct LockTable {
    entries: HashMap<String, Arc<AsyncMutex<()>>>,
    /// Size at which the next prune runs; at least twice the entries that
    /// survived the last one, so pruning stays amortized O(1) per lock.
    prune_at: usize,
}

impl Default for LockTable {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: LOCK_TABLE_PRUNE_THRESHOLD,
        }
    }
}

/// One async mutex per key, created on demand.
#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<LockTable>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.entries.len() >= table.prune_at {
                // Only the table holds a reference to an idle entry.
                table.entries.retain(|_, m| Arc::strong_count(m) > 1);
                table.prune_at = (table.entries.len() * 2).max(LOCK_TABLE_PRUNE_THRESHOLD);
            }
            table.entries.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LoyaltyLedger {
    store: Arc<dyn CustomerStore>,
    clock: Arc<dyn Clock>,
    reward_threshold: u32,
    timeout: Duration,
    locks: KeyedLocks,
}

impl LoyaltyLedger {
    pub fn new(
        store: Arc<dyn CustomerStore>,
        clock: Arc<dyn Clock>,
        reward_threshold: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            reward_threshold,
            timeout,
            locks: KeyedLocks::new(),
        }
    }

    pub fn reward_threshold(&self) -> u32 {
        self.reward_threshold
    }

    /// Record one visit for `phone`, creating the customer on first sighting.
    pub async fn accrue_visit(
        &self,
        phone: &PhoneNumber,
        name: &str,
        email: &str,
    ) -> Result<AccrualResult> {
        let _guard = self.locks.lock(phone.as_str()).await;

        for attempt in 1..=MAX_SWAP_ATTEMPTS {
            let now = self.clock.now();

            let (version, mut customer) = match bounded(self.timeout, self.store.load(phone)).await?
            {
                Some(stored) => (stored.version, stored.value),
                None => {
                    let id = bounded(self.timeout, self.store.next_id()).await?;
                    let customer =
                        Customer::new(id, phone.clone(), name.to_string(), email.to_string(), now);
                    (0, customer)
                }
            };

            let earned_reward = customer.record_visit(name, email, self.reward_threshold, now);

            if bounded(self.timeout, self.store.compare_and_swap(version, &customer)).await? {
                if version == 0 {
                    info!(customer_id = customer.id, phone = %phone.masked(), "Created customer");
                }
                if earned_reward {
                    info!(
                        customer_id = customer.id,
                        total_rewards = customer.total_rewards,
                        "Reward earned"
                    );
                }
                debug!(
                    customer_id = customer.id,
                    total_visits = customer.total_visits,
                    current_points = customer.current_points,
                    "Visit recorded"
                );
                return Ok(AccrualResult::new(
                    &customer,
                    earned_reward,
                    self.reward_threshold,
                ));
            }

            debug!(attempt, phone = %phone.masked(), "Concurrent customer update, retrying");
        }

        Err(Error::StorageUnavailable(format!(
            "customer record still contended after {} attempts",
            MAX_SWAP_ATTEMPTS
        )))
    }

    pub async fn customer_count(&self) -> Result<usize> {
        bounded(self.timeout, self.store.count()).await
    }

    pub async fn health_check(&self) -> Result<()> {
        bounded(self.timeout, self.store.health_check()).await
    }
}

//! Redis-backed stores
//!
//! Data model:
//! - checkin:token:{value} → JSON AccessToken, TTL = validity window
//! - checkin:customer:{phone} → Hash { version, data (JSON Customer) }
//! - checkin:customers:all → Set of known phone numbers
//! - checkin:customers:next_id → Counter for customer ids

use super::{CustomerStore, TokenRegistry, Versioned};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_common::{AccessToken, Customer, Error, PhoneNumber, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

const TOKEN_PREFIX: &str = "checkin:token";
const CUSTOMER_PREFIX: &str = "checkin:customer";
const CUSTOMER_INDEX: &str = "checkin:customers:all";
const CUSTOMER_ID_COUNTER: &str = "checkin:customers:next_id";

/// Version check and write in a single server-side step.
const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current == false then
  current = '0'
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
redis.call('SADD', KEYS[2], ARGV[4])
return 1
"#;

/// Host and port only; the URL may carry credentials.
fn server_address(client: &redis::Client) -> String {
    client.get_connection_info().addr.to_string()
}

async fn connect(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
    let address = server_address(&client);

    let conn = ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", address))?;

    info!("Connected to Redis at {}", address);
    Ok(conn)
}

async fn ping(conn: &mut ConnectionManager) -> Result<()> {
    let _: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(Error::unavailable)?;
    Ok(())
}

/// Token registry relying on Redis key expiry.
#[derive(Clone)]
pub struct RedisTokenRegistry {
    conn: ConnectionManager,
}

impl RedisTokenRegistry {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            conn: connect(redis_url).await?,
        })
    }

    fn key(value: &str) -> String {
        format!("{}:{}", TOKEN_PREFIX, value)
    }
}

#[async_trait]
impl TokenRegistry for RedisTokenRegistry {
    async fn insert(&self, token: &AccessToken) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(token)?;
        // One second of slack so the registry, not Redis, decides the boundary.
        let ttl_secs = token.validity_seconds().max(0) + 1;

        // SET NX EX - registers and schedules expiry atomically
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::key(&token.value))
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(Error::unavailable)?;

        Ok(reply.is_some())
    }

    async fn get(&self, value: &str) -> Result<Option<AccessToken>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(Self::key(value))
            .await
            .map_err(Error::unavailable)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(Self::key(value))
            .await
            .map_err(Error::unavailable)?;
        Ok(removed > 0)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        // Redis expires token keys on its own.
        Ok(0)
    }

    async fn health_check(&self) -> Result<()> {
        ping(&mut self.conn.clone()).await
    }
}

/// Customer store with optimistic versioning.
#[derive(Clone)]
pub struct RedisCustomerStore {
    conn: ConnectionManager,
    compare_and_swap: redis::Script,
}

impl RedisCustomerStore {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            conn: connect(redis_url).await?,
            compare_and_swap: redis::Script::new(COMPARE_AND_SWAP_SCRIPT),
        })
    }

    fn key(phone: &PhoneNumber) -> String {
        format!("{}:{}", CUSTOMER_PREFIX, phone)
    }
}

#[async_trait]
impl CustomerStore for RedisCustomerStore {
    async fn load(&self, phone: &PhoneNumber) -> Result<Option<Versioned<Customer>>> {
        let mut conn = self.conn.clone();
        let (version, data): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(Self::key(phone))
            .arg("version")
            .arg("data")
            .query_async(&mut conn)
            .await
            .map_err(Error::unavailable)?;

        match (version, data) {
            (Some(version), Some(data)) => {
                let customer: Customer = serde_json::from_str(&data)?;
                debug!("Loaded customer {} at version {}", customer.id, version);
                Ok(Some(Versioned {
                    version,
                    value: customer,
                }))
            }
            _ => Ok(None),
        }
    }

    async fn compare_and_swap(&self, expected_version: u64, customer: &Customer) -> Result<bool> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(customer)?;

        let swapped: i64 = self
            .compare_and_swap
            .key(Self::key(&customer.phone))
            .key(CUSTOMER_INDEX)
            .arg(expected_version)
            .arg(expected_version + 1)
            .arg(json)
            .arg(customer.phone.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(Error::unavailable)?;

        Ok(swapped == 1)
    }

    async fn next_id(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let id: u64 = conn
            .incr(CUSTOMER_ID_COUNTER, 1)
            .await
            .map_err(Error::unavailable)?;
        Ok(id)
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn
            .scard(CUSTOMER_INDEX)
            .await
            .map_err(Error::unavailable)?;
        Ok(count)
    }

    async fn health_check(&self) -> Result<()> {
        ping(&mut self.conn.clone()).await
    }
}

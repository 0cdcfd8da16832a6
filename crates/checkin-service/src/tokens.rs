//! Access token issuance and validation.

use crate::storage::{bounded, TokenRegistry};
use loyalty_common::{AccessToken, Clock, Error, Result, TokenStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attempts before giving up on finding an unused token value.
const MAX_ISSUE_ATTEMPTS: usize = 3;

pub struct TokenService {
    registry: Arc<dyn TokenRegistry>,
    clock: Arc<dyn Clock>,
    validity: chrono::Duration,
    timeout: Duration,
}

impl TokenService {
    pub fn new(
        registry: Arc<dyn TokenRegistry>,
        clock: Arc<dyn Clock>,
        validity: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            clock,
            validity,
            timeout,
        }
    }

    pub fn validity_seconds(&self) -> i64 {
        self.validity.num_seconds()
    }

    /// Mint and register a new token.
    pub async fn issue(&self) -> Result<AccessToken> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = AccessToken::generate(self.clock.now(), self.validity);
            if bounded(self.timeout, self.registry.insert(&token)).await? {
                info!(expires_at = %token.expires_at, "Issued access token");
                return Ok(token);
            }
            warn!("Token value collision, regenerating");
        }

        Err(Error::StorageUnavailable(
            "could not register a unique token value".to_string(),
        ))
    }

    /// Check a token value.
    ///
    /// Malformed, unknown and expired values all come back as invalid without
    /// telling which. Expired entries are evicted on the way out.
    pub async fn validate(&self, value: &str) -> Result<TokenStatus> {
        if !AccessToken::is_well_formed(value) {
            debug!("Rejected malformed token value");
            return Ok(TokenStatus::invalid());
        }

        let token = match bounded(self.timeout, self.registry.get(value)).await? {
            Some(token) => token,
            None => {
                debug!("Token not found");
                return Ok(TokenStatus::invalid());
            }
        };

        let now = self.clock.now();
        if token.is_expired(now) {
            debug!("Token expired at {}, evicting", token.expires_at);
            bounded(self.timeout, self.registry.remove(value)).await?;
            return Ok(TokenStatus::invalid());
        }

        Ok(TokenStatus::valid(token.remaining_seconds(now)))
    }

    /// Validate and remove in one go. Only the caller whose removal succeeds
    /// gets the token back, so a token can be consumed at most once.
    pub async fn consume(&self, value: &str) -> Result<Option<AccessToken>> {
        if !AccessToken::is_well_formed(value) {
            return Ok(None);
        }
        let token = match bounded(self.timeout, self.registry.get(value)).await? {
            Some(token) if !token.is_expired(self.clock.now()) => token,
            _ => return Ok(None),
        };
        if !bounded(self.timeout, self.registry.remove(value)).await? {
            return Ok(None);
        }
        debug!("Consumed access token");
        Ok(Some(token))
    }

    /// Put a consumed token back, keeping its original expiry. Used when the
    /// work the token was spent on did not happen.
    pub async fn restore(&self, token: &AccessToken) -> Result<bool> {
        if token.is_expired(self.clock.now()) {
            return Ok(false);
        }
        let restored = bounded(self.timeout, self.registry.insert(token)).await?;
        if restored {
            debug!("Restored access token");
        }
        Ok(restored)
    }

    pub async fn health_check(&self) -> Result<()> {
        bounded(self.timeout, self.registry.health_check()).await
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        bounded(self.timeout, self.registry.purge_expired(self.clock.now())).await
    }

    /// Periodically drop expired tokens for registries without native expiry.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.purge_expired().await {
                    warn!("Token sweep failed: {}", e);
                }
            }
        })
    }
}

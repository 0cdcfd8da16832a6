//! Configuration management for the Check-in Service
//!
//! Loads configuration from environment variables with sensible defaults.
//! None of these values can be influenced by a client request.

use anyhow::{Context, Result};
use loyalty_common::{Coordinates, GeoFence};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Longest accepted token validity window: one week
const MAX_TOKEN_VALIDITY_SECS: u64 = 7 * 24 * 60 * 60;

/// Where tokens and customers are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process maps, cleared on restart
    Memory,
    /// Shared Redis instance
    Redis,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => anyhow::bail!("Unknown STORAGE_BACKEND '{}' (expected memory/redis)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Storage backend selection
    pub storage_backend: StorageBackend,

    /// Redis connection URL (used when `storage_backend` is Redis)
    pub redis_url: String,

    /// Store center latitude
    pub store_latitude: f64,

    /// Store center longitude
    pub store_longitude: f64,

    /// Geofence radius in meters
    pub geofence_radius_meters: f64,

    /// How long an issued token stays valid, in seconds
    pub token_validity_secs: u64,

    /// Whether a token is consumed by its first successful check-in
    pub token_single_use: bool,

    /// Points needed for a reward
    pub reward_threshold: u32,

    /// Upper bound for a single storage round-trip, in milliseconds
    pub storage_timeout_ms: u64,

    /// How often expired in-memory tokens are swept, in seconds
    pub token_sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            storage_backend: StorageBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            store_latitude: 40.7128,
            store_longitude: -74.0060,
            geofence_radius_meters: 100.0,
            token_validity_secs: 300,
            token_single_use: false,
            reward_threshold: 5,
            storage_timeout_ms: 2000,
            token_sweep_interval_secs: 60,
        }
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: var_or("API_PORT", defaults.api_port)?,
            storage_backend: var_or("STORAGE_BACKEND", defaults.storage_backend)?,
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            store_latitude: var_or("STORE_LATITUDE", defaults.store_latitude)?,
            store_longitude: var_or("STORE_LONGITUDE", defaults.store_longitude)?,
            geofence_radius_meters: var_or(
                "GEOFENCE_RADIUS_METERS",
                defaults.geofence_radius_meters,
            )?,
            token_validity_secs: var_or("TOKEN_VALIDITY_SECS", defaults.token_validity_secs)?,
            token_single_use: var_or("TOKEN_SINGLE_USE", defaults.token_single_use)?,
            reward_threshold: var_or("REWARD_THRESHOLD", defaults.reward_threshold)?,
            storage_timeout_ms: var_or("STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms)?,
            token_sweep_interval_secs: var_or(
                "TOKEN_SWEEP_INTERVAL_SECS",
                defaults.token_sweep_interval_secs,
            )?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.storage_backend == StorageBackend::Redis && self.redis_url.trim().is_empty() {
            anyhow::bail!("REDIS_URL is required when STORAGE_BACKEND=redis");
        }

        self.geofence()?;

        if self.token_validity_secs == 0 {
            anyhow::bail!("TOKEN_VALIDITY_SECS must be greater than 0");
        }

        if self.token_validity_secs > MAX_TOKEN_VALIDITY_SECS {
            anyhow::bail!(
                "TOKEN_VALIDITY_SECS must be at most {}",
                MAX_TOKEN_VALIDITY_SECS
            );
        }

        if self.reward_threshold == 0 {
            anyhow::bail!("REWARD_THRESHOLD must be greater than 0");
        }

        if self.storage_timeout_ms == 0 {
            anyhow::bail!("STORAGE_TIMEOUT_MS must be greater than 0");
        }

        if self.token_sweep_interval_secs == 0 {
            anyhow::bail!("TOKEN_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        Ok(())
    }

    /// The store geofence described by this configuration
    pub fn geofence(&self) -> Result<GeoFence> {
        let center = Coordinates::new(self.store_latitude, self.store_longitude)
            .context("Invalid STORE_LATITUDE/STORE_LONGITUDE")?;
        GeoFence::new(center, self.geofence_radius_meters).context("Invalid GEOFENCE_RADIUS_METERS")
    }

    pub fn token_validity(&self) -> Result<chrono::Duration> {
        i64::try_from(self.token_validity_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .context("TOKEN_VALIDITY_SECS is out of range")
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn token_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.token_sweep_interval_secs)
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

//! Membership engine configuration.
//!
//! Configuration is loaded from environment variables with defaults suitable
//! for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Membership cache and event configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Time-to-live of cached membership entries in seconds.
    pub cache_ttl_secs: u64,

    /// Whether the membership cache is used at all.
    pub cache_enabled: bool,

    /// Namespace prefix rendered in front of every cache key.
    pub cache_key_prefix: String,

    /// Capacity of in-memory event bus channels.
    pub event_channel_capacity: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_enabled: true,
            cache_key_prefix: "roleset".to_string(),
            event_channel_capacity: 1024,
        }
    }
}

impl MembershipConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MEMBERSHIP_CACHE_TTL_SECS`: Cache entry TTL (default: 300)
    /// - `MEMBERSHIP_CACHE_ENABLED`: Whether to cache (default: true)
    /// - `MEMBERSHIP_CACHE_KEY_PREFIX`: Cache key namespace (default: roleset)
    /// - `MEMBERSHIP_EVENT_CHANNEL_CAPACITY`: Event channel capacity (default: 1024)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            cache_ttl_secs: std::env::var("MEMBERSHIP_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.cache_ttl_secs),
            cache_enabled: std::env::var("MEMBERSHIP_CACHE_ENABLED")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.cache_enabled),
            cache_key_prefix: std::env::var("MEMBERSHIP_CACHE_KEY_PREFIX")
                .unwrap_or(default.cache_key_prefix),
            event_channel_capacity: std::env::var("MEMBERSHIP_EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.event_channel_capacity),
        }
    }

    /// Get the cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_enabled && self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MEMBERSHIP_CACHE_TTL_SECS".to_string(),
                message: "must be greater than zero when caching is enabled".to_string(),
            });
        }
        if self.cache_key_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MEMBERSHIP_CACHE_KEY_PREFIX".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MEMBERSHIP_EVENT_CHANNEL_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Redis cache backend configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Redis connection URL (e.g., redis://localhost:6379).
    pub url: String,
}

#[cfg(feature = "redis")]
impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl RedisCacheConfig {
    /// Load configuration from `REDIS_URL`.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| Self::default().url),
        }
    }
}

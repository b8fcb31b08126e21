//! Runtime configuration.
//!
//! # Example
//! ```rust,ignore
//! use relay_core::config::RelayConfig;
//!
//! // From environment
//! let config = RelayConfig::from_env()?;
//!
//! // Or explicit configuration
//! let config = RelayConfig::default();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PUB_ADDR: &str = "inproc://relay-pub";
pub const DEFAULT_SUB_ADDR: &str = "inproc://relay-sub";

/// Upper bound for `RELAY_LEASE_TTL_SECS` (one year).
pub const MAX_LEASE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Client-specific transport configuration.
///
/// The addresses are fixed for the lifetime of a router built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where producers publish.
    pub pub_addr: String,
    /// Where subscribers connect.
    pub sub_addr: String,
    /// How long a subscriber waits for a message before re-checking for shutdown.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pub_addr: DEFAULT_PUB_ADDR.to_string(),
            sub_addr: DEFAULT_SUB_ADDR.to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Worker-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Competing subscribers per registered handler.
    pub slots: usize,
    /// `PROCESSING` lease. `None` keeps in-flight records forever.
    pub lease_ttl: Option<Duration>,
    /// How often the reaper scans for expired leases.
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            slots: 1,
            lease_ttl: None,
            reap_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    pub client: ClientConfig,
    pub worker: WorkerConfig,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// - `RELAY_PUB_ADDR`, `RELAY_SUB_ADDR`
    /// - `RELAY_POLL_INTERVAL_MS`
    /// - `RELAY_WORKER_SLOTS` (>= 1)
    /// - `RELAY_LEASE_TTL_SECS` (unset or 0 disables the lease, at most `MAX_LEASE_TTL_SECS`)
    /// - `RELAY_REAP_INTERVAL_SECS` (>= 1)
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pub_addr = lookup("RELAY_PUB_ADDR").unwrap_or(defaults.client.pub_addr);
        let sub_addr = lookup("RELAY_SUB_ADDR").unwrap_or(defaults.client.sub_addr);
        let poll_interval = parse_u64(&lookup, "RELAY_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.client.poll_interval);

        let slots = match parse_u64(&lookup, "RELAY_WORKER_SLOTS")? {
            Some(0) => return Err(invalid("RELAY_WORKER_SLOTS", "0", "must be at least 1")),
            Some(n) => n as usize,
            None => defaults.worker.slots,
        };

        let lease_ttl = match parse_u64(&lookup, "RELAY_LEASE_TTL_SECS")? {
            Some(0) | None => None,
            Some(secs) if secs > MAX_LEASE_TTL_SECS => {
                return Err(invalid(
                    "RELAY_LEASE_TTL_SECS",
                    &secs.to_string(),
                    &format!("must be at most {MAX_LEASE_TTL_SECS}"),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
        };

        let reap_interval = match parse_u64(&lookup, "RELAY_REAP_INTERVAL_SECS")? {
            Some(0) => {
                return Err(invalid("RELAY_REAP_INTERVAL_SECS", "0", "must be at least 1"));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.worker.reap_interval,
        };

        Ok(Self {
            client: ClientConfig {
                pub_addr,
                sub_addr,
                poll_interval,
            },
            worker: WorkerConfig {
                slots,
                lease_ttl,
                reap_interval,
            },
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

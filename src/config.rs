//! Discovery and registry client configuration
//!
//! This crate consumes configuration, it does not own a file format. The
//! structs here deserialize from whatever the host application loads.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discovery watcher and pool refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Interval between registry polls on the watcher loop
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Fixed backoff after a failed registry query
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: Duration,
    /// TTL used when registering this process with the registry
    #[serde(default = "default_registration_ttl")]
    pub registration_ttl: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_registration_ttl() -> Duration {
    Duration::from_secs(60)
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            retry_backoff: default_retry_backoff(),
            registration_ttl: default_registration_ttl(),
        }
    }
}

impl DiscoveryConfig {
    /// Validate the discovery configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow::anyhow!("poll_interval must be greater than 0"));
        }
        if self.retry_backoff.is_zero() {
            return Err(anyhow::anyhow!("retry_backoff must be greater than 0"));
        }
        if self.registration_ttl < Duration::from_secs(2) {
            return Err(anyhow::anyhow!(
                "registration_ttl must be at least 2 seconds to leave room for heartbeats"
            ));
        }
        Ok(())
    }
}

/// Consul registry client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    /// Consul HTTP API address
    pub address: String,
    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Request timeout; must exceed `wait_time` or long polls always time out
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Maximum time a blocking (long-poll) query is allowed to wait
    #[serde(default = "default_wait_time")]
    pub wait_time: Duration,
    /// Consul datacenter
    pub datacenter: Option<String>,
    /// Consul token for authentication
    pub token: Option<String>,
    /// Skip TLS verification on registered TTL checks
    #[serde(default)]
    pub tls_skip_verify: bool,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_wait_time() -> Duration {
    Duration::from_secs(10)
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8500".to_string(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            wait_time: default_wait_time(),
            datacenter: None,
            token: None,
            tls_skip_verify: false,
        }
    }
}

impl ConsulConfig {
    /// Validate the Consul client configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(anyhow::anyhow!("Consul address cannot be empty"));
        }
        if self.request_timeout <= self.wait_time {
            return Err(anyhow::anyhow!(
                "request_timeout must be greater than wait_time"
            ));
        }
        Ok(())
    }
}

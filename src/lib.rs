//! # Coxswain - client-side service discovery and load balancing
//!
//! Coxswain watches a service registry (Consul by default) for changes to the
//! set of healthy instances of a named service, turns those changes into
//! incremental add/remove events, and keeps a pool of backends that callers
//! select from via round-robin to dispatch requests.
//!
//! ## Core pieces
//!
//! - **Discovery watcher**: a background polling loop per `(service, tag)`
//!   subscription that diffs registry results and emits ordered event batches
//! - **Backend pool**: concurrency-safe backend lists per service name with
//!   atomic wholesale replacement and pluggable selection
//! - **Balancer facade**: the `resolve`/`next`/`close` shape RPC-framework
//!   resolver plug-ins expect
//! - **Registry clients**: the `Registry` trait with a Consul HTTP
//!   implementation, including TTL-check registration with heartbeats
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coxswain::{Balancer, BackendPool, ConsulConfig, ConsulRegistry, DiscoveryConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ConsulRegistry::new(ConsulConfig::default())?);
//!
//!     // Event-stream path, for RPC resolver plug-ins:
//!     let balancer =
//!         Balancer::new(registry.clone(), "web", "", &DiscoveryConfig::default()).await;
//!     let watcher = balancer.resolve("web");
//!     while let Some(events) = watcher.next().await {
//!         println!("instance set changed: {} events", events.len());
//!     }
//!
//!     // Pool path, for direct dispatch:
//!     let pool = Arc::new(BackendPool::new(registry));
//!     let refresh = pool.spawn_refresh("web", "", std::time::Duration::from_secs(30));
//!     if let Some(backend) = pool.get_backend("web").await {
//!         println!("dispatching to {}", backend.host_port());
//!     }
//!     refresh.stop();
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pool;
pub mod registry;

// Re-export commonly used types
pub use balancer::Balancer;
pub use config::{ConsulConfig, DiscoveryConfig};
pub use discovery::{diff, UpdateEvent, Watcher};
pub use error::{CoxswainError, Result};
pub use pool::{BackendInfo, BackendPool, BackendStatus, BalancePolicy, RefreshTask, RoundRobin, ServiceInfo};
pub use registry::{ConsulRegistry, InstanceAddress, Registry, ServiceDescriptor};

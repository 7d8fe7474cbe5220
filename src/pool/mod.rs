//! Backend pool
//!
//! The pool holds the authoritative, queryable backend list per service name
//! and a selection policy over it. Lists are replaced wholesale on each
//! successful refresh, never patched in place: observers see either the old
//! complete list or the new one, and a failed refresh leaves the previous
//! list untouched (stale-but-available beats correct-but-absent).

pub mod policy;

pub use policy::{BalancePolicy, RoundRobin};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{Registry, ServiceDescriptor};

/// Health standing of a backend as reported in pool summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Passing,
    Warning,
    Critical,
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Passing => write!(f, "passing"),
            BackendStatus::Warning => write!(f, "warning"),
            BackendStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Serializable summary of one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub id: String,
    pub service: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
    pub status: BackendStatus,
}

impl From<&ServiceDescriptor> for BackendInfo {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        // The pool only holds instances the registry reported healthy.
        Self {
            id: descriptor.id.clone(),
            service: descriptor.service.clone(),
            tags: descriptor.tags.clone(),
            address: descriptor.address.clone(),
            port: descriptor.port,
            status: BackendStatus::Passing,
        }
    }
}

/// Serializable summary of one service and its backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub backends: Vec<BackendInfo>,
}

/// Per-service state: the ordered backend list, the round-robin cursor, and
/// the quarantine list (reserved; cleared on every replace).
#[derive(Debug)]
struct BackendSet {
    backends: Vec<ServiceDescriptor>,
    cursor: AtomicUsize,
    quarantine: Vec<ServiceDescriptor>,
}

impl BackendSet {
    fn new() -> Self {
        Self {
            backends: Vec::new(),
            cursor: AtomicUsize::new(0),
            quarantine: Vec::new(),
        }
    }
}

/// Concurrency-safe container of resolved backends per service name
pub struct BackendPool {
    registry: Arc<dyn Registry>,
    services: RwLock<HashMap<String, BackendSet>>,
    policy: Arc<dyn BalancePolicy>,
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPool")
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl BackendPool {
    /// Create a pool with round-robin selection
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self::with_policy(registry, Arc::new(RoundRobin))
    }

    /// Create a pool with a custom selection policy
    pub fn with_policy(registry: Arc<dyn Registry>, policy: Arc<dyn BalancePolicy>) -> Self {
        Self {
            registry,
            services: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Atomically replace the backend list for `service`.
    ///
    /// Duplicate addresses are dropped, keeping the first occurrence. The
    /// quarantine list is cleared and the round-robin cursor is preserved
    /// across the replacement.
    pub async fn put(&self, service: &str, backends: Vec<ServiceDescriptor>) {
        let mut seen = HashSet::new();
        let deduped: Vec<ServiceDescriptor> = backends
            .into_iter()
            .filter(|b| seen.insert(b.host_port()))
            .collect();

        let mut services = self.services.write().await;
        let set = services
            .entry(service.to_string())
            .or_insert_with(BackendSet::new);
        debug!(
            service = %service,
            backends = deduped.len(),
            "pool: replaced backend list"
        );
        set.backends = deduped;
        set.quarantine.clear();
    }

    /// Snapshot of the current backend list for `service`; empty when the
    /// service is unknown. Callers own the returned copy.
    pub async fn get_backends(&self, service: &str) -> Vec<ServiceDescriptor> {
        let services = self.services.read().await;
        services
            .get(service)
            .map(|set| set.backends.clone())
            .unwrap_or_default()
    }

    /// Select one backend for `service` using the pool's policy.
    ///
    /// `None` means no backend is currently known; callers treat that as a
    /// fail-fast or retryable condition.
    pub async fn get_backend(&self, service: &str) -> Option<ServiceDescriptor> {
        let services = self.services.read().await;
        let set = services.get(service)?;
        self.policy.select(&set.backends, &set.cursor)
    }

    /// Serializable summary of every known service
    pub async fn services_info(&self) -> Vec<ServiceInfo> {
        let services = self.services.read().await;
        services
            .iter()
            .map(|(name, set)| ServiceInfo {
                name: name.clone(),
                backends: set.backends.iter().map(BackendInfo::from).collect(),
            })
            .collect()
    }

    /// Register an instance with the registry. Pass-through: pool state is
    /// only affected once a later refresh observes the instance.
    pub async fn register(&self, descriptor: &ServiceDescriptor, ttl: Duration) -> Result<()> {
        self.registry.register(descriptor, ttl).await
    }

    /// Deregister an instance from the registry
    pub async fn deregister(&self, service_id: &str) -> Result<()> {
        self.registry.deregister(service_id).await
    }

    /// Re-list `(service, tag)` from the registry and replace the backend
    /// list on success. On failure the previous list stays untouched and the
    /// error is returned to the refresh caller; selection callers never see
    /// it.
    pub async fn refresh(&self, service: &str, tag: &str) -> Result<()> {
        let (instances, _) = self.registry.list_instances(service, tag, 0).await?;
        self.put(service, instances).await;
        Ok(())
    }

    /// Spawn a periodic refresh loop for `(service, tag)`.
    ///
    /// Transient listing errors are logged and retried on the next tick. The
    /// returned task handle stops the loop; dropping it does not.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        service: impl Into<String>,
        tag: impl Into<String>,
        interval: Duration,
    ) -> RefreshTask {
        let pool = Arc::clone(self);
        let service = service.into();
        let tag = tag.into();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let stopped = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            info!(service = %service, tag = %tag, "pool: refresh loop started");
            loop {
                if let Err(e) = pool.refresh(&service, &tag).await {
                    warn!(
                        service = %service,
                        error = %e,
                        "pool: refresh failed, keeping previous backend list"
                    );
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = sleep(interval) => {}
                }
            }
            info!(service = %service, tag = %tag, "pool: refresh loop stopped");
        });

        RefreshTask {
            shutdown_tx,
            stopped,
        }
    }
}

/// Handle to a running periodic refresh loop
#[derive(Debug)]
pub struct RefreshTask {
    shutdown_tx: broadcast::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl RefreshTask {
    /// Stop the refresh loop. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

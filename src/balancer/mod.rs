//! Balancer facade
//!
//! Glues a registry client and a discovery watcher into the shape a generic
//! RPC client's pluggable name resolution expects: `resolve` hands out the
//! watcher, and the watcher's own `next`/`close` do the rest. The facade
//! performs no logic beyond construction wiring.

use std::sync::Arc;

use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::discovery::Watcher;
use crate::registry::Registry;

/// Name-resolution facade over one `(service, tag)` subscription
pub struct Balancer {
    // Shared, non-owned collaborator; its lifetime is managed by the process.
    registry: Arc<dyn Registry>,
    watcher: Watcher,
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("service", &self.watcher.service())
            .field("tag", &self.watcher.tag())
            .finish()
    }
}

impl Balancer {
    /// Wire a registry and a freshly started watcher for `(service, tag)`.
    /// Use an empty tag when the tag is irrelevant.
    pub async fn new(
        registry: Arc<dyn Registry>,
        service: impl Into<String>,
        tag: impl Into<String>,
        config: &DiscoveryConfig,
    ) -> Balancer {
        let watcher = Watcher::start(Arc::clone(&registry), service, tag, config).await;
        debug!(service = %watcher.service(), tag = %watcher.tag(), "balancer: created");
        Balancer { registry, watcher }
    }

    /// Return the watcher for `target`.
    ///
    /// Always the same underlying subscription; `target` is accepted for
    /// interface compatibility with RPC-framework resolver plug-ins and
    /// otherwise unused.
    pub fn resolve(&self, _target: &str) -> Watcher {
        self.watcher.clone()
    }

    /// The shared registry client, for the registration path
    pub fn registry(&self) -> Arc<dyn Registry> {
        Arc::clone(&self.registry)
    }

    /// Cancel the underlying subscription
    pub fn close(&self) {
        self.watcher.close();
    }
}

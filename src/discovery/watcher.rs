//! Background discovery watcher
//!
//! One watcher owns one `(service, tag)` subscription: a background task
//! long-polls the registry, diffs each result against the previously known
//! instance set, and pushes non-empty event batches onto a channel of depth 1.
//! The shallow buffer is the backpressure mechanism: the poll loop does not
//! advance past a batch the consumer has not drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::discovery::diff::{diff, UpdateEvent};
use crate::registry::{InstanceAddress, Registry, ServiceDescriptor};

/// A handle to one active `(service, tag)` subscription.
///
/// Clones share the same underlying subscription: they compete for the same
/// event batches and closing any clone closes all of them.
#[derive(Clone)]
pub struct Watcher {
    service: String,
    tag: String,
    updates: Arc<Mutex<mpsc::Receiver<Vec<UpdateEvent>>>>,
    shutdown_tx: broadcast::Sender<()>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("service", &self.service)
            .field("tag", &self.tag)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Watcher {
    /// Start watching `(service, tag)` on the given registry.
    ///
    /// Performs an immediate seed query at index 0. A failed seed query is
    /// logged and non-fatal: the subscription starts with an empty instance
    /// set rather than blocking startup on a registry outage, and the
    /// background loop recovers once the registry does.
    pub async fn start(
        registry: Arc<dyn Registry>,
        service: impl Into<String>,
        tag: impl Into<String>,
        config: &DiscoveryConfig,
    ) -> Watcher {
        let service = service.into();
        let tag = tag.into();

        let (updates_tx, updates_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let closed = Arc::new(AtomicBool::new(false));

        let (known, last_index) = match registry.list_instances(&service, &tag, 0).await {
            Ok((descriptors, index)) => (addresses(&descriptors), index),
            Err(e) => {
                warn!(
                    service = %service,
                    tag = %tag,
                    error = %e,
                    "watcher: initial registry query failed, starting with empty instance set"
                );
                (Vec::new(), 0)
            }
        };

        let seed = diff(&[], &known);
        if !seed.is_empty() {
            // The buffer is empty at this point, so the send cannot block.
            let _ = updates_tx.send(seed).await;
        }

        tokio::spawn(poll_loop(
            registry,
            service.clone(),
            tag.clone(),
            config.clone(),
            known,
            last_index,
            updates_tx,
            shutdown_rx,
            Arc::clone(&closed),
        ));

        Watcher {
            service,
            tag,
            updates: Arc::new(Mutex::new(updates_rx)),
            shutdown_tx,
            closed,
        }
    }

    /// Block until the next non-empty batch of update events, or `None` once
    /// the subscription has been closed and all buffered batches drained.
    /// `None` is terminal; callers must not retry.
    pub async fn next(&self) -> Option<Vec<UpdateEvent>> {
        self.updates.lock().await.recv().await
    }

    /// Cancel the subscription. Idempotent and safe to call concurrently with
    /// any number of `next` callers; exactly one invocation performs the
    /// teardown.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(service = %self.service, tag = %self.tag, "watcher: closing subscription");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The watched service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The watched tag (empty when unfiltered)
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

fn addresses(descriptors: &[ServiceDescriptor]) -> Vec<InstanceAddress> {
    descriptors.iter().map(|d| d.host_port()).collect()
}

#[allow(clippy::too_many_arguments)]
async fn poll_loop(
    registry: Arc<dyn Registry>,
    service: String,
    tag: String,
    config: DiscoveryConfig,
    mut known: Vec<InstanceAddress>,
    mut last_index: u64,
    updates_tx: mpsc::Sender<Vec<UpdateEvent>>,
    mut shutdown_rx: broadcast::Receiver<()>,
    closed: Arc<AtomicBool>,
) {
    debug!(service = %service, tag = %tag, "watcher: poll loop started");

    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }

        // An in-flight query is allowed to finish naturally; cancellation is
        // observed at the next suspension point.
        match registry.list_instances(&service, &tag, last_index).await {
            Err(e) => {
                warn!(
                    service = %service,
                    tag = %tag,
                    error = %e,
                    "watcher: error retrieving instances from registry"
                );
                // last_index stays put and the known set remains
                // authoritative until a successful query overwrites it.
                if wait_or_shutdown(config.retry_backoff, &mut shutdown_rx).await {
                    break;
                }
            }
            Ok((descriptors, index)) => {
                let current = addresses(&descriptors);
                let events = diff(&known, &current);
                if !events.is_empty() {
                    debug!(
                        service = %service,
                        events = events.len(),
                        "watcher: emitting update batch"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        sent = updates_tx.send(events) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                known = current;
                if index > last_index {
                    last_index = index;
                }
                if wait_or_shutdown(config.poll_interval, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }

    info!(service = %service, tag = %tag, "watcher: poll loop stopped");
    // Dropping updates_tx here closes the event channel; pending `next`
    // callers observe the terminal None.
}

/// Sleep for `duration`, returning true if shutdown was signalled first.
async fn wait_or_shutdown(
    duration: Duration,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => true,
        _ = sleep(duration) => false,
    }
}

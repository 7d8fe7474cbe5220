//! Backend selection policies

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registry::ServiceDescriptor;

/// A backend selection policy.
///
/// The pool owns one cursor per service; policies that need positional state
/// (round-robin) use it, stateless policies may ignore it. Returning `None`
/// means no backend is available and is a retryable condition for callers,
/// never a crash.
pub trait BalancePolicy: Send + Sync {
    /// Select one backend from the current list
    fn select(&self, backends: &[ServiceDescriptor], cursor: &AtomicUsize)
        -> Option<ServiceDescriptor>;

    /// Policy name, for logging
    fn name(&self) -> &str;
}

/// Round-robin selection: each call advances the cursor by one, modulo the
/// current list length. The cursor deliberately survives list replacement, so
/// the modulo here is what keeps a shrunk list in bounds.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl BalancePolicy for RoundRobin {
    fn select(
        &self,
        backends: &[ServiceDescriptor],
        cursor: &AtomicUsize,
    ) -> Option<ServiceDescriptor> {
        if backends.is_empty() {
            return None;
        }
        let index = cursor.fetch_add(1, Ordering::Relaxed) % backends.len();
        Some(backends[index].clone())
    }

    fn name(&self) -> &str {
        "roundrobin"
    }
}

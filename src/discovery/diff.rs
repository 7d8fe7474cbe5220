//! Instance set difference engine

use std::collections::HashSet;

use crate::registry::InstanceAddress;

/// One incremental change to the instance set of a watched service.
///
/// Identity is address-only: a metadata change on an otherwise-unchanged
/// address produces no event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateEvent {
    /// The address joined the instance set
    Add(InstanceAddress),
    /// The address left the instance set
    Remove(InstanceAddress),
}

impl UpdateEvent {
    /// The address this event refers to
    pub fn address(&self) -> &str {
        match self {
            UpdateEvent::Add(addr) | UpdateEvent::Remove(addr) => addr,
        }
    }
}

/// Compute the minimal event list turning `old` into `new`.
///
/// Emits one `Add` per address in `new` but not `old`, one `Remove` per
/// address in `old` but not `new`, and nothing for addresses in both. The
/// order of events within the result is unspecified.
pub fn diff(old: &[InstanceAddress], new: &[InstanceAddress]) -> Vec<UpdateEvent> {
    let old_set: HashSet<&str> = old.iter().map(|a| a.as_str()).collect();
    let new_set: HashSet<&str> = new.iter().map(|a| a.as_str()).collect();

    let mut events = Vec::new();
    for addr in &new_set {
        if !old_set.contains(addr) {
            events.push(UpdateEvent::Add(addr.to_string()));
        }
    }
    for addr in &old_set {
        if !new_set.contains(addr) {
            events.push(UpdateEvent::Remove(addr.to_string()));
        }
    }

    events
}

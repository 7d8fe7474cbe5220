//! Registry trait and shared data types
//!
//! A registry lists the healthy instances of a named service, and accepts
//! registration and deregistration of instances. Implementations are shared,
//! non-owned collaborators: watchers and pools hold an `Arc<dyn Registry>`
//! whose lifetime is managed by the process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// A `host:port` string uniquely identifying a reachable backend.
///
/// Two instances are equal iff their addresses are equal; no other descriptor
/// field participates in identity for diffing purposes.
pub type InstanceAddress = String;

/// An addressable instance of one logical service, as reported by the
/// registry. Immutable once produced; consumers read it, they never edit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique instance id within the registry
    pub id: String,
    /// Logical service name (many instances share one name)
    pub service: String,
    /// Tags attached at registration time
    #[serde(default)]
    pub tags: Vec<String>,
    /// Version extracted from the tags, when present
    pub version: Option<String>,
    /// Instance address; may be empty when the instance inherits the node
    /// address
    pub address: String,
    /// Instance port
    pub port: u16,
    /// Registry index at which the instance was created
    #[serde(default)]
    pub create_index: u64,
    /// Registry index of the last modification
    #[serde(default)]
    pub modify_index: u64,
    /// Id of the registry node the instance is registered on
    #[serde(default)]
    pub node_id: String,
    /// Name of the registry node
    #[serde(default)]
    pub node: String,
    /// Address of the registry node, used as a fallback for `address`
    #[serde(default)]
    pub node_address: String,
    /// Datacenter the node belongs to
    #[serde(default)]
    pub datacenter: String,
}

impl ServiceDescriptor {
    /// Create a new descriptor with the required fields
    pub fn new(id: String, service: String, address: String, port: u16) -> Self {
        Self {
            id,
            service,
            tags: Vec::new(),
            version: None,
            address,
            port,
            create_index: 0,
            modify_index: 0,
            node_id: String::new(),
            node: String::new(),
            node_address: String::new(),
            datacenter: String::new(),
        }
    }

    /// Add a tag to this descriptor
    pub fn with_tag(mut self, tag: String) -> Self {
        self.tags.push(tag);
        self
    }

    /// Set the version of this descriptor
    pub fn with_version(mut self, version: String) -> Self {
        self.version = Some(version);
        self
    }

    /// Check whether this descriptor carries a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// The `host:port` identity of this instance.
    ///
    /// Falls back to the node address when the instance address is empty,
    /// which registries report for instances bound to the node itself.
    pub fn host_port(&self) -> InstanceAddress {
        let host = if self.address.is_empty() {
            &self.node_address
        } else {
            &self.address
        };
        format!("{}:{}", host, self.port)
    }
}

/// Client interface to the external service registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// List the healthy instances of `service`, optionally filtered by `tag`
    /// (empty string for no filter).
    ///
    /// `wait_index` is the opaque long-poll cursor from a previous call; pass
    /// 0 for an immediate, non-blocking listing. Returns the instances and
    /// the new cursor. The cursor a caller holds must never be rolled back on
    /// error; implementations return an error without a cursor instead.
    async fn list_instances(
        &self,
        service: &str,
        tag: &str,
        wait_index: u64,
    ) -> Result<(Vec<ServiceDescriptor>, u64)>;

    /// Register an instance with a liveness TTL.
    ///
    /// The registry (or the client implementation, out of band) keeps the
    /// instance alive with periodic heartbeats; callers invoke this once and
    /// do not manage heartbeat timing themselves.
    async fn register(&self, descriptor: &ServiceDescriptor, ttl: Duration) -> Result<()>;

    /// Remove an instance from the registry by id.
    async fn deregister(&self, service_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = ServiceDescriptor::new(
            "web-1".to_string(),
            "web".to_string(),
            "10.0.0.1".to_string(),
            8080,
        )
        .with_tag("primary".to_string())
        .with_version("1.2.0".to_string());

        assert!(descriptor.has_tag("primary"));
        assert!(!descriptor.has_tag("secondary"));
        assert_eq!(descriptor.version.as_deref(), Some("1.2.0"));
        assert_eq!(descriptor.create_index, 0);
    }

    #[test]
    fn test_host_port() {
        let descriptor = ServiceDescriptor::new(
            "web-1".to_string(),
            "web".to_string(),
            "10.0.0.1".to_string(),
            8080,
        );
        assert_eq!(descriptor.host_port(), "10.0.0.1:8080");
    }

    #[test]
    fn test_host_port_node_fallback() {
        let mut descriptor =
            ServiceDescriptor::new("web-1".to_string(), "web".to_string(), String::new(), 8080);
        descriptor.node_address = "192.168.1.5".to_string();
        assert_eq!(descriptor.host_port(), "192.168.1.5:8080");
    }

    #[test]
    fn test_descriptor_serde() {
        let descriptor = ServiceDescriptor::new(
            "web-1".to_string(),
            "web".to_string(),
            "10.0.0.1".to_string(),
            8080,
        );
        let json = serde_json::to_string(&descriptor).expect("serialize descriptor");
        let back: ServiceDescriptor = serde_json::from_str(&json).expect("deserialize descriptor");
        assert_eq!(back, descriptor);
    }
}

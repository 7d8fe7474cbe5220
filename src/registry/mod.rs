//! Registry clients
//!
//! The [`Registry`] trait is the seam between this crate and the external
//! service registry. [`ConsulRegistry`] is the HTTP implementation against
//! the Consul agent API.

pub mod consul;
pub mod traits;

pub use consul::ConsulRegistry;
pub use traits::{InstanceAddress, Registry, ServiceDescriptor};

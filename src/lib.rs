//! Flare Discovery Consul
//!
//! Provides a Consul-backed service discovery adapter: instance registration with TTL
//! health checks, paged instance queries, and change-watch propagation as domain events.

pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;

// Re-exports
pub use config::{Config, RemoteConfig, ServiceDiscoveryConfig};
pub use error::{ConsulError, DiscoveryError, ErrorCategory, ErrorCode, Result};
pub use metrics::{DiscoveryEvent, DiscoveryMetrics, DiscoveryStats};

pub use discovery::{
    BroadcastDispatcher, ConsulApi, ConsulDiscoveryConfig, ConsulServiceDiscovery,
    DiscoveryFactory, EventDispatcher, HttpConsulClient, InstanceKey, Page, RegistryUrl,
    ServiceDiscovery, ServiceInstance, ServiceInstancesChangedEvent,
    ServiceInstancesChangedListener,
};

//! 基于 Consul 的服务发现模块
//!
//! 将通用的服务实例注册抽象绑定到 Consul：注册实例、维护 TTL 心跳、
//! 查询与分页、监听实例变化并发布变更事件。

pub mod backend;
pub mod codec;
pub mod config;
pub mod event;
pub mod factory;
pub mod heartbeat;
pub mod instance;
pub mod page;
pub mod query;
pub mod service_discovery;
pub mod trait_def;
pub mod watch;

pub use backend::{
    AgentService, AgentServiceCheck, AgentServiceRegistration, ConsulApi, HealthCheck,
    HealthChecks, HealthStatus, HttpConsulClient, QueryOptions, QueryResponse, ServiceEntry,
};
pub use codec::InstanceCodec;
pub use config::{ConsulDiscoveryConfig, RegistryUrl};
pub use event::{
    BroadcastDispatcher, EventDispatcher, ServiceInstancesChangedEvent,
    ServiceInstancesChangedListener,
};
pub use factory::DiscoveryFactory;
pub use heartbeat::HeartbeatManager;
pub use instance::{InstanceKey, ServiceInstance};
pub use page::{DEFAULT_PAGE_SIZE, Page};
pub use query::QueryLayer;
pub use service_discovery::ConsulServiceDiscovery;
pub use trait_def::ServiceDiscovery;
pub use watch::WatchDispatcher;

//! 基于 Consul 的服务发现
//!
//! 组合编解码、心跳、查询与监听四个部分，并维护注册中心的生命周期约束：
//! - 注册成功后才启动心跳，注册失败不会留下孤立的心跳任务
//! - 注销成功后才停止心跳，注销失败时实例仍视为已注册
//! - 同一实例键上的注册、更新、注销串行执行
//! - 读操作失败降级为空结果，写操作失败返回给调用方

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};

use super::backend::{ConsulApi, HttpConsulClient};
use super::codec::InstanceCodec;
use super::config::{ConsulDiscoveryConfig, RegistryUrl};
use super::event::{EventDispatcher, ServiceInstancesChangedEvent, ServiceInstancesChangedListener};
use super::heartbeat::HeartbeatManager;
use super::instance::{InstanceKey, ServiceInstance};
use super::page::Page;
use super::query::QueryLayer;
use super::trait_def::ServiceDiscovery;
use super::watch::{DEFAULT_WATCH_RETRY_INTERVAL, WatchDispatcher};
use crate::error::{DiscoveryError, Result};
use crate::metrics::{DiscoveryEvent, DiscoveryMetrics};

/// `init` 之后持有的连接及其派生组件
struct Connection {
    config: ConsulDiscoveryConfig,
    client: Arc<dyn ConsulApi>,
    codec: InstanceCodec,
    query: QueryLayer,
    heartbeats: HeartbeatManager,
    watches: WatchDispatcher,
    key_locks: KeyLocks,
}

/// 按实例键串行化写操作
///
/// 后端调用与心跳表的修改必须在同一把锁内完成，否则并发的注册与注销会留下没有注册记录的心跳。
#[derive(Default)]
struct KeyLocks {
    locks: std::sync::Mutex<HashMap<InstanceKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &InstanceKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 释放锁，没有其他等待者时移除该键
    fn release(&self, key: &InstanceKey, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

enum Lifecycle {
    Created,
    Running(Arc<Connection>),
    Destroyed,
}

/// Consul 服务发现
pub struct ConsulServiceDiscovery {
    remote_address: Option<String>,
    address: OnceLock<String>,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: DiscoveryMetrics,
    watch_retry_interval: Duration,
    lifecycle: RwLock<Lifecycle>,
}

impl ConsulServiceDiscovery {
    /// 创建新的服务发现实例，需要调用 `init` 后才能使用
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            remote_address: None,
            address: OnceLock::new(),
            dispatcher,
            metrics: DiscoveryMetrics::new(),
            watch_retry_interval: DEFAULT_WATCH_RETRY_INTERVAL,
            lifecycle: RwLock::new(Lifecycle::Created),
        }
    }

    /// 设置远端地址（优先于注册中心 URL 中的地址）
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// 设置监听出错后的重试间隔
    pub fn with_watch_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.watch_retry_interval = retry_interval;
        self
    }

    /// 使用给定的后端客户端初始化
    pub async fn init_with_client(
        &self,
        config: ConsulDiscoveryConfig,
        client: Arc<dyn ConsulApi>,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().await;
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Err(DiscoveryError::config("consul service discovery already initialized"));
        }

        let connection = Connection {
            codec: InstanceCodec::new(config.check_pass_interval, config.tags.clone()),
            query: QueryLayer::new(
                client.clone(),
                config.query_tag.clone(),
                config.watch_timeout,
                self.metrics.clone(),
            ),
            heartbeats: HeartbeatManager::new(
                client.clone(),
                config.heartbeat_period(),
                self.metrics.clone(),
            ),
            watches: WatchDispatcher::new(
                client.clone(),
                self.dispatcher.clone(),
                config.watch_timeout,
                self.metrics.clone(),
            )
            .with_retry_interval(self.watch_retry_interval),
            key_locks: KeyLocks::default(),
            client,
            config,
        };

        let _ = self.address.set(connection.config.address.clone());
        info!(
            address = %connection.config.address,
            check_pass_interval_ms = connection.config.check_pass_interval.as_millis() as u64,
            "Consul service discovery initialized"
        );
        *lifecycle = Lifecycle::Running(Arc::new(connection));
        Ok(())
    }

    /// 是否已经初始化且尚未销毁
    pub async fn is_initialized(&self) -> bool {
        matches!(*self.lifecycle.read().await, Lifecycle::Running(_))
    }

    /// 指标
    pub fn metrics(&self) -> &DiscoveryMetrics {
        &self.metrics
    }

    /// 当前生效的配置（未初始化时为 `None`）
    pub async fn config(&self) -> Option<ConsulDiscoveryConfig> {
        self.connection().await.ok().map(|c| c.config.clone())
    }

    /// 当前活跃的心跳任务数
    pub async fn active_heartbeats(&self) -> usize {
        match self.connection().await {
            Ok(conn) => conn.heartbeats.active_count().await,
            Err(_) => 0,
        }
    }

    /// 实例是否有活跃的心跳任务
    pub async fn has_heartbeat(&self, instance: &ServiceInstance) -> bool {
        match self.connection().await {
            Ok(conn) => conn.heartbeats.is_running(&instance.key()).await,
            Err(_) => false,
        }
    }

    /// 当前活跃的监听数
    pub async fn active_watches(&self) -> usize {
        match self.connection().await {
            Ok(conn) => conn.watches.active_count().await,
            Err(_) => 0,
        }
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.lifecycle.read().await {
            Lifecycle::Running(conn) => Ok(conn.clone()),
            Lifecycle::Created | Lifecycle::Destroyed => Err(DiscoveryError::NotInitialized),
        }
    }

    /// 读路径获取连接，未初始化时记录一次降级
    async fn read_connection(&self, what: &str) -> Option<Arc<Connection>> {
        match self.connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                self.metrics.record(DiscoveryEvent::QueryFailed).await;
                error!(error = %e, "Get {} failed", what);
                None
            }
        }
    }

    /// 注册并启动心跳，调用方需持有该实例键的锁
    async fn register_with(&self, conn: &Connection, instance: &ServiceInstance) -> Result<()> {
        let key = instance.key();
        let registration = conn.codec.encode(instance);
        conn.client
            .register_service(&registration)
            .await
            .map_err(|source| DiscoveryError::Registration {
                service_name: instance.service_name.clone(),
                source,
            })?;

        self.metrics.record(DiscoveryEvent::Registered).await;
        info!(
            service_name = %instance.service_name,
            instance_id = %instance.id,
            address = %instance.address(),
            "Service instance registered with Consul"
        );

        if !conn.heartbeats.start(key.clone(), &instance.service_name).await {
            // 注册期间适配器已被销毁，撤回这次注册
            if let Err(e) = conn.client.deregister_service(key.as_str()).await {
                warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "Rollback registration after destroy failed"
                );
            }
            return Err(DiscoveryError::NotInitialized);
        }
        Ok(())
    }

    /// 注销并停止心跳，调用方需持有该实例键的锁
    async fn unregister_with(
        &self,
        conn: &Connection,
        key: &InstanceKey,
        instance: &ServiceInstance,
    ) -> Result<()> {
        if let Err(source) = conn.client.deregister_service(key.as_str()).await {
            let err = DiscoveryError::Deregistration {
                instance_id: instance.id.clone(),
                source,
            };
            error!(error = %err, "Unregister service instance failed");
            return Err(err);
        }
        self.metrics.record(DiscoveryEvent::Deregistered).await;

        if conn.heartbeats.stop(key).await {
            info!(
                service_name = %instance.service_name,
                instance_id = %instance.id,
                "Service instance unregistered from Consul"
            );
        } else {
            warn!(instance_id = %instance.id, "Ttl for service instance didn't exist");
        }
        Ok(())
    }
}

impl fmt::Display for ConsulServiceDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self
            .remote_address
            .as_deref()
            .or_else(|| self.address.get().map(String::as_str))
            .unwrap_or_default();
        write!(f, "consul-service-discovery[{}]", address)
    }
}

#[async_trait]
impl ServiceDiscovery for ConsulServiceDiscovery {
    async fn init(&self, registry_url: &RegistryUrl) -> Result<()> {
        let config = ConsulDiscoveryConfig::from_url(registry_url, self.remote_address.as_deref())?;
        let client = HttpConsulClient::new(&config.address, config.acl_token.as_deref())
            .map_err(|e| DiscoveryError::connection(format!("address {}", config.address), Some(e)))?;
        self.init_with_client(config, Arc::new(client)).await
    }

    async fn destroy(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lifecycle.write().await, Lifecycle::Destroyed);
        if let Lifecycle::Running(conn) = previous {
            conn.heartbeats.stop_all().await;
            conn.watches.shutdown().await;
            info!(descriptor = %self, "Consul service discovery destroyed");
        }
        Ok(())
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let conn = self.connection().await?;
        let key = instance.key();
        let guard = conn.key_locks.acquire(&key).await;
        let result = self.register_with(&conn, instance).await;
        conn.key_locks.release(&key, guard);
        result
    }

    async fn update(&self, instance: &ServiceInstance) -> Result<()> {
        let conn = self.connection().await?;
        let key = instance.key();
        let guard = conn.key_locks.acquire(&key).await;

        let deregistered = match conn.client.deregister_service(key.as_str()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    service_name = %instance.service_name,
                    error = %e,
                    "Unregister instance before update failed"
                );
                false
            }
        };

        let result = self.register_with(&conn, instance).await;
        if result.is_err() && deregistered {
            // 旧注册已删除且新注册失败，心跳不能继续续约一个不存在的检查
            conn.heartbeats.stop(&key).await;
        }
        conn.key_locks.release(&key, guard);
        result
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<()> {
        let conn = self.connection().await?;
        let key = instance.key();
        let guard = conn.key_locks.acquire(&key).await;
        let result = self.unregister_with(&conn, &key, instance).await;
        conn.key_locks.release(&key, guard);
        result
    }

    async fn get_services(&self) -> HashSet<String> {
        match self.read_connection("services").await {
            Some(conn) => conn.query.services().await,
            None => HashSet::new(),
        }
    }

    async fn get_instances(&self, service_name: &str) -> Vec<ServiceInstance> {
        match self.read_connection("instances").await {
            Some(conn) => conn.query.instances(service_name).await,
            None => Vec::new(),
        }
    }

    async fn get_instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
    ) -> Page<ServiceInstance> {
        match self.read_connection("instances").await {
            Some(conn) => conn.query.instances_by_page(service_name, offset, page_size).await,
            None => Page::new(offset, page_size, Vec::new(), 0),
        }
    }

    async fn get_healthy_instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
        healthy: bool,
    ) -> Page<ServiceInstance> {
        match self.read_connection("instances").await {
            Some(conn) => {
                conn.query
                    .healthy_instances_by_page(service_name, offset, page_size, healthy)
                    .await
            }
            None => Page::new(offset, page_size, Vec::new(), 0),
        }
    }

    async fn add_listener(&self, listener: &ServiceInstancesChangedListener) -> Result<()> {
        let conn = self.connection().await?;
        conn.watches.add(listener).await.inspect_err(|e| {
            error!(service_name = %listener.service_name, error = %e, "Add listener failed");
        })
    }

    async fn dispatch_event(&self, event: ServiceInstancesChangedEvent) -> Result<()> {
        self.dispatcher.dispatch(event);
        self.metrics.record(DiscoveryEvent::EventDispatched).await;
        Ok(())
    }
}

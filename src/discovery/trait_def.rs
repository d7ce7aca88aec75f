//! 服务发现 Trait 定义

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::config::RegistryUrl;
use super::event::{ServiceInstancesChangedEvent, ServiceInstancesChangedListener};
use super::instance::ServiceInstance;
use super::page::{DEFAULT_PAGE_SIZE, Page};
use crate::error::Result;

/// 服务发现 Trait
///
/// RPC 框架通过该 trait 发布与定位服务实例。
/// 写操作（注册、注销）的失败返回给调用方；读操作失败时降级为空结果。
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + fmt::Display {
    /// 初始化后端连接，只能调用一次
    async fn init(&self, registry_url: &RegistryUrl) -> Result<()>;

    /// 释放后端连接，停止全部心跳与监听
    async fn destroy(&self) -> Result<()>;

    /// 注册实例并启动心跳
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    /// 更新实例（先注销再注册）
    async fn update(&self, instance: &ServiceInstance) -> Result<()>;

    /// 注销实例并停止心跳
    async fn unregister(&self, instance: &ServiceInstance) -> Result<()>;

    /// 默认分页大小
    fn default_page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// 获取所有服务名
    async fn get_services(&self) -> HashSet<String>;

    /// 获取服务的全部实例
    async fn get_instances(&self, service_name: &str) -> Vec<ServiceInstance>;

    /// 分页获取服务实例
    async fn get_instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
    ) -> Page<ServiceInstance>;

    /// 分页获取健康状态等于 `healthy` 的实例
    async fn get_healthy_instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
        healthy: bool,
    ) -> Page<ServiceInstance>;

    /// 批量分页获取多个服务的实例，各服务之间没有顺序保证
    async fn get_request_instances(
        &self,
        service_names: &[String],
        offset: usize,
        requested_size: usize,
    ) -> HashMap<String, Page<ServiceInstance>> {
        let mut result = HashMap::with_capacity(service_names.len());
        for name in service_names {
            let page = self.get_instances_by_page(name, offset, requested_size).await;
            result.insert(name.clone(), page);
        }
        result
    }

    /// 添加实例变更监听
    async fn add_listener(&self, listener: &ServiceInstancesChangedListener) -> Result<()>;

    /// 查询服务当前实例并发布变更事件
    async fn dispatch_event_by_service_name(&self, service_name: &str) -> Result<()> {
        let instances = self.get_instances(service_name).await;
        self.dispatch_event_for_instances(service_name, instances).await
    }

    /// 以给定实例列表发布变更事件
    async fn dispatch_event_for_instances(
        &self,
        service_name: &str,
        instances: Vec<ServiceInstance>,
    ) -> Result<()> {
        self.dispatch_event(ServiceInstancesChangedEvent::new(service_name, instances))
            .await
    }

    /// 发布变更事件
    async fn dispatch_event(&self, event: ServiceInstancesChangedEvent) -> Result<()>;
}

//! 查询与分页
//!
//! 读路径上的所有后端错误都降级为空结果，同时记录日志并计入指标。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use super::backend::{ConsulApi, QueryOptions};
use super::codec::InstanceCodec;
use super::instance::ServiceInstance;
use super::page::Page;
use crate::error::{DiscoveryError, Result};
use crate::metrics::{DiscoveryEvent, DiscoveryMetrics};

/// 查询层
pub struct QueryLayer {
    client: Arc<dyn ConsulApi>,
    query_tag: Option<String>,
    wait: Duration,
    metrics: DiscoveryMetrics,
}

impl QueryLayer {
    pub fn new(
        client: Arc<dyn ConsulApi>,
        query_tag: Option<String>,
        wait: Duration,
        metrics: DiscoveryMetrics,
    ) -> Self {
        Self {
            client,
            query_tag,
            wait,
            metrics,
        }
    }

    /// 目录中的全部服务名，失败时返回错误
    pub async fn try_services(&self) -> Result<HashSet<String>> {
        let services = self
            .client
            .catalog_services(&QueryOptions::default())
            .await
            .map_err(|source| DiscoveryError::Query {
                what: "catalog services".to_string(),
                source,
            })?;
        Ok(services.into_keys().collect())
    }

    /// 目录中的全部服务名，失败时返回空集合
    pub async fn services(&self) -> HashSet<String> {
        match self.try_services().await {
            Ok(services) => services,
            Err(e) => {
                self.metrics.record(DiscoveryEvent::QueryFailed).await;
                error!(error = %e, "Get services failed");
                HashSet::new()
            }
        }
    }

    /// 服务的全部实例（包含不健康的），失败时返回错误
    pub async fn try_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let options = QueryOptions {
            index: None,
            wait: Some(self.wait),
        };
        let resp = self
            .client
            .health_service(service_name, self.query_tag.as_deref(), false, &options)
            .await
            .map_err(|source| DiscoveryError::Query {
                what: format!("instances of {}", service_name),
                source,
            })?;
        InstanceCodec::decode_entries(service_name, &resp.body)
    }

    /// 服务的全部实例，失败时返回空列表
    pub async fn instances(&self, service_name: &str) -> Vec<ServiceInstance> {
        match self.try_instances(service_name).await {
            Ok(instances) => instances,
            Err(e) => {
                self.metrics.record(DiscoveryEvent::QueryFailed).await;
                error!(service_name = %service_name, error = %e, "Get instances failed");
                Vec::new()
            }
        }
    }

    /// 按数据源下标分页
    pub async fn instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
    ) -> Page<ServiceInstance> {
        Page::slice(self.instances(service_name).await, offset, page_size)
    }

    /// 按健康状态过滤后分页，`offset` 作用于数据源下标
    pub async fn healthy_instances_by_page(
        &self,
        service_name: &str,
        offset: usize,
        page_size: usize,
        healthy: bool,
    ) -> Page<ServiceInstance> {
        Page::filtered(self.instances(service_name).await, offset, page_size, |ins| {
            ins.healthy == healthy
        })
    }
}

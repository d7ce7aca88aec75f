//! 实例编解码
//!
//! 在通用的 [`ServiceInstance`] 与 Consul 的注册请求/健康条目之间做双向转换。
//! 无状态，除了构造时给定的 TTL 与标签之外不持有任何数据。

use serde::Deserialize;
use std::time::Duration;

use super::backend::{AgentServiceCheck, AgentServiceRegistration, HealthStatus, ServiceEntry};
use super::instance::{InstanceKey, ServiceInstance};
use crate::error::DiscoveryError;

/// 元数据中保存启用状态的保留键
pub const ENABLE_KEY: &str = "enable";
/// 元数据中指定"严重状态持续多久后自动注销"的键
pub const DEREGISTER_AFTER_KEY: &str = "consul-deregister-critical-service-after";
/// 未指定时的自动注销时间
pub const DEFAULT_DEREGISTER_TIME: &str = "20s";

/// 实例编解码器
#[derive(Debug, Clone)]
pub struct InstanceCodec {
    check_pass_interval: Duration,
    tags: Vec<String>,
}

impl InstanceCodec {
    pub fn new(check_pass_interval: Duration, tags: Vec<String>) -> Self {
        Self {
            check_pass_interval,
            tags,
        }
    }

    /// 构建注册请求
    ///
    /// `enable` 被写入元数据的保留键，`healthy` 不会被发送。
    pub fn encode(&self, instance: &ServiceInstance) -> AgentServiceRegistration {
        let key = instance.key();
        let mut meta = instance.metadata.clone();
        meta.insert(ENABLE_KEY.to_string(), instance.enable.to_string());

        AgentServiceRegistration {
            id: key.as_str().to_string(),
            name: instance.service_name.clone(),
            address: instance.host.clone(),
            port: instance.port,
            tags: self.tags.clone(),
            meta,
            check: Some(self.build_check(instance, &key)),
        }
    }

    /// 构建 TTL 健康检查
    ///
    /// TTL 取检查间隔的整秒数；自动注销时间优先取实例元数据中的配置。
    pub fn build_check(&self, instance: &ServiceInstance, key: &InstanceKey) -> AgentServiceCheck {
        let deregister = instance
            .metadata
            .get(DEREGISTER_AFTER_KEY)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_DEREGISTER_TIME.to_string());

        AgentServiceCheck {
            check_id: key.as_str().to_string(),
            ttl: format!("{}s", self.check_pass_interval.as_secs()),
            deregister_critical_service_after: deregister,
        }
    }

    /// 将单个健康条目转换为服务实例
    pub fn decode(entry: ServiceEntry) -> ServiceInstance {
        let healthy = entry.checks.aggregated_status() == HealthStatus::Passing;
        let service = entry.service;

        let mut metadata = service.meta;
        let enable = metadata
            .remove(ENABLE_KEY)
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let id = InstanceKey::recover_id(&service.id, &service.service, &service.address, service.port)
            .map(str::to_string)
            .unwrap_or(service.id);

        ServiceInstance {
            id,
            service_name: service.service,
            host: service.address,
            port: service.port,
            enable,
            healthy,
            metadata,
        }
    }

    /// 将 `/v1/health/service` 的原始响应体转换为实例列表
    ///
    /// 响应体不是条目数组时返回 [`DiscoveryError::Translation`]。
    pub fn decode_entries(
        service_name: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let entries = Vec::<ServiceEntry>::deserialize(body).map_err(|e| DiscoveryError::Translation {
            service_name: service_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(entries.into_iter().map(Self::decode).collect())
    }
}

/// 宽松的布尔解析，无法识别的值视为 `false`
fn parse_bool(raw: &str) -> bool {
    matches!(raw, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

//! Consul 后端抽象与线上数据结构

pub mod consul;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConsulError;

pub use consul::HttpConsulClient;

/// Consul 后端 trait
///
/// 适配器对协调服务的全部出站调用都经过这个 trait，
/// 生产环境使用 [`HttpConsulClient`]，测试中可替换为内存实现。
/// 注意：由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait ConsulApi: Send + Sync {
    /// 注册服务（`PUT /v1/agent/service/register`）
    async fn register_service(&self, registration: &AgentServiceRegistration) -> Result<(), ConsulError>;

    /// 注销服务（`PUT /v1/agent/service/deregister/:id`）
    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError>;

    /// 列出目录中的所有服务名及其标签（`GET /v1/catalog/services`）
    async fn catalog_services(
        &self,
        options: &QueryOptions,
    ) -> Result<HashMap<String, Vec<String>>, ConsulError>;

    /// 查询服务的健康实例列表（`GET /v1/health/service/:name`）
    ///
    /// 返回原始 JSON，由调用方负责按 [`ServiceEntry`] 解析；
    /// 设置了 `options.index` 时为阻塞查询，直到索引变化或 `options.wait` 到期。
    async fn health_service(
        &self,
        service: &str,
        tag: Option<&str>,
        passing_only: bool,
        options: &QueryOptions,
    ) -> Result<QueryResponse<serde_json::Value>, ConsulError>;

    /// 将 TTL 检查置为通过（`PUT /v1/agent/check/pass/:check_id`）
    async fn pass_ttl(&self, check_id: &str, note: &str) -> Result<(), ConsulError>;
}

/// 查询参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// 阻塞查询的起始索引
    pub index: Option<u64>,
    /// 阻塞查询最长等待时间
    pub wait: Option<Duration>,
}

/// 查询结果（附带 `X-Consul-Index`）
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    pub index: u64,
    pub body: T,
}

/// 服务注册请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<AgentServiceCheck>,
}

/// TTL 健康检查定义
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceCheck {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(rename = "TTL")]
    pub ttl: String,
    pub deregister_critical_service_after: String,
}

/// `/v1/health/service/:name` 返回的单个条目
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    pub service: AgentService,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checks: HealthChecks,
}

/// 条目中的服务部分
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub address: String,
    pub port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: HashMap<String, String>,
}

/// 单个健康检查结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub output: String,
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
    Maintenance,
    Unknown,
}

impl HealthStatus {
    pub const PASSING: &'static str = "passing";
    pub const WARNING: &'static str = "warning";
    pub const CRITICAL: &'static str = "critical";
    pub const MAINTENANCE: &'static str = "maintenance";
}

const NODE_MAINTENANCE: &str = "_node_maintenance";
const SERVICE_MAINTENANCE_PREFIX: &str = "_service_maintenance:";

/// 一个条目下的全部健康检查
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HealthChecks(pub Vec<HealthCheck>);

impl HealthChecks {
    /// 聚合状态：维护 > 严重 > 警告 > 通过，空列表视为通过，未知状态视为未知
    pub fn aggregated_status(&self) -> HealthStatus {
        let (mut warning, mut critical) = (false, false);
        for check in &self.0 {
            if check.check_id == NODE_MAINTENANCE
                || check.check_id.starts_with(SERVICE_MAINTENANCE_PREFIX)
            {
                return HealthStatus::Maintenance;
            }
            match check.status.as_str() {
                HealthStatus::PASSING => {}
                HealthStatus::WARNING => warning = true,
                HealthStatus::CRITICAL => critical = true,
                HealthStatus::MAINTENANCE => return HealthStatus::Maintenance,
                _ => return HealthStatus::Unknown,
            }
        }
        if critical {
            HealthStatus::Critical
        } else if warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Passing
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

//! 服务实例定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 服务实例
///
/// `healthy` 由注册中心的健康检查推导而来，注册时调用方设置的值不会被发送出去。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    /// 实例 ID
    pub id: String,

    /// 服务名
    pub service_name: String,

    /// 主机地址
    pub host: String,

    /// 端口
    pub port: u16,

    /// 是否启用（对外提供服务）
    pub enable: bool,

    /// 是否健康
    pub healthy: bool,

    /// 元数据
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// 创建新的服务实例（默认启用、健康、无元数据）
    pub fn new(
        id: impl Into<String>,
        service_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            host: host.into(),
            port,
            enable: true,
            healthy: true,
            metadata: HashMap::new(),
        }
    }

    /// 设置启用状态
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// 设置健康状态
    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 派生实例键
    pub fn key(&self) -> InstanceKey {
        InstanceKey::of(self)
    }
}

/// 实例键
///
/// 由 (id, service_name, host, port) 确定性派生，同时用作 Consul 中的服务 ID 与 TTL 检查 ID，
/// 也是注册记录与心跳任务之间的关联键。四元组相同的两个实例会得到同一个键。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn of(instance: &ServiceInstance) -> Self {
        Self(format!(
            "id:{},serviceName:{},host:{},port:{}",
            instance.id, instance.service_name, instance.host, instance.port
        ))
    }

    /// 从注册中心返回的服务 ID 中还原调用方的实例 ID
    ///
    /// 只有当 `raw` 恰好是该服务名/主机/端口对应的键格式时才返回 `Some`。
    pub fn recover_id<'a>(raw: &'a str, service_name: &str, host: &str, port: u16) -> Option<&'a str> {
        let suffix = format!(",serviceName:{},host:{},port:{}", service_name, host, port);
        raw.strip_prefix("id:")?.strip_suffix(suffix.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! 服务发现连接参数

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// 后端地址
pub const ADDRESS_KEY: &str = "address";
/// ACL token
pub const ACL_TOKEN_KEY: &str = "acl-token";
/// TTL 检查间隔（毫秒）
pub const CHECK_PASS_INTERVAL_KEY: &str = "consul-check-pass-interval";
/// 查询时使用的标签过滤
pub const QUERY_TAG_KEY: &str = "consul_query_tag";
/// 长轮询等待时间（毫秒）
pub const WATCH_TIMEOUT_KEY: &str = "consul-watch-timeout";
/// 注册时附带的标签，逗号分隔
pub const TAGS_KEY: &str = "tags";

pub const DEFAULT_CHECK_PASS_INTERVAL_MS: u64 = 16_000;
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 60_000;
/// TTL 以整秒下发，检查间隔不能小于 1 秒
pub const MIN_CHECK_PASS_INTERVAL_MS: u64 = 1_000;

/// 注册中心 URL
///
/// 形如 `consul://127.0.0.1:8500?consul-check-pass-interval=16000&acl-token=xxx`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryUrl {
    pub protocol: String,
    /// `host:port`
    pub location: String,
    pub params: HashMap<String, String>,
}

impl RegistryUrl {
    pub fn new(protocol: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            location: location.into(),
            params: HashMap::new(),
        }
    }

    /// 解析 URL 字符串
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| DiscoveryError::config(format!("invalid registry url `{}`: {}", raw, e)))?;
        let location = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Ok(Self {
            protocol: url.scheme().to_string(),
            location,
            params: url.query_pairs().into_owned().collect(),
        })
    }

    /// 添加参数
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// 获取字符串参数，不存在或为空时返回默认值
    pub fn param(&self, key: &str, default: &str) -> String {
        self.params
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// 获取整数参数，不存在时返回默认值，无法解析时返回配置错误
    pub fn param_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.params.get(key).filter(|v| !v.is_empty()) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                DiscoveryError::config(format!("parameter `{}`=`{}` is not an integer: {}", key, raw, e))
            }),
            None => Ok(default),
        }
    }
}

/// Consul 服务发现配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulDiscoveryConfig {
    /// 后端地址
    pub address: String,
    /// ACL token（可选）
    pub acl_token: Option<String>,
    /// TTL 检查间隔，心跳周期为其 1/8
    pub check_pass_interval: Duration,
    /// 查询标签（可选）
    pub query_tag: Option<String>,
    /// 长轮询等待时间
    pub watch_timeout: Duration,
    /// 注册标签
    pub tags: Vec<String>,
}

impl ConsulDiscoveryConfig {
    /// 从注册中心 URL 解析配置
    ///
    /// 地址优先取 `remote_address`（来自远端配置），其次是 `address` 参数，最后是 URL 本身的地址部分。
    pub fn from_url(url: &RegistryUrl, remote_address: Option<&str>) -> Result<Self> {
        let address = remote_address
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| url.params.get(ADDRESS_KEY).filter(|a| !a.is_empty()).cloned())
            .or_else(|| Some(url.location.clone()).filter(|a| !a.is_empty()))
            .ok_or_else(|| DiscoveryError::config("consul address is required"))?;

        let check_pass_interval_ms =
            url.param_u64(CHECK_PASS_INTERVAL_KEY, DEFAULT_CHECK_PASS_INTERVAL_MS)?;
        if check_pass_interval_ms < MIN_CHECK_PASS_INTERVAL_MS {
            return Err(DiscoveryError::config(format!(
                "`{}` must be at least {}ms, got {}ms",
                CHECK_PASS_INTERVAL_KEY, MIN_CHECK_PASS_INTERVAL_MS, check_pass_interval_ms
            )));
        }
        let watch_timeout_ms = url.param_u64(WATCH_TIMEOUT_KEY, DEFAULT_WATCH_TIMEOUT_MS)?;

        let acl_token = Some(url.param(ACL_TOKEN_KEY, "")).filter(|t| !t.is_empty());
        let query_tag = Some(url.param(QUERY_TAG_KEY, "")).filter(|t| !t.is_empty());
        let tags = url
            .param(TAGS_KEY, "")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            address,
            acl_token,
            check_pass_interval: Duration::from_millis(check_pass_interval_ms),
            query_tag,
            watch_timeout: Duration::from_millis(watch_timeout_ms),
            tags,
        })
    }

    /// 心跳周期：检查间隔的 1/8，保证一个 TTL 窗口内有多次续约
    pub fn heartbeat_period(&self) -> Duration {
        self.check_pass_interval / 8
    }
}

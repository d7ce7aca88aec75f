use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::discovery::config::RegistryUrl;
use crate::error::{DiscoveryError, Result};

pub const CONSUL_PROTOCOL: &str = "consul";

/// 应用配置
///
/// ```toml
/// [service_discovery.default]
/// protocol = "consul"
/// remote_ref = "consul-local"
///
/// [remotes.consul-local]
/// address = "127.0.0.1:8500"
/// params = { "consul-check-pass-interval" = "16000" }
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service_discovery: HashMap<String, ServiceDiscoveryConfig>,
    #[serde(default)]
    pub remotes: HashMap<String, RemoteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceDiscoveryConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub remote_ref: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub address: String,
    /// 额外的注册中心 URL 参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_protocol() -> String {
    CONSUL_PROTOCOL.to_string()
}

impl RemoteConfig {
    /// 构造注册中心 URL
    pub fn registry_url(&self) -> RegistryUrl {
        RegistryUrl {
            protocol: self.protocol.clone(),
            location: self.address.clone(),
            params: self.params.clone(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::config(format!("read config file {} failed: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DiscoveryError::config(format!("parse config failed: {}", e)))
    }
}

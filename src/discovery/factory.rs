//! 服务发现工厂
//!
//! 每个配置名只构造一次服务发现实例。工厂由应用的组装根持有并以引用传递，不使用全局单例。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::event::EventDispatcher;
use super::service_discovery::ConsulServiceDiscovery;
use super::trait_def::ServiceDiscovery;
use crate::config::{CONSUL_PROTOCOL, Config, RemoteConfig};
use crate::error::{DiscoveryError, Result};

/// 服务发现工厂
pub struct DiscoveryFactory {
    config: Config,
    dispatcher: Arc<dyn EventDispatcher>,
    instances: Mutex<HashMap<String, Arc<ConsulServiceDiscovery>>>,
}

impl DiscoveryFactory {
    pub fn new(config: Config, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// 获取（必要时创建）指定名称的服务发现实例，不做初始化
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<ConsulServiceDiscovery>> {
        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get(name) {
            return Ok(instance.clone());
        }

        let remote = self.resolve_remote(name)?;
        let discovery = Arc::new(
            ConsulServiceDiscovery::new(self.dispatcher.clone()).with_remote_address(&remote.address),
        );
        instances.insert(name.to_string(), discovery.clone());
        info!(name = %name, descriptor = %discovery, "Service discovery created");
        Ok(discovery)
    }

    /// 获取（必要时创建并初始化）指定名称的服务发现实例
    ///
    /// 由 `get_or_create` 缓存但尚未初始化的实例会在这里初始化；新建实例初始化失败时不会被缓存。
    pub async fn get_or_init(&self, name: &str) -> Result<Arc<ConsulServiceDiscovery>> {
        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get(name).cloned() {
            if !instance.is_initialized().await {
                let remote = self.resolve_remote(name)?;
                instance.init(&remote.registry_url()).await?;
                info!(name = %name, descriptor = %instance, "Cached service discovery initialized");
            }
            return Ok(instance);
        }

        let remote = self.resolve_remote(name)?;
        let discovery = Arc::new(
            ConsulServiceDiscovery::new(self.dispatcher.clone()).with_remote_address(&remote.address),
        );
        discovery.init(&remote.registry_url()).await?;
        instances.insert(name.to_string(), discovery.clone());
        info!(name = %name, descriptor = %discovery, "Service discovery created and initialized");
        Ok(discovery)
    }

    /// 销毁全部已创建的实例
    pub async fn destroy_all(&self) -> Result<()> {
        let instances: Vec<_> = self.instances.lock().await.drain().collect();
        for (_, discovery) in instances {
            discovery.destroy().await?;
        }
        Ok(())
    }

    fn resolve_remote(&self, name: &str) -> Result<&RemoteConfig> {
        let sdc = self
            .config
            .service_discovery
            .get(name)
            .filter(|sdc| !sdc.remote_ref.is_empty())
            .ok_or_else(|| {
                DiscoveryError::config(format!(
                    "could not init the instance {} because the config is invalid",
                    name
                ))
            })?;
        if sdc.protocol != CONSUL_PROTOCOL {
            return Err(DiscoveryError::config(format!(
                "service discovery {} uses protocol {}, expected {}",
                name, sdc.protocol, CONSUL_PROTOCOL
            )));
        }

        self.config.remotes.get(&sdc.remote_ref).ok_or_else(|| {
            DiscoveryError::config(format!("could not find the remote config for name: {}", sdc.remote_ref))
        })
    }
}

//! 指标收集模块
//!
//! 读路径上的错误会被降级为空结果，这里把每一次降级计数下来，
//! 调用方和测试可以直接断言"发生过降级"而不用解析日志。

use std::sync::Arc;
use tokio::sync::RwLock;

/// 服务发现指标数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub registrations: u64,
    pub deregistrations: u64,
    pub renewals: u64,
    pub renewal_failures: u64,
    pub query_failures: u64,
    pub translation_failures: u64,
    pub watch_errors: u64,
    pub events_dispatched: u64,
}

/// 指标事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Registered,
    Deregistered,
    Renewed,
    RenewalFailed,
    QueryFailed,
    TranslationFailed,
    WatchError,
    EventDispatched,
}

/// 指标收集器
#[derive(Clone, Default)]
pub struct DiscoveryMetrics {
    stats: Arc<RwLock<DiscoveryStats>>,
}

impl DiscoveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: DiscoveryEvent) {
        let mut stats = self.stats.write().await;
        let counter = match event {
            DiscoveryEvent::Registered => &mut stats.registrations,
            DiscoveryEvent::Deregistered => &mut stats.deregistrations,
            DiscoveryEvent::Renewed => &mut stats.renewals,
            DiscoveryEvent::RenewalFailed => &mut stats.renewal_failures,
            DiscoveryEvent::QueryFailed => &mut stats.query_failures,
            DiscoveryEvent::TranslationFailed => &mut stats.translation_failures,
            DiscoveryEvent::WatchError => &mut stats.watch_errors,
            DiscoveryEvent::EventDispatched => &mut stats.events_dispatched,
        };
        *counter += 1;
    }

    pub async fn snapshot(&self) -> DiscoveryStats {
        self.stats.read().await.clone()
    }
}

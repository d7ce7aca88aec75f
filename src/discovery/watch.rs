//! 服务变更监听
//!
//! 每次 `add` 都会启动一个独立的阻塞查询循环（与 Consul watch plan 相同的机制），
//! 只请求通过健康检查的条目；索引变化时把完整条目列表转换为实例并发布变更事件。
//! 同一个服务名多次 `add` 会得到多个互不相关的监听，不做去重。

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::backend::{ConsulApi, QueryOptions};
use super::codec::InstanceCodec;
use super::event::{EventDispatcher, ServiceInstancesChangedEvent, ServiceInstancesChangedListener};
use crate::error::{DiscoveryError, Result};
use crate::metrics::{DiscoveryEvent, DiscoveryMetrics};

/// 后端出错后重试前的等待时间
pub const DEFAULT_WATCH_RETRY_INTERVAL: Duration = Duration::from_secs(5);

struct WatchSubscription {
    service_name: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct WatchState {
    subscriptions: Vec<WatchSubscription>,
    closed: bool,
}

/// 监听分发器
pub struct WatchDispatcher {
    client: Arc<dyn ConsulApi>,
    dispatcher: Arc<dyn EventDispatcher>,
    wait: Duration,
    retry_interval: Duration,
    metrics: DiscoveryMetrics,
    state: Mutex<WatchState>,
}

impl WatchDispatcher {
    pub fn new(
        client: Arc<dyn ConsulApi>,
        dispatcher: Arc<dyn EventDispatcher>,
        wait: Duration,
        metrics: DiscoveryMetrics,
    ) -> Self {
        Self {
            client,
            dispatcher,
            wait,
            retry_interval: DEFAULT_WATCH_RETRY_INTERVAL,
            metrics,
            state: Mutex::new(WatchState::default()),
        }
    }

    /// 设置后端出错后的重试间隔
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// 为监听器启动一个监听任务，立即返回
    pub async fn add(&self, listener: &ServiceInstancesChangedListener) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DiscoveryError::NotInitialized);
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run_watch(WatchLoop {
            client: self.client.clone(),
            dispatcher: self.dispatcher.clone(),
            service_name: listener.service_name.clone(),
            wait: self.wait,
            retry_interval: self.retry_interval,
            metrics: self.metrics.clone(),
            token: token.clone(),
        }));

        state.subscriptions.push(WatchSubscription {
            service_name: listener.service_name.clone(),
            token,
            task,
        });
        info!(service_name = %listener.service_name, "Watch started");
        Ok(())
    }

    /// 取消全部监听并等待任务退出，之后不再接受新的监听
    pub async fn shutdown(&self) {
        let subscriptions = {
            let mut state = self.state.lock().await;
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };

        let count = subscriptions.len();
        let tasks = subscriptions.into_iter().map(|sub| {
            debug!(service_name = %sub.service_name, "Stopping watch");
            sub.token.cancel();
            sub.task
        });
        join_all(tasks).await;
        info!(count, "All watches stopped");
    }

    /// 当前活跃的监听数量
    pub async fn active_count(&self) -> usize {
        self.state
            .lock()
            .await
            .subscriptions
            .iter()
            .filter(|sub| !sub.task.is_finished())
            .count()
    }
}

struct WatchLoop {
    client: Arc<dyn ConsulApi>,
    dispatcher: Arc<dyn EventDispatcher>,
    service_name: String,
    wait: Duration,
    retry_interval: Duration,
    metrics: DiscoveryMetrics,
    token: CancellationToken,
}

impl WatchLoop {
    /// 等待重试间隔，期间被取消时返回 `false`
    async fn backoff(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.retry_interval) => true,
        }
    }
}

async fn run_watch(ctx: WatchLoop) {
    let mut index: Option<u64> = None;

    loop {
        let options = QueryOptions {
            index,
            wait: Some(ctx.wait),
        };
        let result = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            result = ctx.client.health_service(&ctx.service_name, None, true, &options) => result,
        };

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                ctx.metrics.record(DiscoveryEvent::WatchError).await;
                error!(service_name = %ctx.service_name, error = %e, "Consul watch query failed");
                if !ctx.backoff().await {
                    break;
                }
                continue;
            }
        };

        if resp.index == 0 {
            ctx.metrics.record(DiscoveryEvent::WatchError).await;
            error!(service_name = %ctx.service_name, "Consul watch response carried no index");
            if !ctx.backoff().await {
                break;
            }
            continue;
        }

        let changed = index != Some(resp.index);
        index = match index {
            // 索引回退时从头开始
            Some(last) if resp.index < last => Some(0),
            _ => Some(resp.index),
        };
        if !changed {
            continue;
        }

        match InstanceCodec::decode_entries(&ctx.service_name, &resp.body) {
            Ok(instances) => {
                debug!(
                    service_name = %ctx.service_name,
                    index = resp.index,
                    count = instances.len(),
                    "Dispatching instances changed event"
                );
                ctx.dispatcher
                    .dispatch(ServiceInstancesChangedEvent::new(ctx.service_name.clone(), instances));
                ctx.metrics.record(DiscoveryEvent::EventDispatched).await;
            }
            Err(e) => {
                ctx.metrics.record(DiscoveryEvent::TranslationFailed).await;
                error!(service_name = %ctx.service_name, error = %e, "Dropped watch event");
            }
        }
    }

    info!(service_name = %ctx.service_name, "Watch stopped");
}

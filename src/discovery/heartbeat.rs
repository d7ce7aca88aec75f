//! TTL 心跳管理
//!
//! 每个已注册实例对应一个独立的周期任务，按固定周期调用 `pass_ttl` 续约。
//! 单次续约失败只记录日志，任务继续运行；任务只会因为取消信号而退出。

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::ConsulApi;
use super::instance::InstanceKey;
use crate::error::DiscoveryError;
use crate::metrics::{DiscoveryEvent, DiscoveryMetrics};

/// 最小续约周期，`interval` 不接受零周期
const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_millis(1);

/// 单个实例的心跳句柄
struct HeartbeatHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct HeartbeatState {
    handles: HashMap<InstanceKey, HeartbeatHandle>,
    closed: bool,
}

/// 心跳管理器
pub struct HeartbeatManager {
    client: Arc<dyn ConsulApi>,
    period: Duration,
    metrics: DiscoveryMetrics,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    /// 创建心跳管理器
    ///
    /// # 参数
    /// * `period` - 续约周期，小于 1ms 时按 1ms 处理
    pub fn new(client: Arc<dyn ConsulApi>, period: Duration, metrics: DiscoveryMetrics) -> Self {
        Self {
            client,
            period: period.max(MIN_HEARTBEAT_PERIOD),
            metrics,
            state: Mutex::new(HeartbeatState::default()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 为实例启动心跳任务
    ///
    /// 同一个键已有任务时，旧任务被取消并替换。管理器已关闭时不会启动任务，返回 `false`。
    pub async fn start(&self, key: InstanceKey, service_name: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            warn!(
                check_id = %key,
                service_name = %service_name,
                "Heartbeat manager already stopped, ttl not started"
            );
            return false;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            self.client.clone(),
            key.clone(),
            service_name.to_string(),
            self.period,
            token.clone(),
            self.metrics.clone(),
        ));

        if let Some(previous) = state.handles.insert(key.clone(), HeartbeatHandle { token, task }) {
            previous.token.cancel();
            debug!(check_id = %key, "Replaced existing ttl heartbeat");
        }
        true
    }

    /// 停止并移除实例的心跳任务，等待任务退出
    ///
    /// 返回该键是否存在心跳任务。
    pub async fn stop(&self, key: &InstanceKey) -> bool {
        let handle = self.state.lock().await.handles.remove(key);
        match handle {
            Some(handle) => {
                handle.token.cancel();
                if let Err(e) = handle.task.await {
                    warn!(check_id = %key, error = %e, "Heartbeat task ended abnormally");
                }
                true
            }
            None => false,
        }
    }

    /// 停止全部心跳任务，之后不再接受新任务
    pub async fn stop_all(&self) {
        let handles: Vec<(InstanceKey, HeartbeatHandle)> = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.handles.drain().collect()
        };

        let count = handles.len();
        let tasks = handles.into_iter().map(|(_, handle)| {
            handle.token.cancel();
            handle.task
        });
        join_all(tasks).await;
        info!(count, "All ttl heartbeats stopped");
    }

    pub async fn is_running(&self, key: &InstanceKey) -> bool {
        self.state.lock().await.handles.contains_key(key)
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.handles.len()
    }
}

async fn run_heartbeat(
    client: Arc<dyn ConsulApi>,
    check_id: InstanceKey,
    service_name: String,
    period: Duration,
    token: CancellationToken,
    metrics: DiscoveryMetrics,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = client.pass_ttl(check_id.as_str(), "") => result,
        };

        match result {
            Ok(()) => {
                metrics.record(DiscoveryEvent::Renewed).await;
                debug!(check_id = %check_id, "Passed ttl heartbeat");
            }
            Err(source) => {
                metrics.record(DiscoveryEvent::RenewalFailed).await;
                let err = DiscoveryError::TransientRenewal {
                    check_id: check_id.to_string(),
                    source,
                };
                warn!(service_name = %service_name, error = %err, "Pass ttl heartbeat failed");
            }
        }
    }

    info!(
        check_id = %check_id,
        service_name = %service_name,
        "Ttl heartbeat stopped"
    );
}

//! 实例变更事件与事件分发

use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::instance::ServiceInstance;

/// 默认事件缓冲区大小
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// 服务实例变更事件
///
/// 某个服务在某一时刻的完整实例快照，创建后不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstancesChangedEvent {
    service_name: String,
    instances: Vec<ServiceInstance>,
    occurred_at: DateTime<Utc>,
}

impl ServiceInstancesChangedEvent {
    pub fn new(service_name: impl Into<String>, instances: Vec<ServiceInstance>) -> Self {
        Self {
            service_name: service_name.into(),
            instances,
            occurred_at: Utc::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn instances(&self) -> &[ServiceInstance] {
        &self.instances
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// 实例变更监听器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstancesChangedListener {
    pub service_name: String,
}

impl ServiceInstancesChangedListener {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

/// 事件分发器
///
/// 发送即忘，不消费任何返回值。
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: ServiceInstancesChangedEvent);
}

/// 基于 async-broadcast 的事件分发器
///
/// 开启溢出模式：订阅方消费过慢时丢弃最旧的事件，而不是阻塞 watch 任务。
#[derive(Clone)]
pub struct BroadcastDispatcher {
    sender: Sender<ServiceInstancesChangedEvent>,
    // 保持通道打开，没有订阅者时事件直接丢弃
    _inactive: InactiveReceiver<ServiceInstancesChangedEvent>,
}

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        Self {
            sender,
            _inactive: receiver.deactivate(),
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> Receiver<ServiceInstancesChangedEvent> {
        self.sender.new_receiver()
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for BroadcastDispatcher {
    fn dispatch(&self, event: ServiceInstancesChangedEvent) {
        match self.sender.try_broadcast(event) {
            Ok(Some(dropped)) => {
                debug!(
                    service_name = %dropped.service_name(),
                    "Event buffer full, dropped oldest event"
                );
            }
            Ok(None) => {}
            Err(TrySendError::Inactive(event)) | Err(TrySendError::Closed(event)) => {
                debug!(
                    service_name = %event.service_name(),
                    "No active subscribers, event discarded"
                );
            }
            Err(TrySendError::Full(event)) => {
                debug!(
                    service_name = %event.service_name(),
                    "Event buffer full, event discarded"
                );
            }
        }
    }
}

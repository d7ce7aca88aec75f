//! 测试公共工具：内存版 Consul 与辅助函数

#![allow(dead_code)]

use async_trait::async_trait;
use flare_discovery_consul::discovery::backend::{
    AgentService, AgentServiceRegistration, ConsulApi, HealthCheck, HealthChecks, HealthStatus,
    QueryOptions, QueryResponse, ServiceEntry,
};
use flare_discovery_consul::{
    BroadcastDispatcher, ConsulDiscoveryConfig, ConsulError, ConsulServiceDiscovery, RegistryUrl,
    ServiceInstance, ServiceInstancesChangedEvent,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

pub const SERVICE: &str = "org.apache.dubbo.demo.GreetService";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("flare_discovery_consul=debug")
        .with_test_writer()
        .try_init();
}

pub fn instance(id: &str, port: u16) -> ServiceInstance {
    ServiceInstance::new(id, SERVICE, "127.0.0.1", port)
        .with_metadata("dubbo.metadata.storage-type", "local")
}

fn injected(what: &str) -> ConsulError {
    ConsulError::Status {
        status: 500,
        body: format!("injected {} failure", what),
    }
}

/// 注册闸门：记录写入后通知 `entered`，等待 `release` 才返回
#[derive(Default)]
pub struct RegisterGate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
struct FakeState {
    register_gate: Option<Arc<RegisterGate>>,
    services: Vec<AgentServiceRegistration>,
    check_status: HashMap<String, String>,
    raw_payload: Option<serde_json::Value>,
    fail_register: bool,
    fail_deregister: bool,
    fail_catalog: bool,
    fail_health: bool,
    tolerate_unknown_deregister: bool,
    failing_passes: usize,
    passes: Vec<(String, Instant)>,
    pass_attempts: usize,
    health_calls: usize,
}

/// 内存版 Consul
///
/// 注册记录按插入顺序返回；每次写操作推进索引，带索引的健康查询会阻塞到索引变化或等待超时。
pub struct FakeConsul {
    state: Mutex<FakeState>,
    index: watch::Sender<u64>,
}

impl FakeConsul {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            index: watch::Sender::new(1),
        }
    }

    fn bump(&self) {
        self.index.send_modify(|i| *i += 1);
    }

    pub fn current_index(&self) -> u64 {
        *self.index.borrow()
    }

    pub fn registrations(&self) -> Vec<AgentServiceRegistration> {
        self.state.lock().unwrap().services.clone()
    }

    pub fn pass_times(&self, check_id: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .passes
            .iter()
            .filter(|(id, _)| id == check_id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_passes(&self) -> usize {
        self.state.lock().unwrap().passes.len()
    }

    pub fn pass_attempts(&self) -> usize {
        self.state.lock().unwrap().pass_attempts
    }

    pub fn health_calls(&self) -> usize {
        self.state.lock().unwrap().health_calls
    }

    pub fn set_check_status(&self, check_id: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .check_status
            .insert(check_id.to_string(), status.to_string());
        self.bump();
    }

    /// 下一次健康查询返回给定的原始响应体
    pub fn inject_raw_payload(&self, payload: serde_json::Value) {
        self.state.lock().unwrap().raw_payload = Some(payload);
        self.bump();
    }

    /// 下一次注册在写入记录后暂停，直到闸门放行
    pub fn gate_next_register(&self) -> Arc<RegisterGate> {
        let gate = Arc::new(RegisterGate::default());
        self.state.lock().unwrap().register_gate = Some(gate.clone());
        gate
    }

    pub fn fail_next_passes(&self, count: usize) {
        self.state.lock().unwrap().failing_passes = count;
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.state.lock().unwrap().fail_register = fail;
    }

    pub fn set_fail_deregister(&self, fail: bool) {
        self.state.lock().unwrap().fail_deregister = fail;
    }

    pub fn set_fail_catalog(&self, fail: bool) {
        self.state.lock().unwrap().fail_catalog = fail;
    }

    pub fn set_fail_health(&self, fail: bool) {
        self.state.lock().unwrap().fail_health = fail;
    }

    pub fn set_tolerate_unknown_deregister(&self, tolerate: bool) {
        self.state.lock().unwrap().tolerate_unknown_deregister = tolerate;
    }

    fn entries(
        state: &FakeState,
        service: &str,
        tag: Option<&str>,
        passing_only: bool,
    ) -> Vec<ServiceEntry> {
        state
            .services
            .iter()
            .filter(|reg| reg.name == service)
            .filter(|reg| tag.is_none_or(|t| reg.tags.iter().any(|x| x == t)))
            .map(|reg| {
                let checks = reg
                    .check
                    .iter()
                    .map(|check| HealthCheck {
                        check_id: check.check_id.clone(),
                        service_id: reg.id.clone(),
                        name: "ttl".to_string(),
                        status: state
                            .check_status
                            .get(&check.check_id)
                            .cloned()
                            .unwrap_or_else(|| HealthStatus::PASSING.to_string()),
                        output: String::new(),
                    })
                    .collect();
                ServiceEntry {
                    service: AgentService {
                        id: reg.id.clone(),
                        service: reg.name.clone(),
                        address: reg.address.clone(),
                        port: reg.port,
                        tags: reg.tags.clone(),
                        meta: reg.meta.clone(),
                    },
                    checks: HealthChecks(checks),
                }
            })
            .filter(|entry| !passing_only || entry.checks.aggregated_status() == HealthStatus::Passing)
            .collect()
    }
}

#[async_trait]
impl ConsulApi for FakeConsul {
    async fn register_service(&self, registration: &AgentServiceRegistration) -> Result<(), ConsulError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            if state.fail_register {
                return Err(injected("register"));
            }
            match state.services.iter_mut().find(|s| s.id == registration.id) {
                Some(existing) => *existing = registration.clone(),
                None => state.services.push(registration.clone()),
            }
            state.register_gate.take()
        };
        self.bump();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), ConsulError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_deregister {
                return Err(injected("deregister"));
            }
            let before = state.services.len();
            state.services.retain(|s| s.id != service_id);
            if state.services.len() == before && !state.tolerate_unknown_deregister {
                return Err(ConsulError::Status {
                    status: 404,
                    body: format!("Unknown service ID {:?}", service_id),
                });
            }
        }
        self.bump();
        Ok(())
    }

    async fn catalog_services(
        &self,
        _options: &QueryOptions,
    ) -> Result<HashMap<String, Vec<String>>, ConsulError> {
        let state = self.state.lock().unwrap();
        if state.fail_catalog {
            return Err(injected("catalog"));
        }
        let mut services: HashMap<String, Vec<String>> = HashMap::new();
        for reg in &state.services {
            services
                .entry(reg.name.clone())
                .or_default()
                .extend(reg.tags.iter().cloned());
        }
        Ok(services)
    }

    async fn health_service(
        &self,
        service: &str,
        tag: Option<&str>,
        passing_only: bool,
        options: &QueryOptions,
    ) -> Result<QueryResponse<serde_json::Value>, ConsulError> {
        if let Some(last) = options.index {
            let mut rx = self.index.subscribe();
            let wait = options.wait.unwrap_or(Duration::from_secs(300));
            let deadline = Instant::now() + wait;
            while *rx.borrow_and_update() == last {
                match tokio::time::timeout_at(deadline, rx.changed()).await {
                    Ok(Ok(())) => continue,
                    _ => break,
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        state.health_calls += 1;
        if state.fail_health {
            return Err(injected("health"));
        }
        let index = *self.index.borrow();
        if let Some(raw) = state.raw_payload.take() {
            return Ok(QueryResponse { index, body: raw });
        }
        let entries = Self::entries(&state, service, tag, passing_only);
        Ok(QueryResponse {
            index,
            body: serde_json::to_value(entries)?,
        })
    }

    async fn pass_ttl(&self, check_id: &str, _note: &str) -> Result<(), ConsulError> {
        let mut state = self.state.lock().unwrap();
        state.pass_attempts += 1;
        if state.failing_passes > 0 {
            state.failing_passes -= 1;
            return Err(injected("pass"));
        }
        let known = state
            .services
            .iter()
            .any(|s| s.check.as_ref().is_some_and(|c| c.check_id == check_id));
        if !known {
            return Err(ConsulError::Status {
                status: 404,
                body: format!("Unknown check ID {:?}", check_id),
            });
        }
        state.passes.push((check_id.to_string(), Instant::now()));
        Ok(())
    }
}

/// 默认测试配置：检查间隔 16s（心跳 2s），长轮询 200ms
pub fn test_config() -> ConsulDiscoveryConfig {
    let url = RegistryUrl::new("consul", "127.0.0.1:8500")
        .with_param("consul-check-pass-interval", "16000")
        .with_param("consul-watch-timeout", "200");
    ConsulDiscoveryConfig::from_url(&url, None).expect("valid test config")
}

pub async fn discovery(
    fake: &Arc<FakeConsul>,
    dispatcher: &Arc<BroadcastDispatcher>,
) -> ConsulServiceDiscovery {
    init_tracing();
    let discovery = ConsulServiceDiscovery::new(dispatcher.clone())
        .with_watch_retry_interval(Duration::from_millis(50));
    discovery
        .init_with_client(test_config(), fake.clone())
        .await
        .expect("init with fake client");
    discovery
}

pub async fn recv_event(
    rx: &mut async_broadcast::Receiver<ServiceInstancesChangedEvent>,
    within: Duration,
) -> Option<ServiceInstancesChangedEvent> {
    tokio::time::timeout(within, rx.recv()).await.ok().and_then(|r| r.ok())
}

/// 轮询直到条件成立或超时
pub async fn eventually<F, Fut>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

//! 服务发现统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// Consul 后端调用错误
#[derive(Error, Debug)]
pub enum ConsulError {
    /// HTTP 传输失败（连接、超时等）
    #[error("consul request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 非 2xx 响应
    #[error("consul returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体解析失败
    #[error("failed to decode consul response: {0}")]
    Decode(#[from] serde_json::Error),

    /// 无法由配置地址构造请求 URL
    #[error("invalid consul address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// 服务发现错误
///
/// 读路径（列表、目录查询）上的错误只会被记录并计入指标，不会返回给调用方；
/// 写路径（注册、注销）上的错误总是返回给调用方。
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// 连接参数缺失或非法，`init` 直接失败
    #[error("invalid discovery config: {0}")]
    Config(String),

    /// 无法构造后端连接句柄
    #[error("create consul client failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<ConsulError>,
    },

    /// 尚未 `init` 或已经 `destroy`
    #[error("consul service discovery is not initialized")]
    NotInitialized,

    /// 后端拒绝注册
    #[error("consul could not register the instance. {service_name}: {source}")]
    Registration {
        service_name: String,
        #[source]
        source: ConsulError,
    },

    /// 后端拒绝注销
    #[error("consul could not deregister the instance {instance_id}: {source}")]
    Deregistration {
        instance_id: String,
        #[source]
        source: ConsulError,
    },

    /// 单次 TTL 续约失败，只记录日志，不会终止心跳任务
    #[error("pass ttl heartbeat failed for {check_id}: {source}")]
    TransientRenewal {
        check_id: String,
        #[source]
        source: ConsulError,
    },

    /// watch 回调数据格式不符合预期，事件被丢弃
    #[error("unexpected watch payload for service {service_name}: {reason}")]
    Translation { service_name: String, reason: String },

    /// 列表查询失败，调用方得到空结果
    #[error("query {what} failed: {source}")]
    Query {
        what: String,
        #[source]
        source: ConsulError,
    },
}

impl DiscoveryError {
    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        DiscoveryError::Config(msg.into())
    }

    /// 创建连接错误
    pub fn connection(reason: impl Into<String>, source: Option<ConsulError>) -> Self {
        DiscoveryError::Connection {
            reason: reason.into(),
            source,
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::Config(_) => ErrorCode::ConfigurationError,
            DiscoveryError::Connection { .. } => ErrorCode::ConnectionFailed,
            DiscoveryError::NotInitialized => ErrorCode::NotConnected,
            DiscoveryError::Registration { .. } => ErrorCode::RegistrationFailed,
            DiscoveryError::Deregistration { .. } => ErrorCode::DeregistrationFailed,
            DiscoveryError::TransientRenewal { .. } => ErrorCode::HeartbeatFailed,
            DiscoveryError::Translation { .. } => ErrorCode::DeserializationError,
            DiscoveryError::Query { .. } => ErrorCode::QueryFailed,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DiscoveryError>;

//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 连接相关错误
/// - 6000-6999: 配置/系统相关错误
/// - 7000-7999: 注册中心写操作错误
/// - 8000-8999: 注册中心读操作与数据转换错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 连接相关错误 (1000-1999)
    // ============================================================
    ConnectionFailed = 1000,
    NotConnected = 1005,

    // ============================================================
    // 配置/系统相关错误 (6000-6999)
    // ============================================================
    ConfigurationError = 6003,

    // ============================================================
    // 注册中心写操作错误 (7000-7999)
    // ============================================================
    RegistrationFailed = 7100,
    DeregistrationFailed = 7101,
    HeartbeatFailed = 7102,

    // ============================================================
    // 读操作与数据转换错误 (8000-8999)
    // ============================================================
    QueryFailed = 8100,
    DeserializationError = 8001,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::ConnectionFailed),
            1005 => Some(ErrorCode::NotConnected),
            6003 => Some(ErrorCode::ConfigurationError),
            7100 => Some(ErrorCode::RegistrationFailed),
            7101 => Some(ErrorCode::DeregistrationFailed),
            7102 => Some(ErrorCode::HeartbeatFailed),
            8100 => Some(ErrorCode::QueryFailed),
            8001 => Some(ErrorCode::DeserializationError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorCode::DeregistrationFailed => "DEREGISTRATION_FAILED",
            ErrorCode::HeartbeatFailed => "HEARTBEAT_FAILED",
            ErrorCode::QueryFailed => "QUERY_FAILED",
            ErrorCode::DeserializationError => "DESERIALIZATION_ERROR",
        }
    }

    /// 获取错误代码的类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Connection,
            6000..=6999 => ErrorCategory::System,
            7000..=7999 => ErrorCategory::Write,
            _ => ErrorCategory::Read,
        }
    }

    /// 是否为可重试错误
    ///
    /// 连接抖动、心跳续约失败和查询失败都是暂时性的；配置错误与数据格式错误重试无意义。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionFailed
                | ErrorCode::HeartbeatFailed
                | ErrorCode::QueryFailed
                | ErrorCode::RegistrationFailed
                | ErrorCode::DeregistrationFailed
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    System,
    Write,
    Read,
}

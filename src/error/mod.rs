//! 错误处理模块
//!
//! 提供服务发现适配器的统一错误类型与错误代码分类

pub mod code;
pub mod discovery_error;

pub use code::{ErrorCategory, ErrorCode};
pub use discovery_error::{ConsulError, DiscoveryError, Result};

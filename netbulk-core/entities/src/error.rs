//! 实体错误定义

use thiserror::Error;

/// 主机解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// 端口不是合法数字
    #[error("端口格式无效: {0}")]
    InvalidPort(String),

    /// 地址格式无效
    #[error("主机格式无效: {0}")]
    InvalidFormat(String),

    /// 域名无法解析
    #[error("无法解析主机: {0}")]
    Unresolvable(String),
}

//! 客户端错误定义

use std::time::Duration;
use thiserror::Error;

/// 客户端操作结果类型
pub type Result<T> = std::result::Result<T, ClientError>;

/// 设备会话错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 认证被拒绝，可以尝试下一个密码
    #[error("用户名或密码错误")]
    WrongPassword,

    /// 传输层故障，等待后重试
    #[error("连接失败 (可重试): {0}")]
    Retryable(String),

    /// 尚未建立会话
    #[error("会话未建立")]
    NotConnected,

    /// 会话错误
    #[error("会话错误: {0}")]
    Session(String),

    /// 设备拒绝执行命令
    #[error("命令执行失败: {0}")]
    Command(String),

    /// 文件复制错误
    #[error("文件复制失败: {0}")]
    Copy(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 建立连接错误
#[derive(Error, Debug)]
pub enum EstablishError {
    /// 被调用方取消
    #[error("建立连接被中断: {host}")]
    Interrupted { host: String },

    /// 重试与候选密码全部用尽
    #[error("无法连接 {host}: {source}")]
    Failed {
        host: String,
        #[source]
        source: ClientError,
    },

    /// 重试次数为零
    #[error("无法连接 {host}: 未进行任何尝试")]
    NoAttempts { host: String },
}

/// 命令执行错误
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// 正则无法编译
    #[error("正则表达式无效 `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// 单条命令超时
    #[error("命令执行超时 ({after:?}): {body}")]
    Timeout { body: String, after: Duration },

    /// 被调用方取消
    #[error("命令执行被中断: {body}")]
    Interrupted { body: String },

    /// 会话返回错误
    #[error("执行 `{body}` 失败: {source}")]
    Client {
        body: String,
        #[source]
        source: ClientError,
    },
}

/// 文件复制错误
#[derive(Error, Debug)]
pub enum CopyError {
    /// 客户端不支持文件复制
    #[error("{protocol} 客户端不支持文件复制")]
    Unsupported { protocol: &'static str },

    #[error("文件复制被中断")]
    Interrupted,

    #[error("文件复制超时 ({0:?})")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] ClientError),
}

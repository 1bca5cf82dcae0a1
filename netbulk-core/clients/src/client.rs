//! 设备客户端接口

use async_trait::async_trait;
use regex::Regex;

use crate::config::ClientConfig;
use crate::error::Result;

/// 远端路径前缀，带此前缀的一端位于设备上
pub const REMOTE_PREFIX: &str = "sftp://";

/// 设备会话
///
/// 每个任务独占一个实例，任务结束立即关闭。
#[async_trait]
pub trait Client: Send {
    /// 协议名称，用于日志与错误信息
    fn protocol(&self) -> &'static str;

    fn config(&self) -> &ClientConfig;

    /// 建立会话并认证
    ///
    /// 认证被拒绝时返回 [`ClientError::WrongPassword`](crate::ClientError::WrongPassword)，
    /// 传输故障返回 [`ClientError::Retryable`](crate::ClientError::Retryable)。
    /// 成功时返回设备的欢迎输出。
    async fn connect(&mut self, ip: &str, port: u16, user: &str, password: &str) -> Result<String>;

    /// 发送一条命令并等待完成
    ///
    /// 设置了 `expect` 时等待输出匹配该正则，否则由会话自行判定命令结束。
    async fn run_cmd(&mut self, body: &str, expect: Option<&Regex>) -> Result<String>;

    /// 关闭会话，可重复调用
    async fn close(&mut self);

    /// 文件复制能力
    fn copier(&mut self) -> Option<&mut dyn Copier> {
        None
    }
}

/// 文件复制能力
///
/// `source` / `target` 以 [`REMOTE_PREFIX`] 开头时表示设备上的文件，否则为本地路径。
#[async_trait]
pub trait Copier: Send {
    async fn copy_file(&mut self, source: &str, target: &str) -> Result<()>;
}

/// 去掉远端前缀；本地路径返回 `None`
pub fn remote_path(path: &str) -> Option<&str> {
    path.strip_prefix(REMOTE_PREFIX)
}

//! 漏洞管理器错误定义

use netbulk_kvdb::KvError;
use thiserror::Error;

/// 漏洞管理器结果类型
pub type Result<T> = std::result::Result<T, VulnerabilityError>;

/// HTTP 获取错误
#[derive(Error, Debug)]
pub enum FetchError {
    /// 请求失败
    #[error("HTTP 请求失败: {0}")]
    Http(String),

    /// 非 200 状态码
    #[error("HTTP 状态码异常: {0}")]
    Status(u16),
}

/// 漏洞管理器错误类型
#[derive(Error, Debug)]
pub enum VulnerabilityError {
    /// 版本号无法识别
    #[error("无法识别的版本号: {0}")]
    InvalidVersion(String),

    /// 缓存读写失败
    #[error("漏洞缓存错误: {0}")]
    Store(#[from] KvError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// 数据格式错误
    #[error("漏洞数据格式错误: {0}")]
    Parse(String),

    /// 多次下载均失败
    #[error("下载漏洞数据失败 (尝试 {attempts} 次): {source}")]
    DownloadFailed {
        attempts: u32,
        #[source]
        source: Box<VulnerabilityError>,
    },

    /// 没有配置任何数据源
    #[error("未配置漏洞数据源")]
    NoSource,

    /// 管理器已停止
    #[error("漏洞管理器已停止")]
    ManagerStopped,
}

impl From<serde_json::Error> for VulnerabilityError {
    fn from(e: serde_json::Error) -> Self {
        VulnerabilityError::Parse(e.to_string())
    }
}

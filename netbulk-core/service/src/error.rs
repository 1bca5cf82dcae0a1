//! 服务错误定义

use netbulk_clients::{CopyError, EstablishError, ExecuteError};
use netbulk_vulnerabilities::{VulnerabilityError, VulnerabilityReport};
use thiserror::Error;

/// 模式处理错误
///
/// 一个任务结果中可以同时携带多个相互独立的错误。
#[derive(Error, Debug)]
pub enum ModeError {
    /// 任务数据缺失或无效，在连接之前失败
    #[error("任务配置错误: {0}")]
    Configuration(String),

    #[error(transparent)]
    Connection(#[from] EstablishError),

    #[error(transparent)]
    Execution(#[from] ExecuteError),

    /// 客户端缺少所需能力
    #[error("{protocol} 客户端不支持{capability}")]
    CapabilityMissing {
        protocol: &'static str,
        capability: &'static str,
    },

    #[error(transparent)]
    Copy(CopyError),

    /// 安全审计发现的不安全选项
    #[error("unsecure options found: {}", .0.join(", "))]
    UnsafeOptions(Vec<String>),

    /// 固件存在已知漏洞
    #[error("{0}")]
    Vulnerabilities(VulnerabilityReport),

    /// 漏洞检查失败
    #[error("漏洞检查失败: {0}")]
    VulnerabilityCheck(#[source] VulnerabilityError),

    #[error("无法识别设备固件版本")]
    VersionNotRecognized,

    /// 服务取消时尚未执行的任务
    #[error("任务已取消")]
    Cancelled,

    /// 没有注册的任务类型
    #[error("未知的任务类型: {0}")]
    UnexpectedJob(String),

    /// 有新版本可用，仅为提示
    #[error("new version of netbulk v{version} available at {url}")]
    NewVersionAvailable { version: String, url: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl ModeError {
    /// 是否只是提示，不影响任务成败
    pub fn is_warning(&self) -> bool {
        matches!(self, ModeError::NewVersionAvailable { .. })
    }
}

impl From<CopyError> for ModeError {
    fn from(e: CopyError) -> Self {
        match e {
            CopyError::Unsupported { protocol } => ModeError::CapabilityMissing {
                protocol,
                capability: "文件复制",
            },
            other => ModeError::Copy(other),
        }
    }
}

/// 服务错误
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 服务已停止，无法提交任务
    #[error("任务服务已停止")]
    Stopped,

    #[error("任务加载失败: {0}")]
    Load(#[from] anyhow::Error),

    #[error("键值存储错误: {0}")]
    Store(#[from] netbulk_kvdb::KvError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 服务结果类型
pub type Result<T> = std::result::Result<T, ServiceError>;

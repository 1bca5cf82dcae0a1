//! 服务配置

use netbulk_clients::ClientsConfig;
use netbulk_vulnerabilities::ManagerConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 任务服务配置
///
/// 由嵌入方读取配置文件后通过 [`ServiceConfig::from_toml_str`] 构造。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 当前程序版本，由嵌入方设置
    #[serde(skip, default = "default_version")]
    pub version: String,
    /// 跳过新版本检查
    #[serde(default)]
    pub skip_version_check: bool,
    /// 工作者数量
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 每个工作者的队列容量
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// 漏洞缓存数据库路径
    #[serde(default = "default_kv_store")]
    pub kv_store: String,
    #[serde(default)]
    pub vulnerabilities: ManagerConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    8
}

fn default_kv_store() -> String {
    "~/.netbulk/vulnerabilities.db".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            skip_version_check: false,
            workers: default_workers(),
            queue_size: default_queue_size(),
            kv_store: default_kv_store(),
            vulnerabilities: ManagerConfig::default(),
            clients: ClientsConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers 必须大于 0".to_string()));
        }
        if self.queue_size == 0 {
            return Err(ConfigError::Invalid("queue_size 必须大于 0".to_string()));
        }
        Ok(())
    }

    /// 设置工作者数量
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// 设置程序版本
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

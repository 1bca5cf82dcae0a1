//! 漏洞管理器配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CVE 数据源镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CveSource {
    /// CVE 数据地址
    pub db: String,
    /// 数据源信息地址；配置后先比较更新时间，未更新时跳过下载
    #[serde(default)]
    pub db_info: Option<String>,
}

impl CveSource {
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            db_info: None,
        }
    }

    /// 设置数据源信息地址
    pub fn db_info(mut self, url: impl Into<String>) -> Self {
        self.db_info = Some(url.into());
        self
    }
}

/// 漏洞管理器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// CVE 数据源，按顺序尝试直到成功
    #[serde(default = "default_cve_urls")]
    pub cve_urls: Vec<CveSource>,
    /// 最新发布版本查询地址
    #[serde(default = "default_release_url")]
    pub release_url: String,
    /// 缓存有效期
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
    /// 下载尝试次数
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
    /// 下载重试退避基数，第 n 次重试前等待 n² 倍
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,
    /// HTTP 超时
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub http_timeout: Duration,
}

fn default_cve_urls() -> Vec<CveSource> {
    vec![CveSource::new("https://cve.circl.lu/api/search/mikrotik")]
}

fn default_release_url() -> String {
    "https://api.github.com/repos/netbulk/netbulk/releases/latest".to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_download_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cve_urls: default_cve_urls(),
            release_url: default_release_url(),
            refresh_interval: default_refresh_interval(),
            download_attempts: default_download_attempts(),
            retry_backoff: default_retry_backoff(),
            http_timeout: default_http_timeout(),
        }
    }
}

impl ManagerConfig {
    /// 只使用一个数据源
    pub fn cve_url(mut self, url: impl Into<String>) -> Self {
        self.cve_urls = vec![CveSource::new(url)];
        self
    }

    /// 设置数据源镜像列表
    pub fn cve_sources(mut self, sources: Vec<CveSource>) -> Self {
        self.cve_urls = sources;
        self
    }

    /// 设置重试退避基数
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// 设置缓存有效期
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

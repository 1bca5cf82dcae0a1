//! NetBulk 漏洞管理器
//!
//! 从公开 CVE 数据源下载 RouterOS 相关漏洞，按归一化版本建立倒排索引并缓存在
//! 键值存储中。查询某个固件版本时返回所有不低于该版本的索引项所列出的 CVE。
//!
//! 管理器以单任务方式运行: [`VulnerabilityManager`] 是可克隆的请求句柄，
//! [`ManagerListener::listen`] 串行处理请求。

pub mod config;
pub mod cve;
pub mod error;
pub mod fetcher;
pub mod manager;

pub use config::{CveSource, ManagerConfig};
pub use cve::{
    normalize_version, parse_db_info, parse_feed, Cve, DbInfo, ParsedFeed, Release, VulnerabilityReport,
};
pub use error::{FetchError, Result, VulnerabilityError};
pub use fetcher::{Fetcher, HttpFetcher};
pub use manager::{ManagerListener, VulnerabilityManager, REQUIRED_KVDB_VERSION};

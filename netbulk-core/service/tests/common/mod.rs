//! 测试公共设施

#![allow(dead_code)]

use async_trait::async_trait;
use netbulk_kvdb::SqliteKv;
use netbulk_vulnerabilities::{FetchError, Fetcher, ManagerConfig, VulnerabilityManager};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CVE_URL: &str = "https://feed.test/cve";
pub const RELEASE_URL: &str = "https://feed.test/release";

pub const FEED: &str = r#"{"data": [
    {"id": "CVE-2018-14847", "cvss": 6.4, "summary": "winbox file read",
     "vulnerable_configuration": ["cpe:2.3:o:mikrotik:routeros:6.42"]},
    {"id": "CVE-2012-6050", "summary": "old",
     "vulnerable_configuration": ["cpe:2.3:o:mikrotik:routeros:5.15"]}
]}"#;

/// 按 URL 返回固定内容
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .map(|body| body.as_bytes().to_vec())
            .ok_or(FetchError::Status(404))
    }
}

pub fn manager_config() -> ManagerConfig {
    let mut config = ManagerConfig::default()
        .cve_url(CVE_URL)
        .retry_backoff(Duration::from_millis(1));
    config.release_url = RELEASE_URL.to_string();
    config
}

/// 启动一个使用内存缓存的漏洞管理器
pub async fn start_manager(fetcher: StaticFetcher, cancel: &CancellationToken) -> VulnerabilityManager {
    let kv = Arc::new(SqliteKv::in_memory().await.unwrap());
    let (manager, listener) = VulnerabilityManager::new(manager_config(), kv, Arc::new(fetcher));
    tokio::spawn(listener.listen(cancel.clone()));
    manager
}

/// 安装测试日志输出
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

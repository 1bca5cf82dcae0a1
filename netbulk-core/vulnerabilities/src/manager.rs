//! 漏洞管理器
//!
//! [`VulnerabilityManager`] 是可克隆的句柄，请求经容量为 1 的邮箱发送给唯一的
//! [`ManagerListener`] 任务。所有缓存读写都在该任务中串行完成。
//!
//! 缓存键:
//! - `CVE:<id>`: CVE 记录
//! - `Version:<n>`: 归一化版本 -> CVE 编号列表
//! - `DB:LastUpdate` / `DB:Version`: 最近一次成功下载的时间与缓存格式版本
//! - `DB:CVE:DBInfo`: 下载时数据源各集合的更新时间
//! - `Release:Latest`: 最新发布版本

use chrono::{DateTime, Utc};
use netbulk_kvdb::{Kv, Txn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CveSource, ManagerConfig};
use crate::cve::{
    normalize_version, parse_db_info, parse_feed, parse_release, Cve, DbInfo, ParsedFeed, Release,
    VulnerabilityReport,
};
use crate::error::{Result, VulnerabilityError};
use crate::fetcher::Fetcher;

/// 当前缓存格式版本，低于此版本的缓存视为过期
pub const REQUIRED_KVDB_VERSION: u32 = 1;

const KEY_LAST_UPDATE: &str = "DB:LastUpdate";
const KEY_DB_VERSION: &str = "DB:Version";
const KEY_DB_INFO: &str = "DB:CVE:DBInfo";
const KEY_LATEST_RELEASE: &str = "Release:Latest";
const PREFIX_CVE: &str = "CVE:";
const PREFIX_VERSION: &str = "Version:";

/// 发送给管理器的请求
enum Request {
    Check {
        version: String,
        reply: oneshot::Sender<Result<VulnerabilityReport>>,
    },
    LatestRelease {
        reply: oneshot::Sender<Result<Release>>,
    },
}

/// 管理器句柄
#[derive(Clone)]
pub struct VulnerabilityManager {
    requests: async_channel::Sender<Request>,
}

impl VulnerabilityManager {
    /// 创建句柄与对应的监听任务
    pub fn new(config: ManagerConfig, kv: Arc<dyn Kv>, fetcher: Arc<dyn Fetcher>) -> (Self, ManagerListener) {
        let (tx, rx) = async_channel::bounded(1);
        let listener = ManagerListener {
            config,
            kv,
            fetcher,
            requests: rx,
        };
        (Self { requests: tx }, listener)
    }

    /// 检查固件版本的已知漏洞
    ///
    /// 返回空报告表示检查完成且未发现漏洞。
    pub async fn check(&self, version: &str) -> Result<VulnerabilityReport> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Check {
                version: version.to_string(),
                reply,
            })
            .await
            .map_err(|_| VulnerabilityError::ManagerStopped)?;
        rx.await.map_err(|_| VulnerabilityError::ManagerStopped)?
    }

    /// 查询最新发布版本 (带缓存)
    pub async fn latest_release(&self) -> Result<Release> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::LatestRelease { reply })
            .await
            .map_err(|_| VulnerabilityError::ManagerStopped)?;
        rx.await.map_err(|_| VulnerabilityError::ManagerStopped)?
    }

    /// 关闭邮箱，监听任务处理完当前请求后退出
    pub fn close(&self) {
        self.requests.close();
    }
}

/// 管理器监听任务，独占缓存
pub struct ManagerListener {
    config: ManagerConfig,
    kv: Arc<dyn Kv>,
    fetcher: Arc<dyn Fetcher>,
    requests: async_channel::Receiver<Request>,
}

impl ManagerListener {
    /// 处理请求直到邮箱关闭或取消
    pub async fn listen(self, cancel: CancellationToken) {
        info!("漏洞管理器启动");

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = self.requests.recv() => match request {
                    Ok(request) => request,
                    Err(_) => break,
                },
            };

            // 取消时丢弃进行中的请求，未提交的事务随之回滚
            match request {
                Request::Check { version, reply } => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.check(&cancel, &version) => {
                            let _ = reply.send(result);
                        }
                    }
                }
                Request::LatestRelease { reply } => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.latest_release() => {
                            let _ = reply.send(result);
                        }
                    }
                }
            }
        }

        info!("漏洞管理器退出");
    }

    async fn check(&self, cancel: &CancellationToken, version: &str) -> Result<VulnerabilityReport> {
        let queried = normalize_version(version)
            .ok_or_else(|| VulnerabilityError::InvalidVersion(version.to_string()))?;

        if self.is_stale().await? {
            self.download(cancel).await?;
        }
        self.scan(queried).await
    }

    async fn is_stale(&self) -> Result<bool> {
        let mut view = self.kv.view().await?;
        let last_update: Option<DateTime<Utc>> = view.get_copy(KEY_LAST_UPDATE).await?;
        let db_version: Option<u32> = view.get_copy(KEY_DB_VERSION).await?;
        view.finish().await?;

        if db_version.unwrap_or(0) < REQUIRED_KVDB_VERSION {
            debug!("漏洞缓存格式过旧: {:?}", db_version);
            return Ok(true);
        }
        let Some(last_update) = last_update else {
            return Ok(true);
        };
        Ok(match (Utc::now() - last_update).to_std() {
            Ok(age) => age > self.config.refresh_interval,
            Err(_) => false,
        })
    }

    /// 依次尝试各个数据源，直到有一个成功
    async fn download(&self, cancel: &CancellationToken) -> Result<()> {
        let mut last_error = None;

        for source in &self.config.cve_urls {
            match self.download_from(cancel, source).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("漏洞数据源不可用 {}: {}", source.db, e);
                    last_error = Some(e);
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        Err(last_error.unwrap_or(VulnerabilityError::NoSource))
    }

    /// 从单个数据源下载并重建索引
    ///
    /// 配置了数据源信息时先比较更新时间，远端没有更新则只刷新检查时间。
    async fn download_from(&self, cancel: &CancellationToken, source: &CveSource) -> Result<()> {
        let remote_info = match &source.db_info {
            Some(url) => Some(self.fetch_with_retries(cancel, url, parse_db_info).await?),
            None => None,
        };

        if let Some(remote) = &remote_info {
            if let Some(local) = self.local_db_info().await? {
                if !local.is_before(remote) {
                    info!("漏洞数据源没有更新: {}", source.db);
                    let mut txn = self.kv.new_transaction().await?;
                    txn.store(KEY_LAST_UPDATE, &Utc::now()).await?;
                    txn.commit().await?;
                    return Ok(());
                }
            }
        }

        let feed = self.fetch_with_retries(cancel, &source.db, parse_feed).await?;
        self.store(feed, remote_info.as_ref()).await
    }

    /// 当前格式缓存对应的数据源信息
    async fn local_db_info(&self) -> Result<Option<DbInfo>> {
        let mut view = self.kv.view().await?;
        let db_version: Option<u32> = view.get_copy(KEY_DB_VERSION).await?;
        let info: Option<DbInfo> = view.get_copy(KEY_DB_INFO).await?;
        view.finish().await?;

        if db_version.unwrap_or(0) < REQUIRED_KVDB_VERSION {
            return Ok(None);
        }
        Ok(info)
    }

    /// 获取并解析，多次尝试之间退避
    async fn fetch_with_retries<T>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        parse: fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.config.download_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.config.retry_backoff * attempt * attempt;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            info!("下载漏洞数据 (尝试 #{}): {}", attempt, url);
            let parsed = match self.fetcher.fetch(url).await {
                Ok(bytes) => parse(&bytes),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("下载漏洞数据失败 (尝试 #{}): {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or(VulnerabilityError::ManagerStopped);
        Err(VulnerabilityError::DownloadFailed {
            attempts,
            source: Box::new(source),
        })
    }

    /// 在单个事务中写入索引，失败时放弃整个事务
    async fn store(&self, feed: ParsedFeed, info: Option<&DbInfo>) -> Result<()> {
        let mut txn = self.kv.new_transaction().await?;
        match write_feed(txn.as_mut(), &feed, info).await {
            Ok(()) => {
                txn.commit().await?;
                info!(
                    "漏洞缓存已更新: {} 条 CVE, {} 个版本",
                    feed.cves.len(),
                    feed.index.len()
                );
                Ok(())
            }
            Err(e) => {
                if let Err(discard_error) = txn.discard().await {
                    warn!("放弃漏洞缓存事务失败: {}", discard_error);
                }
                Err(e)
            }
        }
    }

    /// 汇总所有不低于查询版本的索引项
    async fn scan(&self, queried: i64) -> Result<VulnerabilityReport> {
        let mut view = self.kv.view().await?;

        let mut versions: Vec<(i64, String)> = view
            .keys_with_prefix(PREFIX_VERSION)
            .await?
            .into_iter()
            .filter_map(|key| {
                let version = key.strip_prefix(PREFIX_VERSION)?.parse::<i64>().ok()?;
                Some((version, key))
            })
            .filter(|(version, _)| *version >= queried)
            .collect();
        versions.sort_by_key(|(version, _)| *version);

        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for (_, key) in &versions {
            let listed: Vec<String> = view.get_copy(key).await?.unwrap_or_default();
            for id in listed {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }

        let mut report = VulnerabilityReport::default();
        for id in ids {
            match view.get_copy::<Cve>(&format!("{}{}", PREFIX_CVE, id)).await? {
                Some(cve) => report.cves.push(cve),
                None => warn!("漏洞索引引用了缺失的记录: {}", id),
            }
        }
        view.finish().await?;

        debug!("版本 {} 匹配 {} 条漏洞", queried, report.len());
        Ok(report)
    }

    async fn latest_release(&self) -> Result<Release> {
        let mut view = self.kv.view().await?;
        let cached: Option<Release> = view.get_copy(KEY_LATEST_RELEASE).await?;
        view.finish().await?;

        let now = Utc::now();
        if let Some(release) = cached {
            let fresh = match (now - release.checked_at).to_std() {
                Ok(age) => age <= self.config.refresh_interval,
                Err(_) => true,
            };
            if fresh {
                return Ok(release);
            }
        }

        let bytes = self.fetcher.fetch(&self.config.release_url).await?;
        let release = parse_release(&bytes, now)?;

        let mut txn = self.kv.new_transaction().await?;
        txn.store(KEY_LATEST_RELEASE, &release).await?;
        txn.commit().await?;
        Ok(release)
    }
}

async fn write_feed(txn: &mut dyn Txn, feed: &ParsedFeed, info: Option<&DbInfo>) -> Result<()> {
    for cve in &feed.cves {
        txn.store(&format!("{}{}", PREFIX_CVE, cve.id), cve).await?;
    }
    for (version, ids) in &feed.index {
        txn.store(&format!("{}{}", PREFIX_VERSION, version), ids).await?;
    }
    txn.store(KEY_LAST_UPDATE, &Utc::now()).await?;
    txn.store(KEY_DB_VERSION, &REQUIRED_KVDB_VERSION).await?;
    if let Some(info) = info {
        txn.store(KEY_DB_INFO, info).await?;
    }
    Ok(())
}

//! 检查本程序是否有新版本

use async_trait::async_trait;
use netbulk_clients::Client;
use netbulk_entities::{CommandResult, Job};
use netbulk_vulnerabilities::VulnerabilityManager;
use regex::Regex;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ModeHandler;
use crate::error::ModeError;
use crate::result::JobResult;

const VERSION_PATTERN: &str = r"(\d+)\.(\d+)(?:\.(\d+))?";

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN).ok()).as_ref()
}

/// 把 `major.minor[.patch]` 转为可比较的整数，每段占 4 位
///
/// `1.2.3` -> 000100020003，缺少的补丁号按 0 计。
pub fn parse_version(version: &str) -> Option<i64> {
    let caps = version_regex()?.captures(version)?;
    let mut value = 0i64;
    for group in 1..=3 {
        let segment = match caps.get(group) {
            Some(m) => m.as_str().parse::<i64>().ok()?,
            None => 0,
        };
        if segment > 9999 {
            return None;
        }
        value = value * 10_000 + segment;
    }
    Some(value)
}

/// 版本检查，不需要设备会话
///
/// 查询失败或最新发布为草稿时静默跳过；发现新版本时返回 [`ModeError::NewVersionAvailable`]，
/// 它只是提示，不影响任务成败。
pub struct CheckVersion {
    manager: VulnerabilityManager,
    current: String,
}

impl CheckVersion {
    pub fn new(manager: VulnerabilityManager, current: impl Into<String>) -> Self {
        Self {
            manager,
            current: current.into(),
        }
    }
}

#[async_trait]
impl ModeHandler for CheckVersion {
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        _client: Option<&mut dyn Client>,
        job: Job,
    ) -> JobResult {
        let mut result = JobResult::new(job);

        let release = match self.manager.latest_release().await {
            Ok(release) => release,
            Err(e) => {
                debug!("获取最新版本失败: {}", e);
                return result;
            }
        };

        if release.draft {
            debug!("最新发布是草稿，跳过: {}", release.version);
            return result;
        }

        let current = parse_version(&self.current).unwrap_or(0);
        let Some(latest) = parse_version(&release.version) else {
            debug!("无法识别最新版本号: {}", release.version);
            return result;
        };

        if current < latest {
            let warning = ModeError::NewVersionAvailable {
                version: release.version,
                url: release.url,
            };
            result.push(CommandResult::synthetic("check version").with_error(&warning));
            result.error(warning);
        }
        result
    }
}

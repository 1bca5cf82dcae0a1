//! 任务来源接口

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::host::Host;
use crate::job::{Job, JobTemplate};

/// 任务加载器
///
/// 由外部驱动 (命令行参数、主机列表文件、数据库) 实现，
/// 每个配置的来源调用一次，返回按模板生成的任务列表。
#[async_trait]
pub trait JobsLoader: Send + Sync {
    async fn load(&self, cancel: &CancellationToken, template: &JobTemplate) -> anyhow::Result<Vec<Job>>;
}

/// 固定主机列表的加载器
pub struct StaticHostsLoader {
    hosts: Vec<Host>,
}

impl StaticHostsLoader {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl JobsLoader for StaticHostsLoader {
    async fn load(&self, cancel: &CancellationToken, template: &JobTemplate) -> anyhow::Result<Vec<Job>> {
        if cancel.is_cancelled() {
            anyhow::bail!("任务加载已取消");
        }
        Ok(self
            .hosts
            .iter()
            .cloned()
            .map(|host| template.instantiate(host))
            .collect())
    }
}

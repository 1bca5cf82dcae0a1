//! 任务服务
//!
//! [`Service::listen`] 启动漏洞管理器与全部工作者，并运行唯一的分派循环。
//! 分派只在这一个任务中进行，主机亲和记录不会被并发修改。
//! 取消时尚未执行的任务都以 [`ModeError::Cancelled`](crate::ModeError::Cancelled) 作答，
//! 每个已提交的任务恰好得到一个结果。

use netbulk_entities::{Host, Job, JobKind, JobTemplate, JobsLoader};
use netbulk_kvdb::{Kv, SqliteKv};
use netbulk_vulnerabilities::{Fetcher, HttpFetcher, ManagerListener, VulnerabilityManager};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServiceConfig;
use crate::error::{ConfigError, Result, ServiceError};
use crate::mode::ModeRegistry;
use crate::result::JobResult;
use crate::worker::{Submission, WorkerPool};

/// 服务的提交端
#[derive(Clone)]
pub struct ServiceHandle {
    jobs: async_channel::Sender<Submission>,
    skip_version_check: bool,
}

impl ServiceHandle {
    /// 提交一个任务，返回它的结果通道
    pub async fn submit(&self, job: Job) -> Result<oneshot::Receiver<JobResult>> {
        let (submission, rx) = Submission::new(job);
        self.jobs
            .send(submission)
            .await
            .map_err(|_| ServiceError::Stopped)?;
        Ok(rx)
    }

    /// 运行加载器并提交它返回的全部任务
    pub async fn load(
        &self,
        cancel: &CancellationToken,
        loader: &dyn JobsLoader,
        template: &JobTemplate,
    ) -> Result<Vec<oneshot::Receiver<JobResult>>> {
        let jobs = loader.load(cancel, template).await?;
        info!("加载了 {} 个任务", jobs.len());

        let mut receivers = Vec::with_capacity(jobs.len());
        for job in jobs {
            receivers.push(self.submit(job).await?);
        }
        Ok(receivers)
    }

    /// 提交新版本检查任务；配置跳过时返回 `None`
    pub async fn check_version(&self) -> Result<Option<oneshot::Receiver<JobResult>>> {
        if self.skip_version_check {
            return Ok(None);
        }
        let job = Job::new(Host::default(), JobKind::CheckVersion);
        self.submit(job).await.map(Some)
    }

    /// 不再接受新任务；已提交的任务会处理完
    pub fn close(&self) {
        self.jobs.close();
    }
}

/// 任务服务
pub struct Service {
    config: ServiceConfig,
    registry: Arc<ModeRegistry>,
    manager: VulnerabilityManager,
    listener: ManagerListener,
    jobs: async_channel::Receiver<Submission>,
}

impl Service {
    /// 按配置打开漏洞缓存与 HTTP 客户端并创建服务
    pub async fn from_config(config: ServiceConfig) -> Result<(Self, ServiceHandle)> {
        config.validate()?;

        let kv = SqliteKv::open(&config.kv_store).await?;
        let fetcher = HttpFetcher::new(config.vulnerabilities.http_timeout)
            .map_err(|e| ConfigError::Invalid(format!("HTTP 客户端初始化失败: {}", e)))?;

        Ok(Self::new(config, Arc::new(kv), Arc::new(fetcher)))
    }

    /// 使用内置任务类型创建服务
    pub fn new(
        config: ServiceConfig,
        kv: Arc<dyn Kv>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, ServiceHandle) {
        let (manager, listener) =
            VulnerabilityManager::new(config.vulnerabilities.clone(), kv, fetcher);
        let registry = ModeRegistry::standard(manager.clone(), config.version.clone());
        Self::with_registry(config, registry, manager, listener)
    }

    /// 使用自定义注册表创建服务
    pub fn with_registry(
        config: ServiceConfig,
        registry: ModeRegistry,
        manager: VulnerabilityManager,
        listener: ManagerListener,
    ) -> (Self, ServiceHandle) {
        let (tx, rx) = async_channel::bounded(config.workers.max(1));
        let handle = ServiceHandle {
            jobs: tx,
            skip_version_check: config.skip_version_check,
        };
        let service = Self {
            config,
            registry: Arc::new(registry),
            manager,
            listener,
            jobs: rx,
        };
        (service, handle)
    }

    /// 运行服务，直到提交端全部关闭或取消
    ///
    /// 返回前关闭工作池、等待全部工作者退出并停止漏洞管理器。
    pub async fn listen(self, cancel: CancellationToken) {
        let Service {
            config,
            registry,
            manager,
            listener,
            jobs,
        } = self;

        let manager_cancel = cancel.child_token();
        let manager_task = tokio::spawn(listener.listen(manager_cancel.clone()));

        let clients = Arc::new(config.clients.clone());
        let (pool, workers) = WorkerPool::new(
            config.workers,
            config.queue_size,
            registry.clone(),
            clients.clone(),
        );
        let mut tasks = JoinSet::new();
        for worker in workers {
            tasks.spawn(worker.process_jobs(cancel.clone()));
        }
        info!("任务服务启动: {} 个工作者", pool.len());

        loop {
            let mut submission = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                submission = jobs.recv() => match submission {
                    Ok(submission) => submission,
                    Err(_) => break,
                },
            };

            // 亲和键按实际连接的端口计算
            if let Some(port) = registry.default_port(&submission.job.kind, &clients) {
                submission.job.host.default_port(port);
            }

            let Some(worker) = pool.get(&submission.job.host) else {
                error!("没有可用的工作者");
                submission.cancel();
                break;
            };
            debug!("任务 {} 分派给工作者 #{}", submission.job.id, worker.id());

            // 取消后工作者关闭队列，等待中的发送随之退回
            if let Err(submission) = worker.send(submission).await {
                debug!("工作者 #{} 队列已关闭", worker.id());
                submission.cancel();
            }
        }

        jobs.close();
        while let Ok(submission) = jobs.try_recv() {
            submission.cancel();
        }

        pool.close();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("工作者异常退出: {}", e);
            }
        }

        manager.close();
        manager_cancel.cancel();
        if let Err(e) = manager_task.await {
            error!("漏洞管理器异常退出: {}", e);
        }
        info!("任务服务已停止");
    }
}

//! 工作者与工作池
//!
//! 每个 [`Worker`] 是一个独立任务，从自己的有界队列中顺序取出任务执行。
//! [`WorkerPool`] 负责分派: 已经处理过某主机的工作者继续处理该主机的任务，
//! 保证同一设备不会同时被两个会话操作；其他主机轮询分配。

use netbulk_clients::{Client, ClientsConfig};
use netbulk_entities::{Host, HostKey, Job};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::ModeError;
use crate::mode::ModeRegistry;
use crate::result::JobResult;

/// 排队中的任务及其结果通道
pub struct Submission {
    pub job: Job,
    pub reply: oneshot::Sender<JobResult>,
}

impl Submission {
    pub fn new(job: Job) -> (Self, oneshot::Receiver<JobResult>) {
        let (reply, rx) = oneshot::channel();
        (Self { job, reply }, rx)
    }

    /// 不执行，直接以取消作答
    pub fn cancel(self) {
        let Submission { job, reply } = self;
        debug!("任务 {} 未执行即取消", job.id);
        let _ = reply.send(JobResult::failed(job, ModeError::Cancelled));
    }
}

/// 工作者
pub struct Worker {
    id: usize,
    queue: async_channel::Receiver<Submission>,
    registry: Arc<ModeRegistry>,
    clients: Arc<ClientsConfig>,
}

impl Worker {
    pub fn id(&self) -> usize {
        self.id
    }

    /// 处理队列中的任务，直到队列关闭或取消
    ///
    /// 处理器的错误只记录在结果中，不会使工作者退出。取消后队列中剩余的任务
    /// 以 [`ModeError::Cancelled`] 作答。
    pub async fn process_jobs(self, cancel: CancellationToken) {
        debug!("工作者 #{} 启动", self.id);

        loop {
            let submission = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                submission = self.queue.recv() => match submission {
                    Ok(submission) => submission,
                    Err(_) => break,
                },
            };

            let Submission { job, reply } = submission;
            let span = info_span!(
                "job",
                id = %job.id,
                host = %job.host,
                kind = %job.kind,
                worker = self.id
            );
            let result = self.process(&cancel, job).instrument(span).await;

            if reply.send(result).is_err() {
                debug!("任务结果无人接收");
            }
        }

        self.queue.close();
        while let Ok(submission) = self.queue.try_recv() {
            submission.cancel();
        }
        debug!("工作者 #{} 退出", self.id);
    }

    async fn process(&self, cancel: &CancellationToken, job: Job) -> JobResult {
        let Some(entry) = self.registry.get(&job.kind) else {
            warn!("未知的任务类型: {}", job.kind);
            let kind = job.kind.to_string();
            return JobResult::failed(job, ModeError::UnexpectedJob(kind));
        };

        let mut client = entry.client.as_ref().map(|factory| factory(&self.clients));
        let session: Option<&mut dyn Client> = match client.as_mut() {
            Some(client) => Some(&mut **client),
            None => None,
        };
        let result = entry.handler.handle(cancel, session, job).await;

        if result.is_success() {
            info!("任务完成");
        } else {
            for error in &result.errors {
                warn!("任务错误: {}", error);
            }
        }
        result
    }
}

/// 工作者的分派端
struct Slot {
    queue: async_channel::Sender<Submission>,
    hosts: HashSet<HostKey>,
}

struct PoolState {
    slots: Vec<Slot>,
    next: usize,
}

/// 被选中的工作者
#[derive(Clone)]
pub struct WorkerHandle {
    id: usize,
    queue: async_channel::Sender<Submission>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// 放入工作者队列，队列满时等待；队列已关闭时退回任务
    pub async fn send(&self, submission: Submission) -> Result<(), Submission> {
        self.queue.send(submission).await.map_err(|e| e.into_inner())
    }
}

/// 工作池
pub struct WorkerPool {
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// 创建工作池与对应的工作者
    pub fn new(
        workers: usize,
        queue_size: usize,
        registry: Arc<ModeRegistry>,
        clients: Arc<ClientsConfig>,
    ) -> (Self, Vec<Worker>) {
        let mut slots = Vec::with_capacity(workers);
        let mut runners = Vec::with_capacity(workers);

        for id in 0..workers {
            let (tx, rx) = async_channel::bounded(queue_size.max(1));
            slots.push(Slot {
                queue: tx,
                hosts: HashSet::new(),
            });
            runners.push(Worker {
                id,
                queue: rx,
                registry: registry.clone(),
                clients: clients.clone(),
            });
        }

        let pool = Self {
            state: Mutex::new(PoolState { slots, next: 0 }),
        };
        (pool, runners)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 选择处理该主机的工作者
    ///
    /// 已处理过该主机的工作者优先，否则轮询并记录该主机。工作池为空时返回 `None`。
    pub fn get(&self, host: &Host) -> Option<WorkerHandle> {
        let key = host.key();
        let mut state = self.lock();

        if let Some(id) = state.slots.iter().position(|slot| slot.hosts.contains(&key)) {
            return Some(WorkerHandle {
                id,
                queue: state.slots[id].queue.clone(),
            });
        }

        if state.slots.is_empty() {
            return None;
        }
        let id = state.next % state.slots.len();
        state.next = (id + 1) % state.slots.len();

        let slot = &mut state.slots[id];
        slot.hosts.insert(key);
        Some(WorkerHandle {
            id,
            queue: slot.queue.clone(),
        })
    }

    /// 关闭全部工作者队列，队列中剩余的任务仍会被处理
    pub fn close(&self) {
        for slot in &self.lock().slots {
            slot.queue.close();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(workers: usize) -> (WorkerPool, Vec<Worker>) {
        WorkerPool::new(
            workers,
            8,
            Arc::new(ModeRegistry::new()),
            Arc::new(ClientsConfig::default()),
        )
    }

    #[test]
    fn test_affinity() {
        let (pool, _workers) = pool(3);
        let a = Host::parse("10.0.0.1").unwrap();
        let b = Host::parse("10.0.0.2").unwrap();

        let first = pool.get(&a).unwrap().id();
        let other = pool.get(&b).unwrap().id();
        assert_ne!(first, other);
        assert_eq!(pool.get(&a).unwrap().id(), first);
        assert_eq!(pool.get(&a).unwrap().id(), first);
    }

    #[test]
    fn test_round_robin() {
        let (pool, _workers) = pool(2);
        let ids: Vec<usize> = (1..=4)
            .map(|i| pool.get(&Host::parse(&format!("10.0.0.{}", i)).unwrap()).unwrap().id())
            .collect();
        assert_eq!(ids, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_port_is_part_of_affinity() {
        let (pool, _workers) = pool(2);
        let a = pool.get(&Host::parse("10.0.0.1:22").unwrap()).unwrap().id();
        let b = pool.get(&Host::parse("10.0.0.1:2222").unwrap()).unwrap().id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_pool() {
        let (pool, workers) = pool(0);
        assert!(workers.is_empty());
        assert!(pool.is_empty());
        assert!(pool.get(&Host::parse("10.0.0.1").unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_answered() {
        let (pool, mut workers) = pool(1);
        let worker = workers.remove(0);
        let task = tokio::spawn(worker.process_jobs(CancellationToken::new()));

        let job = Job::new(
            Host::parse("10.0.0.1").unwrap(),
            netbulk_entities::JobKind::Unknown("Reboot".into()),
        );
        let (submission, rx) = Submission::new(job);
        assert!(pool.get(&submission.job.host).unwrap().send(submission).await.is_ok());

        let result = rx.await.unwrap();
        assert!(matches!(&result.errors[..], [ModeError::UnexpectedJob(kind)] if kind == "Reboot"));

        pool.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_answers_queued_jobs() {
        let (pool, mut workers) = pool(1);
        let worker = workers.remove(0);
        let host = Host::parse("10.0.0.1").unwrap();
        let handle = pool.get(&host).unwrap();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (submission, rx) = Submission::new(Job::new(host.clone(), netbulk_entities::JobKind::CustomSsh));
            assert!(handle.send(submission).await.is_ok());
            receivers.push(rx);
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        worker.process_jobs(cancel).await;

        for rx in receivers {
            let result = rx.await.unwrap();
            assert!(matches!(result.errors[..], [ModeError::Cancelled]));
        }

        let (submission, _rx) = Submission::new(Job::new(host, netbulk_entities::JobKind::CustomSsh));
        let rejected = handle.send(submission).await.unwrap_err();
        assert_eq!(rejected.job.kind, netbulk_entities::JobKind::CustomSsh);
    }
}

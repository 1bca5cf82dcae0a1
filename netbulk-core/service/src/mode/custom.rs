//! 自定义命令序列 (SSH 或 RouterOS API)

use async_trait::async_trait;
use netbulk_clients::Client;
use netbulk_entities::Job;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{establish, execute, finish, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 原样执行任务自带的命令列表
pub struct Custom;

impl Custom {
    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let client = session(client)?;
        establish(cancel, client, result).await?;

        let commands = result.job.commands.clone();
        debug!("在 {} 上执行 {} 条自定义命令", result.job.host, commands.len());
        let outcome = execute(cancel, client, &commands, result).await;
        client.close().await;
        outcome.map(|_| ())
    }
}

#[async_trait]
impl ModeHandler for Custom {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        job: Job,
    ) -> JobResult {
        let mut result = JobResult::new(job);
        let outcome = Self::run(cancel, client, &mut result).await;
        finish(result, outcome)
    }
}

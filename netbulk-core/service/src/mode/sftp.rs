//! SFTP 文件传输

use async_trait::async_trait;
use netbulk_clients::{remote_path, Client};
use netbulk_entities::Job;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{confine, copy, establish, finish, required, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 在本地与设备之间复制一个文件，不执行命令
///
/// 参数: `source`、`target` (必填，至少一端为 `sftp://` 远端路径)，
/// `root_directory` (可选，限定本地一端)。
/// 从设备下载到本地时，本地路径作为下载地址返回。
pub struct Sftp;

impl Sftp {
    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let source = confine(&result.job, &required(&result.job, "source")?);
        let target = confine(&result.job, &required(&result.job, "target")?);

        if remote_path(&source).is_none() && remote_path(&target).is_none() {
            return Err(ModeError::Configuration(
                "至少一端必须是设备上的路径, 例如 sftp://remote_file_name.txt".to_string(),
            ));
        }
        let client = session(client)?;

        establish(cancel, client, result).await?;
        info!("SFTP {} -> {} ({})", source, target, result.job.host);

        let outcome = copy(cancel, client, &source, &target, result).await;
        client.close().await;
        outcome?;

        if remote_path(&source).is_some() && remote_path(&target).is_none() {
            result.download_urls.push(target);
        }
        Ok(())
    }
}

#[async_trait]
impl ModeHandler for Sftp {
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

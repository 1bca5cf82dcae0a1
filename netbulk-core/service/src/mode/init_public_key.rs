//! 初始化 SSH 公钥认证

use async_trait::async_trait;
use netbulk_clients::{secure_path_join, Client};
use netbulk_entities::{Command, Job};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{copy, establish, execute, finish, required_dir, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

const PUBLIC_KEY: &str = "id_rsa.pub";

/// 上传公钥并导入给当前登录用户
///
/// 参数: `keys_directory` (必填，包含 `id_rsa.pub`)，`root_directory` (可选)。
pub struct InitPublicKeySsh;

impl InitPublicKeySsh {
    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let keys_directory = required_dir(&result.job, "keys_directory")?;
        let client = session(client)?;

        establish(cancel, client, result).await?;
        info!("为 {} 导入 SSH 公钥", result.job.host);

        let outcome = async {
            copy(
                cancel,
                client,
                &secure_path_join(&keys_directory, PUBLIC_KEY),
                &format!("sftp://{}", PUBLIC_KEY),
                result,
            )
            .await?;

            let commands = vec![Command::new(format!(
                "/user ssh-keys import public-key-file={} user={}",
                PUBLIC_KEY, result.job.host.user
            ))];
            execute(cancel, client, &commands, result).await.map(|_| ())
        }
        .await;

        client.close().await;
        outcome
    }
}

#[async_trait]
impl ModeHandler for InitPublicKeySsh {
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

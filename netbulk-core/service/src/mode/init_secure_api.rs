//! 初始化 RouterOS API-SSL 证书 (SSH)

use async_trait::async_trait;
use netbulk_clients::{secure_path_join, Client};
use netbulk_entities::{Command, Job};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{copy, establish, execute, finish, required_dir, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 设备上的证书文件名
const DEVICE_CERT: &str = "netbulkdevice.crt";
const DEVICE_KEY: &str = "netbulkdevice.key";

/// 上传设备证书并启用 api-ssl
///
/// 参数: `keys_directory` (必填，包含 `device.crt` 与 `device.key`)，
/// `root_directory` (可选)。
///
/// 先删除同名的旧证书再导入，重复执行得到相同的命令序列。
pub struct InitSecureApi;

impl InitSecureApi {
    fn commands(client: &dyn Client) -> Vec<Command> {
        vec![
            Command::new("/ip service set api-ssl certificate=none"),
            Command::new("/certificate print detail").with_match("c", r"(?m)^\s+(\d+).*netbulkdevice"),
            Command::new("/certificate remove %{c1}"),
            Command::new(format!(r#"/certificate import file-name={} passphrase="""#, DEVICE_CERT))
                .with_expect("certificates-imported: 1"),
            Command::new(format!(r#"/certificate import file-name={} passphrase="""#, DEVICE_KEY))
                .with_expect("private-keys-imported: 1")
                .with_sleep(client.config().verify_sleep),
            Command::new(format!("/ip service set api-ssl disabled=no certificate={}", DEVICE_CERT)),
        ]
    }

    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let keys_directory = required_dir(&result.job, "keys_directory")?;
        let client = session(client)?;

        establish(cancel, client, result).await?;
        info!("初始化 {} 的 API-SSL 证书", result.job.host);

        let outcome = async {
            copy(
                cancel,
                client,
                &secure_path_join(&keys_directory, "device.crt"),
                &format!("sftp://{}", DEVICE_CERT),
                result,
            )
            .await?;
            copy(
                cancel,
                client,
                &secure_path_join(&keys_directory, "device.key"),
                &format!("sftp://{}", DEVICE_KEY),
                result,
            )
            .await?;

            let commands = Self::commands(client);
            execute(cancel, client, &commands, result).await.map(|_| ())
        }
        .await;

        client.close().await;
        outcome
    }
}

#[async_trait]
impl ModeHandler for InitSecureApi {
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

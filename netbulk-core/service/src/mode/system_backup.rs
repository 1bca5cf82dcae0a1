//! 系统备份 (SSH)

use async_trait::async_trait;
use netbulk_clients::{secure_path_join, Client};
use netbulk_entities::{Command, Job};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{copy, establish, execute, finish, required_dir, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 设备写完备份文件所需的等待时间
const BACKUP_SETTLE: Duration = Duration::from_secs(1);
const EXPORT_SETTLE: Duration = Duration::from_secs(5);

/// 保存二进制备份与导出脚本，并下载到本地
///
/// 参数: `backups_store` (必填，不存在时创建)，`name` (默认 `backup`)，
/// `root_directory` (可选)。文件名为 `<name>-<ip>.backup` 与 `<name>-<ip>.rsc`。
pub struct SystemBackup;

impl SystemBackup {
    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let name = format!(
            "{}-{}",
            result.job.data("name").unwrap_or("backup"),
            result.job.host.ip
        );
        let backups_store = required_dir(&result.job, "backups_store")?;
        tokio::fs::create_dir_all(&backups_store).await?;
        let client = session(client)?;

        establish(cancel, client, result).await?;
        info!("备份 {} 到 {}", result.job.host, backups_store);

        let outcome = async {
            let commands = vec![
                Command::new(format!("/system backup save dont-encrypt=yes name={}", name))
                    .with_sleep(BACKUP_SETTLE),
                Command::new(format!("/export file={}", name)).with_sleep(EXPORT_SETTLE),
            ];
            execute(cancel, client, &commands, result).await?;

            for extension in ["backup", "rsc"] {
                let file = format!("{}.{}", name, extension);
                let target = secure_path_join(&backups_store, &file);
                copy(cancel, client, &format!("sftp://{}", file), &target, result).await?;
                result.download_urls.push(target);
            }
            Ok::<(), ModeError>(())
        }
        .await;

        client.close().await;
        outcome
    }
}

#[async_trait]
impl ModeHandler for SystemBackup {
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

#[cfg(test)]
mod tests {
    use super::*;
    use netbulk_clients::testing::ScriptedClient;
    use netbulk_clients::ClientConfig;
    use netbulk_entities::{Host, JobKind};

    #[tokio::test(start_paused = true)]
    async fn test_backup_downloads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("backups");
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "pw");
        let job = Job::new(Host::parse("10.1.1.1").unwrap().with_password("pw"), JobKind::SystemBackup)
            .with_data("backups_store", store.to_string_lossy())
            .with_data("name", "nightly");

        let result = SystemBackup
            .handle(&CancellationToken::new(), Some(&mut client), job)
            .await;

        assert!(result.is_success(), "{:?}", result.errors);
        assert!(store.is_dir());
        assert_eq!(
            client.log().commands,
            vec![
                "/system backup save dont-encrypt=yes name=nightly-10.1.1.1",
                "/export file=nightly-10.1.1.1",
            ]
        );
        assert_eq!(result.download_urls.len(), 2);
        assert!(result.download_urls[0].ends_with("nightly-10.1.1.1.backup"));
        assert!(result.download_urls[1].ends_with("nightly-10.1.1.1.rsc"));
        // 建立连接 + 两条命令 + 两次复制
        assert_eq!(result.results.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_store() {
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "pw");
        let job = Job::new(Host::parse("10.1.1.1").unwrap(), JobKind::SystemBackup);

        let result = SystemBackup
            .handle(&CancellationToken::new(), Some(&mut client), job)
            .await;

        assert!(matches!(result.errors[..], [ModeError::Configuration(_)]));
    }
}

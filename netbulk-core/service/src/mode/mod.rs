//! 模式处理器
//!
//! 每种任务类型对应一个 [`ModeHandler`]。处理过程的组成固定为:
//! 建立连接 -> (可选) 文件复制 -> 执行命令 -> 汇总结果 -> 关闭客户端。
//! 处理器总是返回一个 [`JobResult`]，错误记录在结果中而不向外传播。

mod change_password;
mod check_version;
mod custom;
mod init_public_key;
mod init_secure_api;
mod registry;
mod security_audit;
mod sftp;
mod system_backup;

pub use change_password::ChangePassword;
pub use check_version::{parse_version, CheckVersion};
pub use custom::Custom;
pub use init_public_key::InitPublicKeySsh;
pub use init_secure_api::InitSecureApi;
pub use registry::{api_client, ssh_client, ClientFactory, ModeEntry, ModeRegistry};
pub use security_audit::SecurityAudit;
pub use sftp::Sftp;
pub use system_backup::SystemBackup;

use async_trait::async_trait;
use netbulk_clients::{
    copy_file, establish_connection, execute_commands, secure_path_join, CaptureTable, Client,
};
use netbulk_entities::{Command, Job};
use tokio_util::sync::CancellationToken;

use crate::error::ModeError;
use crate::result::JobResult;

/// 任务处理器
///
/// `client` 为注册表按任务类型构造的新会话，不需要设备的处理器收到 `None`。
#[async_trait]
pub trait ModeHandler: Send + Sync {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        job: Job,
    ) -> JobResult;
}

/// 读取必填参数
pub(crate) fn required(job: &Job, key: &str) -> Result<String, ModeError> {
    job.data(key)
        .map(str::to_string)
        .ok_or_else(|| ModeError::Configuration(format!("{} 未设置", key)))
}

/// 读取必填的本地目录参数，设置了 `root_directory` 时限定在其下
pub(crate) fn required_dir(job: &Job, key: &str) -> Result<String, ModeError> {
    let dir = required(job, key)?;
    Ok(confine(job, &dir))
}

/// 设置了 `root_directory` 时把路径限定在其下
pub(crate) fn confine(job: &Job, path: &str) -> String {
    match job.data("root_directory") {
        Some(root) => secure_path_join(root, path),
        None => path.to_string(),
    }
}

pub(crate) fn session(client: Option<&mut dyn Client>) -> Result<&mut dyn Client, ModeError> {
    client.ok_or_else(|| ModeError::Configuration("该任务类型需要设备会话".to_string()))
}

/// 建立连接并记录合成结果
pub(crate) async fn establish(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    result: &mut JobResult,
) -> Result<(), ModeError> {
    let established = establish_connection(cancel, client, &mut result.job.host).await?;
    result.push(established);
    Ok(())
}

/// 执行命令并记录结果，返回本次执行的捕获表
pub(crate) async fn execute(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    commands: &[Command],
    result: &mut JobResult,
) -> Result<CaptureTable, ModeError> {
    let execution = execute_commands(cancel, client, commands).await;
    result.extend(execution.results);
    match execution.error {
        Some(e) => Err(e.into()),
        None => Ok(execution.captures),
    }
}

/// 复制文件并记录合成结果
pub(crate) async fn copy(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    source: &str,
    target: &str,
    result: &mut JobResult,
) -> Result<(), ModeError> {
    let (copied, outcome) = copy_file(cancel, client, source, target).await;
    result.push(copied);
    outcome.map_err(ModeError::from)
}

/// 把处理过程的错误并入结果
pub(crate) fn finish(mut result: JobResult, outcome: Result<(), ModeError>) -> JobResult {
    if let Err(e) = outcome {
        result.error(e);
    }
    result
}

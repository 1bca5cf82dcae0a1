//! 文件复制

use netbulk_entities::CommandResult;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{Client, REMOTE_PREFIX};
use crate::error::CopyError;

/// 单个文件复制的超时
pub const COPY_TIMEOUT: Duration = Duration::from_secs(30);

/// 通过客户端的复制能力复制文件
///
/// 总是返回一条合成结果用于审计；复制失败时结果中带有错误信息。
pub async fn copy_file(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    source: &str,
    target: &str,
) -> (CommandResult, Result<(), CopyError>) {
    let result = CommandResult::synthetic(&format!("copy {} {}", source, target));
    let protocol = client.protocol();

    let Some(copier) = client.copier() else {
        let err = CopyError::Unsupported { protocol };
        return (result.with_error(&err), Err(err));
    };

    debug!("复制文件 {} -> {}", source, target);
    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(CopyError::Interrupted),
        _ = tokio::time::sleep(COPY_TIMEOUT) => Err(CopyError::Timeout(COPY_TIMEOUT)),
        copied = copier.copy_file(source, target) => copied.map_err(CopyError::from),
    };

    match outcome {
        Ok(()) => (result, Ok(())),
        Err(err) => {
            warn!("复制文件 {} -> {} 失败: {}", source, target, err);
            (result.with_error(&err), Err(err))
        }
    }
}

/// 把 `name` 限定在 `root` 之下
///
/// 设备端路径 (`sftp://`) 原样返回；本地路径去掉 `..` 等成分后拼接到 `root`。
pub fn secure_path_join(root: &str, name: &str) -> String {
    if name.starts_with(REMOTE_PREFIX) {
        return name.to_string();
    }

    let mut clean = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                clean.pop();
            }
            _ => {}
        }
    }

    Path::new(root).join(clean).to_string_lossy().into_owned()
}

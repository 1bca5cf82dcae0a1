//! NetBulk 设备客户端
//!
//! 两种会话实现同一个 [`Client`] 接口:
//! - [`SshClient`]: 伪终端 shell，按提示符判定命令结束，支持 SFTP 文件复制
//! - [`RouterOsApiClient`]: TLS 上的 RouterOS API 语句协议
//!
//! 在此之上提供两个基础操作:
//! - [`establish_connection`]: 候选密码 × 重试 的连接建立
//! - [`execute_commands`]: 带变量捕获与替换的顺序命令执行

pub mod client;
pub mod config;
pub mod copy;
pub mod error;
pub mod establish;
pub mod execute;
pub mod routeros;
pub mod ssh;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{remote_path, Client, Copier, REMOTE_PREFIX};
pub use config::{ClientConfig, ClientsConfig, PtyConfig};
pub use copy::{copy_file, secure_path_join, COPY_TIMEOUT};
pub use error::{ClientError, CopyError, EstablishError, ExecuteError, Result};
pub use establish::establish_connection;
pub use execute::{execute_commands, CaptureTable, Execution};
pub use routeros::RouterOsApiClient;
pub use ssh::SshClient;

//! NetBulk 基础实体
//!
//! 定义批量设备管理中流转的值类型:
//! - [`Host`]: 目标设备 (地址、端口、用户、候选密码列表)
//! - [`Command`] / [`CommandResult`]: 命令模板及其执行结果
//! - [`Job`] / [`JobKind`]: 绑定单个主机与单个操作类型的工作单元
//! - [`JobsLoader`]: 外部任务来源的接入接口

pub mod command;
pub mod error;
pub mod host;
pub mod job;
pub mod loader;

pub use command::{Command, CommandResult, CAPTURE_PREFIX, SYNTHETIC_PREFIX};
pub use error::HostError;
pub use host::{Host, HostKey};
pub use job::{Job, JobKind, JobTemplate};
pub use loader::{JobsLoader, StaticHostsLoader};

//! NetBulk 任务服务
//!
//! 把任务分派给固定数量的工作者并发执行:
//! - [`mode`]: 每种任务类型的处理器与注册表
//! - [`WorkerPool`] / [`Worker`]: 按主机亲和分派，同一设备的任务顺序执行
//! - [`Service`] / [`ServiceHandle`]: 分派循环与任务提交
//!
//! 每个提交的任务都有自己的一次性结果通道，恰好收到一个 [`JobResult`]。

pub mod config;
pub mod error;
pub mod mode;
pub mod result;
pub mod service;
pub mod worker;

pub use config::ServiceConfig;
pub use error::{ConfigError, ModeError, Result, ServiceError};
pub use mode::{ModeEntry, ModeHandler, ModeRegistry};
pub use result::JobResult;
pub use service::{Service, ServiceHandle};
pub use worker::{Submission, Worker, WorkerHandle, WorkerPool};

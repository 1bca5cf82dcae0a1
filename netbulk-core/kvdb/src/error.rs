//! 键值存储错误定义

use thiserror::Error;

/// 键值存储结果类型
pub type Result<T> = std::result::Result<T, KvError>;

/// 键值存储错误类型
#[derive(Error, Debug)]
pub enum KvError {
    /// 连接错误
    #[error("存储连接失败: {0}")]
    ConnectionError(String),

    /// 迁移错误
    #[error("存储迁移失败: {0}")]
    MigrationError(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

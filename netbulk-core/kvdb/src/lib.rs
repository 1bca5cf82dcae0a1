//! NetBulk 键值存储
//!
//! 提供最小的事务接口:
//! - [`Kv::view`]: 只读事务，结束后总是丢弃
//! - [`Kv::new_transaction`]: 读写事务，需显式 `commit` 或 `discard`
//!
//! 默认实现 [`SqliteKv`] 使用单连接池，保证同一时刻只有一个写者。
//! 同一任务中不要同时持有两个事务，否则第二个会一直等待连接。

pub mod error;
pub mod sqlite;
pub mod txn;

pub use error::{KvError, Result};
pub use sqlite::SqliteKv;
pub use txn::{Kv, Txn, View};

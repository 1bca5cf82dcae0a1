//! SQLite 键值存储实现

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{KvError, Result};
use crate::txn::{Kv, Txn, View};

/// 基于 SQLite 的键值存储
///
/// 连接池只有一个连接，所有事务串行执行。
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// 打开 (必要时创建) 数据库文件
    ///
    /// # 参数
    /// - `db_path`: 数据库文件路径，支持 `~` 展开
    pub async fn open(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path);
        let path = Path::new(expanded_path.as_ref());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KvError::ConnectionError(format!("无法创建存储目录: {}", e))
            })?;
        }

        info!("打开键值存储: {}", path.display());

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| KvError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| KvError::ConnectionError(e.to_string()))?;

        let kv = Self { pool };
        kv.run_migrations().await?;
        Ok(kv)
    }

    /// 创建内存存储(用于测试)
    pub async fn in_memory() -> Result<Self> {
        // 内存库随连接销毁，连接必须常驻
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| KvError::ConnectionError(e.to_string()))?;

        let kv = Self { pool };
        kv.run_migrations().await?;
        Ok(kv)
    }

    async fn run_migrations(&self) -> Result<()> {
        debug!("执行键值存储迁移");

        let migration_sql = include_str!("../migrations/001_kv.sql");
        sqlx::query(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::MigrationError(e.to_string()))?;

        Ok(())
    }

    async fn begin(&self) -> Result<SqliteTxn> {
        let tx = self.pool.begin().await?;
        Ok(SqliteTxn { tx })
    }
}

#[async_trait]
impl Kv for SqliteKv {
    async fn view(&self) -> Result<View> {
        Ok(View::new(Box::new(self.begin().await?)))
    }

    async fn new_transaction(&self) -> Result<Box<dyn Txn>> {
        Ok(Box::new(self.begin().await?))
    }

    async fn close(&self) {
        info!("关闭键值存储");
        self.pool.close().await;
    }
}

/// SQLite 事务
pub struct SqliteTxn {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl Txn for SqliteTxn {
    async fn get_raw(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(value)
    }

    async fn store_raw(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn keys_with_prefix(&mut self, prefix: &str) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(keys)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

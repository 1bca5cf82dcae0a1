//! 事务接口

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// 键值存储
#[async_trait]
pub trait Kv: Send + Sync {
    /// 打开只读视图，丢弃时回滚
    async fn view(&self) -> Result<View>;

    /// 开启读写事务
    async fn new_transaction(&self) -> Result<Box<dyn Txn>>;

    /// 关闭存储
    async fn close(&self);
}

/// 读写事务
///
/// 未提交即被丢弃的事务等同于 `discard`。
#[async_trait]
pub trait Txn: Send {
    /// 读取原始值
    async fn get_raw(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入原始值，已存在则覆盖
    async fn store_raw(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// 列出指定前缀的全部键，按字典序
    async fn keys_with_prefix(&mut self, prefix: &str) -> Result<Vec<String>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn discard(self: Box<Self>) -> Result<()>;
}

impl dyn Txn + '_ {
    /// 读取并反序列化 JSON 值
    pub async fn get_copy<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 序列化为 JSON 后写入
    pub async fn store<T: Serialize + Sync + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store_raw(key, bytes).await
    }
}

/// 只读视图
///
/// 只暴露读操作；结束时底层事务被丢弃。
pub struct View {
    inner: Box<dyn Txn>,
}

impl View {
    pub fn new(inner: Box<dyn Txn>) -> Self {
        Self { inner }
    }

    pub async fn get_raw(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_raw(key).await
    }

    pub async fn get_copy<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        self.inner.get_copy(key).await
    }

    pub async fn keys_with_prefix(&mut self, prefix: &str) -> Result<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }

    /// 结束视图
    pub async fn finish(self) -> Result<()> {
        self.inner.discard().await
    }
}

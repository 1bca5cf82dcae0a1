//! 客户端配置

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 伪终端尺寸
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyConfig {
    #[serde(default = "default_pty_width")]
    pub width: u32,
    #[serde(default = "default_pty_height")]
    pub height: u32,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            width: default_pty_width(),
            height: default_pty_height(),
        }
    }
}

fn default_pty_width() -> u32 {
    120
}

fn default_pty_height() -> u32 {
    200
}

/// 单个协议的客户端配置
///
/// 字段缺省值按 SSH 填充；RouterOS API 段落若只覆盖部分字段，需要显式给出 `default_port`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 外层重试次数
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// 证书导入等操作后的确认等待
    #[serde(with = "humantime_serde", default = "default_verify_sleep")]
    pub verify_sleep: Duration,
    /// 密钥目录 (id_rsa.key, client.crt, client.key)
    #[serde(default = "default_keys_store")]
    pub keys_store: PathBuf,
    #[serde(default)]
    pub pty: PtyConfig,
    #[serde(default = "default_ssh_port")]
    pub default_port: u16,
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default)]
    pub default_password: String,
    /// 连接超时
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// 单条命令超时
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
}

fn default_retries() -> u32 {
    2
}

fn default_verify_sleep() -> Duration {
    Duration::from_millis(1000)
}

fn default_keys_store() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("netbulk")
        .join("keys")
}

fn default_ssh_port() -> u16 {
    22
}

fn default_api_port() -> u16 {
    8729
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ClientConfig {
    /// SSH 终端会话的默认配置
    pub fn ssh() -> Self {
        Self {
            retries: default_retries(),
            verify_sleep: default_verify_sleep(),
            keys_store: default_keys_store(),
            pty: PtyConfig::default(),
            default_port: default_ssh_port(),
            default_user: default_user(),
            default_password: String::new(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }

    /// RouterOS API (TLS) 会话的默认配置
    pub fn routeros_api() -> Self {
        Self {
            default_port: default_api_port(),
            ..Self::ssh()
        }
    }

    /// 设置重试次数
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// 设置密钥目录
    pub fn keys_store(mut self, keys_store: impl Into<PathBuf>) -> Self {
        self.keys_store = keys_store.into();
        self
    }

    /// 设置默认凭据
    pub fn default_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.default_user = user.into();
        self.default_password = password.into();
        self
    }

    /// 设置单条命令超时
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 设置确认等待
    pub fn verify_sleep(mut self, sleep: Duration) -> Self {
        self.verify_sleep = sleep;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::ssh()
    }
}

/// 各协议客户端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientsConfig {
    #[serde(default = "ClientConfig::ssh")]
    pub ssh: ClientConfig,
    #[serde(default = "ClientConfig::routeros_api")]
    pub routeros_api: ClientConfig,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            ssh: ClientConfig::ssh(),
            routeros_api: ClientConfig::routeros_api(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientsConfig::default();
        assert_eq!(config.ssh.default_port, 22);
        assert_eq!(config.routeros_api.default_port, 8729);
        assert_eq!(config.ssh.retries, 2);
        assert_eq!(config.ssh.pty.width, 120);
        assert_eq!(config.ssh.pty.height, 200);
        assert_eq!(config.ssh.command_timeout, Duration::from_secs(30));
        assert_eq!(config.ssh.default_user, "admin");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::ssh()
            .retries(5)
            .keys_store("/tmp/keys")
            .default_credentials("ops", "a,b")
            .command_timeout(Duration::from_secs(3));

        assert_eq!(config.retries, 5);
        assert_eq!(config.keys_store, PathBuf::from("/tmp/keys"));
        assert_eq!(config.default_password, "a,b");
        assert_eq!(config.command_timeout, Duration::from_secs(3));
    }
}

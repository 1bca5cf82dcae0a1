//! 模拟设备客户端
//!
//! [`ScriptedClient`] 按脚本应答命令，并把连接尝试、命令、文件复制记录到共享的
//! [`DeviceLog`] 中。克隆出的实例共享同一份日志，便于在客户端被任务消耗后检查。

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::client::{remote_path, Client, Copier};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// 一次连接尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// 模拟设备的操作记录
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub connects: Vec<ConnectAttempt>,
    pub commands: Vec<String>,
    pub copies: Vec<(String, String)>,
    pub closes: usize,
    connected: bool,
}

impl DeviceLog {
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// 按脚本应答的模拟设备
#[derive(Clone)]
pub struct ScriptedClient {
    protocol: &'static str,
    config: ClientConfig,
    accepted_passwords: HashSet<String>,
    transport_failures: Arc<Mutex<usize>>,
    responses: Vec<(String, String)>,
    stall_on: Option<String>,
    command_delay: Option<Duration>,
    copy_supported: bool,
    log: Arc<Mutex<DeviceLog>>,
}

impl ScriptedClient {
    /// 创建接受指定密码的模拟 SSH 设备
    pub fn new(config: ClientConfig, password: &str) -> Self {
        Self {
            protocol: "ssh",
            config,
            accepted_passwords: HashSet::from([password.to_string()]),
            transport_failures: Arc::new(Mutex::new(0)),
            responses: Vec::new(),
            stall_on: None,
            command_delay: None,
            copy_supported: true,
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// 模拟 RouterOS API 会话 (不支持文件复制)
    pub fn api(config: ClientConfig, password: &str) -> Self {
        Self {
            protocol: "routeros-api",
            copy_supported: false,
            ..Self::new(config, password)
        }
    }

    /// 命令体包含 `needle` 时附带返回 `response`
    pub fn respond(mut self, needle: &str, response: &str) -> Self {
        self.responses.push((needle.to_string(), response.to_string()));
        self
    }

    /// 前 `count` 次连接返回传输错误
    pub fn fail_transport(self, count: usize) -> Self {
        *lock(&self.transport_failures) = count;
        self
    }

    /// 命令体包含 `needle` 时永不返回
    pub fn stall_on(mut self, needle: &str) -> Self {
        self.stall_on = Some(needle.to_string());
        self
    }

    /// 每条命令的模拟耗时
    pub fn command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = Some(delay);
        self
    }

    pub fn without_copy(mut self) -> Self {
        self.copy_supported = false;
        self
    }

    /// 共享的操作记录
    pub fn log(&self) -> MutexGuard<'_, DeviceLog> {
        lock(&self.log)
    }

    pub fn shared_log(&self) -> Arc<Mutex<DeviceLog>> {
        self.log.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Client for ScriptedClient {
    fn protocol(&self) -> &'static str {
        self.protocol
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn connect(&mut self, ip: &str, port: u16, user: &str, password: &str) -> Result<String> {
        lock(&self.log).connects.push(ConnectAttempt {
            ip: ip.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
        });

        {
            let mut failures = lock(&self.transport_failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(ClientError::Retryable("connection refused".to_string()));
            }
        }

        if !self.accepted_passwords.contains(password) {
            return Err(ClientError::WrongPassword);
        }

        lock(&self.log).connected = true;
        Ok(format!("[{}@MikroTik] > ", user))
    }

    async fn run_cmd(&mut self, body: &str, expect: Option<&Regex>) -> Result<String> {
        if !lock(&self.log).connected {
            return Err(ClientError::NotConnected);
        }
        lock(&self.log).commands.push(body.to_string());

        if let Some(delay) = self.command_delay {
            tokio::time::sleep(delay).await;
        }
        if self.stall_on.as_deref().is_some_and(|needle| body.contains(needle)) {
            std::future::pending::<()>().await;
        }

        let mut output = body.to_string();
        for (needle, response) in &self.responses {
            if body.contains(needle.as_str()) {
                output.push('\n');
                output.push_str(response);
            }
        }

        match expect {
            Some(re) if !re.is_match(&output) => Err(ClientError::Command(format!(
                "输出不匹配 `{}`: {}",
                re.as_str(),
                output
            ))),
            _ => Ok(output),
        }
    }

    async fn close(&mut self) {
        let mut log = lock(&self.log);
        log.connected = false;
        log.closes += 1;
    }

    fn copier(&mut self) -> Option<&mut dyn Copier> {
        if self.copy_supported {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl Copier for ScriptedClient {
    async fn copy_file(&mut self, source: &str, target: &str) -> Result<()> {
        if !lock(&self.log).connected {
            return Err(ClientError::NotConnected);
        }

        if remote_path(source).is_none() {
            tokio::fs::metadata(source).await?;
        }
        if remote_path(target).is_none() {
            tokio::fs::write(target, format!("copied from {}", source)).await?;
        }

        lock(&self.log)
            .copies
            .push((source.to_string(), target.to_string()));
        Ok(())
    }
}

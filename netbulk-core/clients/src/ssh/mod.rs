//! SSH 终端会话客户端
//!
//! 通过 russh 打开一个伪终端 shell，按提示符判定命令结束；
//! 文件复制走同一连接上的 SFTP 子系统。

mod output;

use async_trait::async_trait;
use regex::Regex;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::{remote_path, Client, Copier};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

pub(crate) use output::{clean_output, prompt};

/// 私钥文件名 (位于 `keys_store` 下)
pub const PRIVATE_KEY_FILE: &str = "id_rsa.key";

/// 接受任意主机密钥
struct DeviceHandler;

#[async_trait]
impl client::Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SSH 终端客户端
pub struct SshClient {
    config: ClientConfig,
    session: Option<Handle<DeviceHandler>>,
    shell: Option<Channel<Msg>>,
}

impl SshClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
            shell: None,
        }
    }

    fn load_identity(&self) -> Option<KeyPair> {
        let path = self.config.keys_store.join(PRIVATE_KEY_FILE);
        if !path.exists() {
            return None;
        }
        match russh_keys::load_secret_key(&path, None) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("无法加载私钥 {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn open_shell(&mut self) -> Result<String> {
        let handle = self.session.as_ref().ok_or(ClientError::NotConnected)?;

        let channel = handle.channel_open_session().await.map_err(session_error)?;
        channel
            .request_pty(
                false,
                "xterm",
                self.config.pty.width,
                self.config.pty.height,
                0,
                0,
                &[],
            )
            .await
            .map_err(session_error)?;
        channel.request_shell(false).await.map_err(session_error)?;
        self.shell = Some(channel);

        timeout(self.config.connect_timeout, self.read_until(None))
            .await
            .map_err(|_| ClientError::Session("等待提示符超时".to_string()))?
    }

    /// 读取输出直到匹配 `expect`，未设置时直到出现提示符
    async fn read_until(&mut self, expect: Option<&Regex>) -> Result<String> {
        let prompt = prompt()?;
        let shell = self.shell.as_mut().ok_or(ClientError::NotConnected)?;
        let mut buffer = String::new();

        loop {
            match shell.wait().await {
                Some(ChannelMsg::Data { ref data }) | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    buffer.push_str(&String::from_utf8_lossy(data));
                    let done = match expect {
                        Some(re) => re.is_match(&buffer),
                        None => prompt.is_match(&buffer),
                    };
                    if done {
                        return Ok(clean_output(&buffer, prompt));
                    }
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ClientError::Session("设备关闭了会话".to_string()));
                }
                Some(_) => {}
            }
        }
    }
}

fn session_error(e: russh::Error) -> ClientError {
    ClientError::Session(e.to_string())
}

fn copy_error(e: impl std::fmt::Display) -> ClientError {
    ClientError::Copy(e.to_string())
}

#[async_trait]
impl Client for SshClient {
    fn protocol(&self) -> &'static str {
        "ssh"
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn connect(&mut self, ip: &str, port: u16, user: &str, password: &str) -> Result<String> {
        self.close().await;

        info!("正在连接 SSH: {}@{}:{}", user, ip, port);
        let ssh_config = Arc::new(client::Config::default());
        let mut handle = timeout(
            self.config.connect_timeout,
            client::connect(ssh_config, (ip, port), DeviceHandler),
        )
        .await
        .map_err(|_| ClientError::Retryable(format!("连接 {}:{} 超时", ip, port)))?
        .map_err(|e| ClientError::Retryable(e.to_string()))?;

        // +ct: 关闭彩色输出与终端能力探测
        let login = format!("{}+ct", user);
        let mut authenticated = false;

        if let Some(key) = self.load_identity() {
            authenticated = handle
                .authenticate_publickey(&login, Arc::new(key))
                .await
                .map_err(|e| ClientError::Retryable(e.to_string()))?;
            debug!("{} 公钥认证结果: {}", ip, authenticated);
        }
        if !authenticated {
            authenticated = handle
                .authenticate_password(&login, password)
                .await
                .map_err(|e| ClientError::Retryable(e.to_string()))?;
        }
        if !authenticated {
            let _ = handle.disconnect(Disconnect::ByApplication, "", "en").await;
            return Err(ClientError::WrongPassword);
        }

        self.session = Some(handle);
        match self.open_shell().await {
            Ok(greeting) => Ok(greeting),
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    async fn run_cmd(&mut self, body: &str, expect: Option<&Regex>) -> Result<String> {
        let shell = self.shell.as_mut().ok_or(ClientError::NotConnected)?;
        let line = format!("{}\r", body);
        shell.data(line.as_bytes()).await.map_err(session_error)?;
        self.read_until(expect).await
    }

    async fn close(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            if shell.data(&b"/quit\r"[..]).await.is_ok() {
                let _ = timeout(Duration::from_secs(1), shell.wait()).await;
            }
            let _ = shell.close().await;
        }
        if let Some(handle) = self.session.take() {
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                debug!("断开 SSH 连接失败: {}", e);
            }
        }
    }

    fn copier(&mut self) -> Option<&mut dyn Copier> {
        Some(self)
    }
}

#[async_trait]
impl Copier for SshClient {
    async fn copy_file(&mut self, source: &str, target: &str) -> Result<()> {
        let handle = self.session.as_ref().ok_or(ClientError::NotConnected)?;

        let channel = handle.channel_open_session().await.map_err(copy_error)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(copy_error)?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(copy_error)?;

        let copied = transfer(&sftp, source, target).await;
        if let Err(e) = sftp.close().await {
            debug!("关闭 SFTP 会话失败: {}", e);
        }
        copied
    }
}

async fn transfer(sftp: &SftpSession, source: &str, target: &str) -> Result<()> {
    match (remote_path(source), remote_path(target)) {
        (Some(from), Some(to)) => {
            let mut reader = sftp.open(from).await.map_err(copy_error)?;
            let mut writer = sftp.create(to).await.map_err(copy_error)?;
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
        }
        (Some(from), None) => {
            let mut reader = sftp.open(from).await.map_err(copy_error)?;
            let mut writer = tokio::fs::File::create(target).await?;
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
        }
        (None, Some(to)) => {
            let mut reader = tokio::fs::File::open(source).await?;
            let mut writer = sftp.create(to).await.map_err(copy_error)?;
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
        }
        (None, None) => {
            tokio::fs::copy(source, target).await?;
        }
    }
    Ok(())
}

//! RouterOS API 客户端 (TLS)
//!
//! 每条命令按空格拆分为 API 词发送，读取应答直到 `!done` / `!fatal`。
//! 该协议没有文件复制能力。

mod codec;

pub use codec::{Sentence, SentenceCodec};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::native_tls::{self, Identity};
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// 客户端证书文件名 (位于 `keys_store` 下)
pub const CLIENT_CERT_FILE: &str = "client.crt";
pub const CLIENT_KEY_FILE: &str = "client.key";

/// 设备拒绝凭据时 `!trap` 中的提示
const INVALID_CREDENTIALS: &str = "invalid user name or password";

/// 可承载 API 会话的双向字节流
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> Transport for T {}

/// 一条应答语句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// `!re` / `!done` / `!trap` / `!fatal`
    pub kind: String,
    pub attributes: Vec<(String, String)>,
    words: Sentence,
}

impl Reply {
    pub fn parse(words: Sentence) -> Self {
        let kind = words.first().cloned().unwrap_or_default();
        let attributes = words
            .iter()
            .skip(1)
            .filter_map(|word| word.strip_prefix('='))
            .map(|attr| match attr.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (attr.to_string(), String::new()),
            })
            .collect();
        Self {
            kind,
            attributes,
            words,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_error(&self) -> bool {
        self.kind == "!trap" || self.kind == "!fatal"
    }

    fn message(&self) -> String {
        self.attribute("message")
            .map(str::to_string)
            .unwrap_or_else(|| self.words.join(" "))
    }
}

/// 把应答渲染为文本，每条语句一行
pub fn render(replies: &[Reply]) -> String {
    replies
        .iter()
        .map(|reply| reply.words.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// RouterOS API 客户端
pub struct RouterOsApiClient {
    config: ClientConfig,
    conn: Option<Framed<Box<dyn Transport>, SentenceCodec>>,
}

impl RouterOsApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, conn: None }
    }

    async fn tls_connector(&self) -> Result<tokio_native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);

        let cert_path = self.config.keys_store.join(CLIENT_CERT_FILE);
        let key_path = self.config.keys_store.join(CLIENT_KEY_FILE);
        if cert_path.exists() && key_path.exists() {
            let cert = tokio::fs::read(&cert_path).await?;
            let key = tokio::fs::read(&key_path).await?;
            let identity = Identity::from_pkcs8(&cert, &key)
                .map_err(|e| ClientError::Session(format!("客户端证书无效: {}", e)))?;
            builder.identity(identity);
        } else {
            debug!("未找到客户端证书 {}，不使用客户端认证", cert_path.display());
        }

        let connector = builder
            .build()
            .map_err(|e| ClientError::Session(format!("TLS 初始化失败: {}", e)))?;
        Ok(tokio_native_tls::TlsConnector::from(connector))
    }

    /// 在已建立的字节流上开始会话
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.conn = Some(Framed::new(transport, SentenceCodec));
    }

    /// 发送 `/login` 并解释应答
    pub async fn login(&mut self, user: &str, password: &str) -> Result<String> {
        let words = vec![
            "/login".to_string(),
            format!("=name={}", user),
            format!("=password={}", password),
        ];
        let replies = self
            .exchange(words)
            .await
            .map_err(|e| ClientError::Retryable(e.to_string()))?;

        if let Some(trap) = replies.iter().find(|reply| reply.is_error()) {
            let message = trap.message();
            self.close().await;
            if message.contains(INVALID_CREDENTIALS) {
                return Err(ClientError::WrongPassword);
            }
            return Err(ClientError::Retryable(message));
        }
        Ok(render(&replies))
    }

    /// 发送一条语句，收集应答直到 `!done` 或 `!fatal`
    async fn exchange(&mut self, words: Sentence) -> Result<Vec<Reply>> {
        let conn = self.conn.as_mut().ok_or(ClientError::NotConnected)?;
        conn.send(words).await?;

        let mut replies = Vec::new();
        while let Some(sentence) = conn.next().await {
            let reply = Reply::parse(sentence?);
            let finished = reply.kind == "!done" || reply.kind == "!fatal";
            replies.push(reply);
            if finished {
                return Ok(replies);
            }
        }
        Err(ClientError::Session("设备关闭了连接".to_string()))
    }
}

#[async_trait]
impl Client for RouterOsApiClient {
    fn protocol(&self) -> &'static str {
        "routeros-api"
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn connect(&mut self, ip: &str, port: u16, user: &str, password: &str) -> Result<String> {
        self.close().await;

        info!("正在连接 RouterOS API: {}@{}:{}", user, ip, port);
        let tcp = timeout(self.config.connect_timeout, TcpStream::connect((ip, port)))
            .await
            .map_err(|_| ClientError::Retryable(format!("连接 {}:{} 超时", ip, port)))?
            .map_err(|e| ClientError::Retryable(e.to_string()))?;

        let connector = self.tls_connector().await?;
        let tls = timeout(self.config.connect_timeout, connector.connect(ip, tcp))
            .await
            .map_err(|_| ClientError::Retryable(format!("TLS 握手 {}:{} 超时", ip, port)))?
            .map_err(|e| ClientError::Retryable(e.to_string()))?;

        self.attach(Box::new(tls));
        self.login(user, password).await
    }

    async fn run_cmd(&mut self, body: &str, expect: Option<&Regex>) -> Result<String> {
        let words: Sentence = body
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect();
        let replies = self.exchange(words).await?;

        if let Some(trap) = replies.iter().find(|reply| reply.is_error()) {
            return Err(ClientError::Command(trap.message()));
        }

        let output = format!("{}\n{}", body, render(&replies));
        if let Some(re) = expect {
            if !re.is_match(&output) {
                return Err(ClientError::Command(format!(
                    "输出不匹配 `{}`: {}",
                    re.as_str(),
                    output
                )));
            }
        }
        Ok(output)
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.send(vec!["/quit".to_string()]).await;
            if let Err(e) = conn.close().await {
                debug!("关闭 API 连接失败: {}", e);
            }
        }
    }
}

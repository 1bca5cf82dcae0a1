//! 建立连接
//!
//! 外层按重试次数循环 (第 r 次前等待 r² × 100ms)，内层依次尝试候选密码:
//! - 认证被拒绝: 尝试下一个密码
//! - 其他错误: 放弃本轮密码，进入下一次重试
//!
//! 每次重试都从第一个密码重新开始。

use netbulk_entities::{CommandResult, Host};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{ClientError, EstablishError};

/// 重试退避基数
const BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// 建立到主机的会话
///
/// 成功后 `host.password` 被改写为实际可用的密码，并返回一条合成的
/// "establish connection" 结果。失败时客户端已被关闭。
pub async fn establish_connection(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    host: &mut Host,
) -> Result<CommandResult, EstablishError> {
    let config = client.config().clone();
    host.set_defaults(config.default_port, &config.default_user, &config.default_password);
    let port = host.port.unwrap_or(config.default_port);
    let passwords = host.passwords();

    let mut last_error: Option<ClientError> = None;

    for retry in 0..config.retries {
        if retry > 0 {
            let backoff = BACKOFF_UNIT * retry * retry;
            debug!("等待 {:?} 后重试连接 {}", backoff, host);
            let interrupted = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(backoff) => false,
            };
            if interrupted {
                return Err(interrupt(client, host).await);
            }
        }

        for (index, password) in passwords.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(interrupt(client, host).await);
            }

            debug!(
                "正在连接 {}://{}@{}:{} (尝试 #{}, 密码 #{})",
                client.protocol(),
                host.user,
                host.ip,
                port,
                retry,
                index
            );

            let attempt = tokio::select! {
                _ = cancel.cancelled() => None,
                result = client.connect(&host.ip, port, &host.user, password) => Some(result),
            };
            let Some(result) = attempt else {
                return Err(interrupt(client, host).await);
            };

            match result {
                Ok(greeting) => {
                    host.password = password.clone();
                    info!("已连接 {} (尝试 #{}, 密码 #{})", host, retry, index);
                    return Ok(CommandResult::synthetic("establish connection")
                        .with_response(greeting)
                        .with_response(format!(" --> attempt #{}, password #{}", retry, index)));
                }
                Err(ClientError::WrongPassword) => {
                    debug!("{} 拒绝密码 #{}", host, index);
                    last_error = Some(ClientError::WrongPassword);
                }
                Err(e) => {
                    warn!("连接 {} 失败 (尝试 #{}): {}", host, retry, e);
                    last_error = Some(e);
                    break;
                }
            }
        }
    }

    client.close().await;
    let host = host.to_string();
    Err(match last_error {
        Some(source) => EstablishError::Failed { host, source },
        None => EstablishError::NoAttempts { host },
    })
}

async fn interrupt(client: &mut dyn Client, host: &Host) -> EstablishError {
    client.close().await;
    EstablishError::Interrupted {
        host: host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::ScriptedClient;

    fn host(passwords: &str) -> Host {
        Host::parse("10.0.0.5").unwrap().with_password(passwords)
    }

    #[tokio::test]
    async fn test_first_password_succeeds() {
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "good");
        let mut host = host("good,other");

        let result = establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap();

        assert_eq!(result.body, "/<netbulk>establish connection");
        assert_eq!(result.responses[1], " --> attempt #0, password #0");
        assert_eq!(client.log().connects.len(), 1);
        assert_eq!(client.log().connects[0].port, 22);
        assert_eq!(client.log().connects[0].user, "admin");
    }

    #[tokio::test]
    async fn test_wrong_password_advances_and_persists_working_one() {
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "third");
        let mut host = host("first, second, third, fourth");

        let result = establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap();

        assert_eq!(host.password, "third");
        assert_eq!(result.responses[1], " --> attempt #0, password #2");
        let tried: Vec<_> = client.log().connects.iter().map(|c| c.password.clone()).collect();
        assert_eq!(tried, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_bounded_by_retries_times_passwords() {
        let mut client = ScriptedClient::new(ClientConfig::ssh().retries(3), "nope");
        let mut host = host("a,b");

        let err = establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EstablishError::Failed { source: ClientError::WrongPassword, .. }
        ));
        assert!(err.to_string().contains("10.0.0.5"));
        // 每次重试都从第一个密码开始
        let tried: Vec<_> = client.log().connects.iter().map(|c| c.password.clone()).collect();
        assert_eq!(tried, vec!["a", "b", "a", "b", "a", "b"]);
        assert_eq!(client.log().closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_moves_to_next_retry() {
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "b").fail_transport(1);
        let mut host = host("a,b");

        let started = tokio::time::Instant::now();
        let result = establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap();

        // 第一次: a 传输失败 -> 放弃本轮；第二次: a 被拒，b 成功
        let tried: Vec<_> = client.log().connects.iter().map(|c| c.password.clone()).collect();
        assert_eq!(tried, vec!["a", "a", "b"]);
        assert_eq!(result.responses[1], " --> attempt #1, password #1");
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let mut client = ScriptedClient::new(ClientConfig::ssh().retries(0), "x");
        let mut host = host("x");

        let err = establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap_err();

        assert!(matches!(err, EstablishError::NoAttempts { .. }));
        assert!(client.log().connects.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_attempt() {
        let mut client = ScriptedClient::new(ClientConfig::ssh(), "x");
        let mut host = host("x");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = establish_connection(&cancel, &mut client, &mut host)
            .await
            .unwrap_err();

        assert!(matches!(err, EstablishError::Interrupted { .. }));
        assert!(client.log().connects.is_empty());
        assert_eq!(client.log().closes, 1);
    }

    #[tokio::test]
    async fn test_defaults_filled_from_config() {
        let config = ClientConfig::routeros_api().default_credentials("ops", "secret");
        let mut client = ScriptedClient::api(config, "secret");
        let mut host = Host::parse("10.0.0.9").unwrap();

        establish_connection(&CancellationToken::new(), &mut client, &mut host)
            .await
            .unwrap();

        assert_eq!(host.port, Some(8729));
        assert_eq!(host.user, "ops");
        assert_eq!(host.password, "secret");
    }
}

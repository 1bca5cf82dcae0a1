//! 修改设备用户密码 (RouterOS API)

use async_trait::async_trait;
use netbulk_clients::Client;
use netbulk_entities::{Command, Job};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{establish, execute, finish, required, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 未指定时修改的用户
const DEFAULT_USER: &str = "admin";

/// 修改密码
///
/// 参数: `new_password` (必填)，`user` (默认 `admin`)。
pub struct ChangePassword;

impl ChangePassword {
    async fn run(
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let new_password = required(&result.job, "new_password")?;
        let user = result.job.data("user").unwrap_or(DEFAULT_USER).to_string();
        let client = session(client)?;

        establish(cancel, client, result).await?;
        info!("修改 {} 的用户 {} 密码", result.job.host, user);

        let commands = vec![Command::new(format!(
            "/user/set =numbers={} =password={}",
            user, new_password
        ))
        .with_expect("!done")];
        let outcome = execute(cancel, client, &commands, result).await;
        client.close().await;
        outcome.map(|_| ())
    }
}

#[async_trait]
impl ModeHandler for ChangePassword {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        job: Job,
    ) -> JobResult {
        let mut result = JobResult::new(job);
        let outcome = Self::run(cancel, client, &mut result).await;
        finish(result, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbulk_clients::testing::ScriptedClient;
    use netbulk_clients::ClientConfig;
    use netbulk_entities::{Host, JobKind};

    fn job() -> Job {
        Job::new(
            Host::parse("10.0.0.5").unwrap().with_password("old"),
            JobKind::ChangePassword,
        )
    }

    #[tokio::test]
    async fn test_change_password() {
        let mut client = ScriptedClient::api(ClientConfig::routeros_api(), "old").respond("/user/set", "!done");
        let job = job().with_data("new_password", "secret");

        let result = ChangePassword
            .handle(&CancellationToken::new(), Some(&mut client), job)
            .await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].body, "/<netbulk>establish connection");
        assert_eq!(result.results[1].body, "/user/set =numbers=admin =password=secret");
        assert_eq!(client.log().closes, 1);
    }

    #[tokio::test]
    async fn test_missing_new_password_fails_before_connecting() {
        let mut client = ScriptedClient::api(ClientConfig::routeros_api(), "old");

        let result = ChangePassword
            .handle(&CancellationToken::new(), Some(&mut client), job())
            .await;

        assert!(matches!(result.errors[..], [ModeError::Configuration(_)]));
        assert!(result.results.is_empty());
        assert!(client.log().connects.is_empty());
    }

    #[tokio::test]
    async fn test_custom_user() {
        let mut client = ScriptedClient::api(ClientConfig::routeros_api(), "old").respond("/user/set", "!done");
        let job = job().with_data("new_password", "x").with_data("user", "ops");

        let result = ChangePassword
            .handle(&CancellationToken::new(), Some(&mut client), job)
            .await;

        assert!(result.is_success());
        assert_eq!(result.results[1].body, "/user/set =numbers=ops =password=x");
    }
}

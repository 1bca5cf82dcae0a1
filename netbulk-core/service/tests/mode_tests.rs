//! 模式处理器测试 (模拟设备)

mod common;

use common::{start_manager, StaticFetcher, CVE_URL, FEED, RELEASE_URL};
use netbulk_clients::testing::ScriptedClient;
use netbulk_clients::ClientConfig;
use netbulk_entities::{Host, Job, JobKind};
use netbulk_service::mode::{CheckVersion, InitPublicKeySsh, InitSecureApi, SecurityAudit};
use netbulk_service::{ModeError, ModeHandler};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn host() -> Host {
    Host::parse("192.168.88.1").unwrap().with_password("wrong,admin")
}

fn ssh_config() -> ClientConfig {
    ClientConfig::ssh().verify_sleep(Duration::ZERO)
}

fn keys_directory() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in ["device.crt", "device.key", "id_rsa.pub"] {
        std::fs::write(dir.path().join(file), file).unwrap();
    }
    dir
}

fn certificate_device() -> ScriptedClient {
    ScriptedClient::new(ssh_config(), "admin")
        .respond(
            "/certificate print detail",
            " 0 K  name=\"netbulkdevice.crt\" common-name=\"device\"",
        )
        .respond("file-name=netbulkdevice.crt", "certificates-imported: 1")
        .respond("file-name=netbulkdevice.key", "private-keys-imported: 1")
}

#[tokio::test]
async fn test_init_secure_api_is_repeatable() {
    common::init_tracing();
    let keys = keys_directory();
    let device = certificate_device();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let job = Job::new(host(), JobKind::InitSecureApi)
            .with_data("keys_directory", keys.path().to_string_lossy());
        let mut client = device.clone();
        let result = InitSecureApi
            .handle(&CancellationToken::new(), Some(&mut client), job)
            .await;
        assert!(result.is_success(), "{:?}", result.errors);
        // 建立连接 + 两次复制 + 六条命令
        assert_eq!(result.results.len(), 9);
        runs.push(result.results.iter().map(|r| r.body.clone()).collect::<Vec<_>>());
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(
        runs[0][3..],
        [
            "/ip service set api-ssl certificate=none",
            "/certificate print detail",
            "/certificate remove 0",
            r#"/certificate import file-name=netbulkdevice.crt passphrase="""#,
            r#"/certificate import file-name=netbulkdevice.key passphrase="""#,
            "/ip service set api-ssl disabled=no certificate=netbulkdevice.crt",
        ]
    );

    let log = device.log();
    assert_eq!(log.closes, 2);
    assert_eq!(log.copies.len(), 4);
    assert_eq!(log.copies[0].1, "sftp://netbulkdevice.crt");
    assert_eq!(log.copies[1].1, "sftp://netbulkdevice.key");
    // 第一个候选密码被拒绝，第二个成功
    assert_eq!(log.connects.len(), 4);
}

#[tokio::test]
async fn test_init_secure_api_failed_import() {
    let keys = keys_directory();
    let mut client = ScriptedClient::new(ssh_config(), "admin");
    let job = Job::new(host(), JobKind::InitSecureApi)
        .with_data("keys_directory", keys.path().to_string_lossy());

    let result = InitSecureApi
        .handle(&CancellationToken::new(), Some(&mut client), job)
        .await;

    assert!(matches!(result.errors[..], [ModeError::Execution(_)]));
    let last = result.results.last().unwrap();
    assert!(last.body.starts_with("/certificate import file-name=netbulkdevice.crt"));
    assert!(last.error.is_some());
    assert_eq!(client.log().closes, 1);
}

#[tokio::test]
async fn test_init_secure_api_missing_key_file() {
    let keys = tempfile::tempdir().unwrap();
    let mut client = ScriptedClient::new(ssh_config(), "admin");
    let job = Job::new(host(), JobKind::InitSecureApi)
        .with_data("keys_directory", keys.path().to_string_lossy());

    let result = InitSecureApi
        .handle(&CancellationToken::new(), Some(&mut client), job)
        .await;

    assert!(matches!(result.errors[..], [ModeError::Copy(_)]));
    assert!(client.log().commands.is_empty());
}

#[tokio::test]
async fn test_init_public_key_ssh() {
    let keys = keys_directory();
    let root = keys.path().parent().unwrap().to_string_lossy().to_string();
    let relative = keys.path().file_name().unwrap().to_string_lossy().to_string();
    let mut client = ScriptedClient::new(ssh_config(), "admin");
    let job = Job::new(host().with_user("ops"), JobKind::InitPublicKeySsh)
        .with_data("root_directory", root)
        .with_data("keys_directory", relative);

    let result = InitPublicKeySsh
        .handle(&CancellationToken::new(), Some(&mut client), job)
        .await;

    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(client.log().copies[0].1, "sftp://id_rsa.pub");
    assert_eq!(
        client.log().commands,
        vec!["/user ssh-keys import public-key-file=id_rsa.pub user=ops"]
    );
}

fn audited_device(version: &str) -> ScriptedClient {
    ScriptedClient::new(ClientConfig::ssh(), "admin")
        .respond(
            "/system resource print",
            &format!("             uptime: 1w2d\n            version: {} (stable)", version),
        )
        .respond(
            "/ip service print",
            " 0    telnet      23\n 1 X  ftp         21\n 2    api-ssl   8729",
        )
        .respond("/ip upnp print", "            enabled: yes")
        .respond("/ip ssh print", "      strong-crypto: no")
}

#[tokio::test]
async fn test_security_audit_reports_options_and_vulnerabilities() {
    let cancel = CancellationToken::new();
    let manager = start_manager(StaticFetcher::default().with(CVE_URL, FEED), &cancel).await;
    let mut client = audited_device("6.40.1");

    let result = SecurityAudit::new(manager)
        .handle(&cancel, Some(&mut client), Job::new(host(), JobKind::SecurityAudit))
        .await;

    assert_eq!(result.results.len(), 17);
    assert_eq!(client.log().commands.len(), 16);
    assert_eq!(result.errors.len(), 2, "{:?}", result.errors);

    match &result.errors[0] {
        ModeError::UnsafeOptions(findings) => assert_eq!(
            findings,
            &vec![
                "enabled services [telnet, api-ssl]".to_string(),
                "enabled upnp server".to_string(),
                "not enabled SSH strong-crypto".to_string(),
            ]
        ),
        other => panic!("unexpected error: {:?}", other),
    }
    match &result.errors[1] {
        ModeError::Vulnerabilities(report) => assert_eq!(report.ids(), vec!["CVE-2018-14847"]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(result.errors[0].to_string().starts_with("unsecure options found: "));
    cancel.cancel();
}

#[tokio::test]
async fn test_security_audit_clean_device() {
    let cancel = CancellationToken::new();
    let manager = start_manager(StaticFetcher::default().with(CVE_URL, FEED), &cancel).await;
    let mut client = ScriptedClient::new(ClientConfig::ssh(), "admin")
        .respond("/system resource print", "            version: 7.12");

    let result = SecurityAudit::new(manager)
        .handle(&cancel, Some(&mut client), Job::new(host(), JobKind::SecurityAudit))
        .await;

    assert!(result.is_success(), "{:?}", result.errors);
    cancel.cancel();
}

#[tokio::test]
async fn test_security_audit_feed_unavailable() {
    let cancel = CancellationToken::new();
    let manager = start_manager(StaticFetcher::default(), &cancel).await;
    let mut client = ScriptedClient::new(ClientConfig::ssh(), "admin")
        .respond("/system resource print", "            version: 7.12");

    let result = SecurityAudit::new(manager)
        .handle(&cancel, Some(&mut client), Job::new(host(), JobKind::SecurityAudit))
        .await;

    assert!(matches!(result.errors[..], [ModeError::VulnerabilityCheck(_)]));
    cancel.cancel();
}

#[tokio::test]
async fn test_security_audit_without_version() {
    let cancel = CancellationToken::new();
    let manager = start_manager(StaticFetcher::default(), &cancel).await;
    let mut client = ScriptedClient::new(ClientConfig::ssh(), "admin");

    let result = SecurityAudit::new(manager)
        .handle(&cancel, Some(&mut client), Job::new(host(), JobKind::SecurityAudit))
        .await;

    assert!(matches!(result.errors[..], [ModeError::VersionNotRecognized]));
    cancel.cancel();
}

#[tokio::test]
async fn test_check_version_warns_about_new_release() {
    let cancel = CancellationToken::new();
    let fetcher = StaticFetcher::default().with(
        RELEASE_URL,
        r#"{"tag_name": "v9.1.0", "html_url": "https://example.org/releases/v9.1.0"}"#,
    );
    let manager = start_manager(fetcher, &cancel).await;

    let result = CheckVersion::new(manager, "0.1.0")
        .handle(&cancel, None, Job::new(Host::default(), JobKind::CheckVersion))
        .await;

    assert!(result.is_success());
    assert!(matches!(
        &result.errors[..],
        [ModeError::NewVersionAvailable { version, .. }] if version == "9.1.0"
    ));
    cancel.cancel();
}

#[tokio::test]
async fn test_check_version_ignores_draft_release() {
    let cancel = CancellationToken::new();
    let fetcher = StaticFetcher::default().with(
        RELEASE_URL,
        r#"{"name": "9.2.0", "tag_name": "v9.2.0", "html_url": "https://example.org/releases/v9.2.0", "draft": true}"#,
    );
    let manager = start_manager(fetcher, &cancel).await;

    let result = CheckVersion::new(manager, "0.1.0")
        .handle(&cancel, None, Job::new(Host::default(), JobKind::CheckVersion))
        .await;

    assert!(result.errors.is_empty());
    assert!(result.results.is_empty());
    cancel.cancel();
}

#[tokio::test]
async fn test_check_version_ignores_fetch_errors() {
    let cancel = CancellationToken::new();
    let manager = start_manager(StaticFetcher::default(), &cancel).await;

    let result = CheckVersion::new(manager, "0.1.0")
        .handle(&cancel, None, Job::new(Host::default(), JobKind::CheckVersion))
        .await;

    assert!(result.errors.is_empty());
    assert!(result.results.is_empty());
    cancel.cancel();
}

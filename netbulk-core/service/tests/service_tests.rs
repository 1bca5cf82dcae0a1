//! 任务服务端到端测试

mod common;

use common::{manager_config, StaticFetcher};
use netbulk_clients::testing::ScriptedClient;
use netbulk_clients::{Client, ClientConfig, ClientsConfig};
use netbulk_entities::{Command, Host, Job, JobKind, JobTemplate, StaticHostsLoader};
use netbulk_kvdb::SqliteKv;
use netbulk_service::mode::{ChangePassword, Custom};
use netbulk_service::{ModeEntry, ModeError, ModeRegistry, Service, ServiceConfig, ServiceError};
use netbulk_vulnerabilities::VulnerabilityManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scripted(client: ScriptedClient) -> netbulk_service::mode::ClientFactory {
    Arc::new(move |_: &ClientsConfig| Box::new(client.clone()) as Box<dyn Client>)
}

async fn service(registry: impl FnOnce(&mut ModeRegistry), workers: usize) -> (Service, netbulk_service::ServiceHandle) {
    let kv = Arc::new(SqliteKv::in_memory().await.unwrap());
    let (manager, listener) =
        VulnerabilityManager::new(manager_config(), kv, Arc::new(StaticFetcher::default()));
    let mut modes = ModeRegistry::new();
    registry(&mut modes);
    let config = ServiceConfig::default().workers(workers);
    Service::with_registry(config, modes, manager, listener)
}

#[tokio::test]
async fn test_change_password_end_to_end() {
    common::init_tracing();
    let device = ScriptedClient::api(ClientConfig::routeros_api(), "old").respond("/user/set", "!done");
    let (service, handle) = service(
        |modes| {
            modes.register(
                JobKind::ChangePassword,
                ModeEntry::new(scripted(device.clone()), ChangePassword),
            );
        },
        2,
    )
    .await;
    let cancel = CancellationToken::new();
    let running = tokio::spawn(service.listen(cancel.clone()));

    let job = Job::new(Host::parse("10.0.0.5").unwrap().with_password("old"), JobKind::ChangePassword)
        .with_data("new_password", "secret");
    let result = handle.submit(job).await.unwrap().await.unwrap();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.results[0].body, "/<netbulk>establish connection");
    assert_eq!(result.results[1].body, "/user/set =numbers=admin =password=secret");
    assert_eq!(result.job.host.password, "old");
    assert_eq!(result.job.host.port, Some(8729));

    handle.close();
    running.await.unwrap();
}

#[tokio::test]
async fn test_same_host_jobs_run_in_submission_order() {
    let device = ScriptedClient::new(ClientConfig::ssh(), "pw").command_delay(Duration::from_millis(5));
    let (service, handle) = service(
        |modes| {
            modes.register(JobKind::CustomSsh, ModeEntry::new(scripted(device.clone()), Custom));
        },
        4,
    )
    .await;
    let running = tokio::spawn(service.listen(CancellationToken::new()));

    let mut receivers = Vec::new();
    for i in 0..5 {
        let job = Job::new(Host::parse("10.0.0.1").unwrap().with_password("pw"), JobKind::CustomSsh)
            .with_commands(vec![Command::new(format!("/log info job-{}", i))]);
        receivers.push(handle.submit(job).await.unwrap());
    }
    for rx in receivers {
        assert!(rx.await.unwrap().is_success());
    }

    let expected: Vec<String> = (0..5).map(|i| format!("/log info job-{}", i)).collect();
    assert_eq!(device.log().commands, expected);

    handle.close();
    running.await.unwrap();
}

#[tokio::test]
async fn test_unknown_kind_never_builds_a_client() {
    let device = ScriptedClient::new(ClientConfig::ssh(), "pw");
    let (service, handle) = service(
        |modes| {
            modes.register(JobKind::CustomSsh, ModeEntry::new(scripted(device.clone()), Custom));
        },
        1,
    )
    .await;
    let running = tokio::spawn(service.listen(CancellationToken::new()));

    let job = Job::new(Host::parse("10.0.0.1").unwrap(), JobKind::SystemBackup);
    let result = handle.submit(job).await.unwrap().await.unwrap();

    assert!(matches!(
        &result.errors[..],
        [ModeError::UnexpectedJob(kind)] if kind == "SystemBackup"
    ));
    assert!(device.log().connects.is_empty());

    handle.close();
    running.await.unwrap();
}

#[tokio::test]
async fn test_load_submits_every_host() {
    // 模拟设备的连接状态是共享的，用单个工作者避免并发会话
    let device = ScriptedClient::new(ClientConfig::ssh(), "pw");
    let (service, handle) = service(
        |modes| {
            modes.register(JobKind::CustomSsh, ModeEntry::new(scripted(device.clone()), Custom));
        },
        1,
    )
    .await;
    let cancel = CancellationToken::new();
    let running = tokio::spawn(service.listen(cancel.clone()));

    let hosts = vec![
        Host::parse("10.0.0.1").unwrap().with_password("pw"),
        Host::parse("10.0.0.2").unwrap().with_password("pw"),
        Host::parse("10.0.0.3").unwrap().with_password("bad"),
    ];
    let mut template = JobTemplate::new(JobKind::CustomSsh);
    template.commands.push(Command::new("/system identity print"));

    let receivers = handle
        .load(&cancel, &StaticHostsLoader::new(hosts), &template)
        .await
        .unwrap();
    assert_eq!(receivers.len(), 3);

    let mut failed = 0;
    for rx in receivers {
        let result = rx.await.unwrap();
        if !result.is_success() {
            assert!(matches!(result.errors[..], [ModeError::Connection(_)]));
            failed += 1;
        }
    }
    assert_eq!(failed, 1);
    assert_eq!(device.log().commands.len(), 2);

    handle.close();
    running.await.unwrap();
}

#[tokio::test]
async fn test_cancel_stops_service() {
    let device = ScriptedClient::new(ClientConfig::ssh(), "pw").stall_on("/tool sniffer");
    let (service, handle) = service(
        |modes| {
            modes.register(JobKind::CustomSsh, ModeEntry::new(scripted(device.clone()), Custom));
        },
        1,
    )
    .await;
    let cancel = CancellationToken::new();
    let running = tokio::spawn(service.listen(cancel.clone()));

    let job = Job::new(Host::parse("10.0.0.1").unwrap().with_password("pw"), JobKind::CustomSsh)
        .with_commands(vec![Command::new("/tool sniffer quick")]);
    let rx = handle.submit(job).await.unwrap();
    let queued = Job::new(Host::parse("10.0.0.1").unwrap().with_password("pw"), JobKind::CustomSsh)
        .with_commands(vec![Command::new("/system identity print")]);
    let queued_rx = handle.submit(queued).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    running.await.unwrap();

    // 进行中的任务仍然得到结果，错误为被中断
    let result = rx.await.unwrap();
    assert!(matches!(result.errors[..], [ModeError::Execution(_)]));
    assert!(!device.log().is_connected());

    // 排队的任务以取消作答，不会连接设备
    let result = queued_rx.await.unwrap();
    assert!(matches!(result.errors[..], [ModeError::Cancelled]));
    assert_eq!(device.log().commands, vec!["/tool sniffer quick"]);

    let job = Job::new(Host::parse("10.0.0.1").unwrap(), JobKind::CustomSsh);
    assert!(matches!(handle.submit(job).await, Err(ServiceError::Stopped)));
}

#[tokio::test]
async fn test_version_check_can_be_skipped() {
    let kv = Arc::new(SqliteKv::in_memory().await.unwrap());
    let mut config = ServiceConfig::default();
    config.skip_version_check = true;
    let (_service, handle) = Service::new(config, kv, Arc::new(StaticFetcher::default()));

    assert!(handle.check_version().await.unwrap().is_none());
}

#[tokio::test]
async fn test_default_port_shares_affinity_with_explicit_port() {
    let device = ScriptedClient::new(ClientConfig::ssh(), "pw").command_delay(Duration::from_millis(5));
    let (service, handle) = service(
        |modes| {
            modes.register(JobKind::CustomSsh, ModeEntry::new(scripted(device.clone()), Custom));
        },
        2,
    )
    .await;
    let running = tokio::spawn(service.listen(CancellationToken::new()));

    let mut receivers = Vec::new();
    for i in 0..4 {
        let address = if i % 2 == 0 { "10.0.0.1" } else { "10.0.0.1:22" };
        let job = Job::new(Host::parse(address).unwrap().with_password("pw"), JobKind::CustomSsh)
            .with_commands(vec![
                Command::new(format!("/log info job-{}-a", i)),
                Command::new(format!("/log info job-{}-b", i)),
            ]);
        receivers.push(handle.submit(job).await.unwrap());
    }

    // 同一设备的会话不会重叠，否则先关闭的会话会让另一个的命令失败
    for rx in receivers {
        let result = rx.await.unwrap();
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.job.host.port, Some(22));
    }
    let expected: Vec<String> = (0..4)
        .flat_map(|i| [format!("/log info job-{}-a", i), format!("/log info job-{}-b", i)])
        .collect();
    assert_eq!(device.log().commands, expected);

    handle.close();
    running.await.unwrap();
}

#[tokio::test]
async fn test_from_config_opens_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::default();
    config.skip_version_check = true;
    config.kv_store = dir.path().join("cache").join("vulnerabilities.db").display().to_string();

    let (_service, handle) = Service::from_config(config).await.unwrap();
    assert!(handle.check_version().await.unwrap().is_none());
    assert!(dir.path().join("cache").join("vulnerabilities.db").exists());
}

#[tokio::test]
async fn test_from_config_reports_errors() {
    let invalid = ServiceConfig::default().workers(0);
    assert!(matches!(
        Service::from_config(invalid).await,
        Err(ServiceError::Config(_))
    ));

    // 父路径是普通文件，无法创建存储目录
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut config = ServiceConfig::default();
    config.kv_store = file.path().join("vulnerabilities.db").display().to_string();
    assert!(matches!(
        Service::from_config(config).await,
        Err(ServiceError::Store(_))
    ));
}

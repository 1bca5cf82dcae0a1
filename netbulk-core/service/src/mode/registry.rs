//! 任务类型注册表

use netbulk_clients::{Client, ClientsConfig, RouterOsApiClient, SshClient};
use netbulk_entities::JobKind;
use netbulk_vulnerabilities::VulnerabilityManager;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ChangePassword, CheckVersion, Custom, InitPublicKeySsh, InitSecureApi, ModeHandler,
    SecurityAudit, Sftp, SystemBackup,
};

/// 按配置构造一个新的设备会话
pub type ClientFactory = Arc<dyn Fn(&ClientsConfig) -> Box<dyn Client> + Send + Sync>;

/// SSH 终端会话
pub fn ssh_client() -> ClientFactory {
    Arc::new(|config: &ClientsConfig| Box::new(SshClient::new(config.ssh.clone())) as Box<dyn Client>)
}

/// RouterOS API 会话
pub fn api_client() -> ClientFactory {
    Arc::new(|config: &ClientsConfig| {
        Box::new(RouterOsApiClient::new(config.routeros_api.clone())) as Box<dyn Client>
    })
}

/// 一种任务类型的客户端与处理器
#[derive(Clone)]
pub struct ModeEntry {
    /// 为 `None` 时处理器不需要设备会话
    pub client: Option<ClientFactory>,
    pub handler: Arc<dyn ModeHandler>,
}

impl ModeEntry {
    pub fn new(client: ClientFactory, handler: impl ModeHandler + 'static) -> Self {
        Self {
            client: Some(client),
            handler: Arc::new(handler),
        }
    }

    /// 不需要设备会话的处理器
    pub fn without_client(handler: impl ModeHandler + 'static) -> Self {
        Self {
            client: None,
            handler: Arc::new(handler),
        }
    }
}

/// 任务类型 -> (客户端, 处理器)
#[derive(Clone, Default)]
pub struct ModeRegistry {
    entries: HashMap<JobKind, ModeEntry>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置任务类型
    pub fn standard(manager: VulnerabilityManager, version: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry
            .register(JobKind::ChangePassword, ModeEntry::new(api_client(), ChangePassword))
            .register(JobKind::InitSecureApi, ModeEntry::new(ssh_client(), InitSecureApi))
            .register(JobKind::InitPublicKeySsh, ModeEntry::new(ssh_client(), InitPublicKeySsh))
            .register(JobKind::CustomSsh, ModeEntry::new(ssh_client(), Custom))
            .register(JobKind::CustomApi, ModeEntry::new(api_client(), Custom))
            .register(JobKind::Sftp, ModeEntry::new(ssh_client(), Sftp))
            .register(JobKind::SystemBackup, ModeEntry::new(ssh_client(), SystemBackup))
            .register(
                JobKind::SecurityAudit,
                ModeEntry::new(ssh_client(), SecurityAudit::new(manager.clone())),
            )
            .register(
                JobKind::CheckVersion,
                ModeEntry::without_client(CheckVersion::new(manager, version)),
            );
        registry
    }

    /// 注册或替换任务类型
    pub fn register(&mut self, kind: JobKind, entry: ModeEntry) -> &mut Self {
        self.entries.insert(kind, entry);
        self
    }

    pub fn get(&self, kind: &JobKind) -> Option<&ModeEntry> {
        self.entries.get(kind)
    }

    /// 任务类型所用客户端的默认端口；不需要设备会话的类型返回 `None`
    pub fn default_port(&self, kind: &JobKind, clients: &ClientsConfig) -> Option<u16> {
        let factory = self.get(kind)?.client.as_ref()?;
        Some(factory(clients).config().default_port)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &JobKind> {
        self.entries.keys()
    }
}

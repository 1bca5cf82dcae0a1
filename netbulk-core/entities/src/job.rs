//! 任务定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::command::Command;
use crate::host::Host;

/// 任务类型
///
/// 未识别的名称保存在 [`JobKind::Unknown`] 中，由 Worker 返回 "unexpected job" 结果。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    ChangePassword,
    InitSecureApi,
    InitPublicKeySsh,
    CustomSsh,
    CustomApi,
    Sftp,
    SystemBackup,
    SecurityAudit,
    CheckVersion,
    Unknown(String),
}

impl JobKind {
    /// 全部已知类型
    pub const KNOWN: [JobKind; 9] = [
        JobKind::ChangePassword,
        JobKind::InitSecureApi,
        JobKind::InitPublicKeySsh,
        JobKind::CustomSsh,
        JobKind::CustomApi,
        JobKind::Sftp,
        JobKind::SystemBackup,
        JobKind::SecurityAudit,
        JobKind::CheckVersion,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobKind::ChangePassword => "ChangePassword",
            JobKind::InitSecureApi => "InitSecureAPI",
            JobKind::InitPublicKeySsh => "InitPublicKeySSH",
            JobKind::CustomSsh => "CustomSSH",
            JobKind::CustomApi => "CustomAPI",
            JobKind::Sftp => "SFTP",
            JobKind::SystemBackup => "SystemBackup",
            JobKind::SecurityAudit => "SecurityAudit",
            JobKind::CheckVersion => "CheckMTbulkVersion",
            JobKind::Unknown(name) => name,
        }
    }
}

impl FromStr for JobKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = JobKind::KNOWN
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .cloned()
            .unwrap_or_else(|| JobKind::Unknown(s.to_string()));
        Ok(kind)
    }
}

impl From<String> for JobKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作单元: 一个主机上的一次操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub host: Host,
    pub kind: JobKind,
    /// 自定义命令 (CustomSSH / CustomAPI 使用)
    #[serde(default)]
    pub commands: Vec<Command>,
    /// 处理器参数
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl Job {
    pub fn new(host: Host, kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
            kind,
            commands: Vec::new(),
            data: HashMap::new(),
        }
    }

    pub fn with_commands(mut self, commands: Vec<Command>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// 读取非空的处理器参数
    pub fn data(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// 任务模板，由加载器对每个主机实例化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub kind: JobKind,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl JobTemplate {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            commands: Vec::new(),
            data: HashMap::new(),
        }
    }

    /// 为指定主机生成任务
    pub fn instantiate(&self, host: Host) -> Job {
        Job {
            id: Uuid::new_v4(),
            host,
            kind: self.kind.clone(),
            commands: self.commands.clone(),
            data: self.data.clone(),
        }
    }
}

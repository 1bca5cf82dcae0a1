//! 安全审计 (SSH)

use async_trait::async_trait;
use netbulk_clients::{CaptureTable, Client};
use netbulk_entities::{Command, Job};
use netbulk_vulnerabilities::VulnerabilityManager;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{establish, execute, session, ModeHandler};
use crate::error::ModeError;
use crate::result::JobResult;

/// 只读诊断命令: (命令, 捕获前缀, 捕获正则)
const AUDIT_COMMANDS: [(&str, &str, &[&str]); 16] = [
    ("/system resource print", "v", &[r"(?m)\s+version:\s+([\d\.]+)"]),
    (
        "/ip service print",
        "service",
        &[
            r"(?m)\d+\s+(telnet)\s",
            r"(?m)\d+\s+(ftp)\s",
            r"(?m)\d+\s+(www)\s",
            r"(?m)\d+\s+(api)\s",
            r"(?m)\d+\s+(api-ssl)\s",
        ],
    ),
    ("/tool mac-server print", "mac-server", &[r"(?m)\s+(allowed-interface-list:\s+[^n][^o][^n][^e])"]),
    ("/tool mac-server mac-winbox print", "mac-winbox", &[r"(?m)\s+(allowed-interface-list:\s+[^n][^o][^n][^e])"]),
    ("/tool mac-server ping print", "mac-ping", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/ip neighbor discovery-settings print", "neighbor", &[r"(?m)\s+(discover-interface-list:\s+[^n][^o][^n][^e])"]),
    ("/tool bandwidth-server print", "bandwidth-server", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/ip dns print", "dns", &[r"(?m)\s+(allow-remote-requests:\s+yes)"]),
    ("/ip proxy print", "proxy", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/ip socks print", "socks", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/ip upnp print", "upnp", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/tool romon print", "romon", &[r"(?m)\s+(enabled:\s+yes)"]),
    ("/user print", "admin-full", &[r"(?m)\s+(\d+\s+(?:;;; system default user)?\s+admin\s+full)"]),
    (
        "/snmp community print where name=public",
        "snmp",
        &[r"(?m)\s+(public\s+::/0)|(public\s+([\d\./:]+)\s+none)"],
    ),
    ("/ip ssh print", "ssh", &[r"(?m)\s+(strong-crypto:\s+no)"]),
    ("/ip settings print", "rp-filter", &[r"(?m)\s+(rp-filter:\s+no)"]),
];

/// 单项规则: 对应前缀有任何捕获即为一项发现
const SINGLE_RULES: [(&str, &str); 14] = [
    ("mac-server", "enabled mac-server"),
    ("mac-winbox", "enabled mac-winbox"),
    ("mac-ping", "enabled ping by mac"),
    ("neighbor", "enabled neighbor discovery"),
    ("bandwidth-server", "enabled bandwidth server"),
    ("dns", "DNS server allows remote requests"),
    ("proxy", "enabled proxy server"),
    ("socks", "enabled socks server"),
    ("upnp", "enabled upnp server"),
    ("romon", "enabled RoMON agent"),
    ("rp-filter", "Reverse Path Filtering not enabled"),
    ("snmp", "SNMP publicly available"),
    ("ssh", "not enabled SSH strong-crypto"),
    ("admin-full", "enabled admin user without allowed IP restriction with full grants"),
];

/// 安全审计
///
/// 执行固定的只读命令，按规则汇总不安全选项，并用设备版本查询漏洞。
/// 不安全选项与漏洞是两个相互独立的错误，可以同时出现。
pub struct SecurityAudit {
    manager: VulnerabilityManager,
}

impl SecurityAudit {
    pub fn new(manager: VulnerabilityManager) -> Self {
        Self { manager }
    }

    fn commands() -> Vec<Command> {
        AUDIT_COMMANDS
            .iter()
            .map(|(body, prefix, patterns)| {
                let mut command = Command::new(*body).with_match(*prefix, patterns[0]);
                for pattern in &patterns[1..] {
                    command = command.with_matches(*pattern);
                }
                command
            })
            .collect()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        result: &mut JobResult,
    ) -> Result<(), ModeError> {
        let client = session(client)?;
        establish(cancel, client, result).await?;
        info!("审计 {}", result.job.host);

        let outcome = execute(cancel, client, &Self::commands(), result).await;
        client.close().await;
        let captures = outcome?;

        let findings = evaluate(&captures);
        if !findings.is_empty() {
            result.error(ModeError::UnsafeOptions(findings));
        }

        let Some(version) = captures.get(&CaptureTable::key("v", 1)) else {
            result.error(ModeError::VersionNotRecognized);
            return Ok(());
        };
        match self.manager.check(version).await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => result.error(ModeError::Vulnerabilities(report)),
            Err(e) => {
                warn!("{} 漏洞检查失败: {}", result.job.host, e);
                result.error(ModeError::VulnerabilityCheck(e));
            }
        }
        Ok(())
    }
}

/// 按规则汇总不安全选项
fn evaluate(captures: &CaptureTable) -> Vec<String> {
    let mut findings = Vec::new();

    let services = captures.values_matching("service");
    if !services.is_empty() {
        findings.push(format!("enabled services [{}]", services.join(", ")));
    }

    for (prefix, finding) in SINGLE_RULES {
        if !captures.values_matching(prefix).is_empty() {
            findings.push(finding.to_string());
        }
    }
    findings
}

#[async_trait]
impl ModeHandler for SecurityAudit {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        client: Option<&mut dyn Client>,
        job: Job,
    ) -> JobResult {
        let mut result = JobResult::new(job);
        if let Err(e) = self.run(cancel, client, &mut result).await {
            result.error(e);
        }
        result
    }
}

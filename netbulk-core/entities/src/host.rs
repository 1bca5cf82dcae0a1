//! 目标设备定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::HostError;

/// 目标设备
///
/// `password` 是以逗号分隔的候选密码列表，建立连接时依次尝试，
/// 成功后会被改写为实际可用的那个密码。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// 来源中的序号
    #[serde(default)]
    pub id: u64,
    /// 已解析的 IP 地址 (CIDR 输入保留网络地址部分)
    pub ip: String,
    /// 端口，为空时在连接时使用客户端默认端口
    #[serde(default)]
    pub port: Option<u16>,
    /// 登录用户
    #[serde(default)]
    pub user: String,
    /// 候选密码列表 (逗号分隔)
    #[serde(default)]
    pub password: String,
}

/// 主机亲和键，用于把同一设备的任务固定到同一个 Worker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    ip: String,
    port: Option<u16>,
}

impl Host {
    /// 解析主机描述
    ///
    /// 支持的格式: `IP`、`IP:PORT`、`[IPv6]:PORT`、`NAME`、`NAME:PORT`、`CIDR`。
    /// 域名会立即解析，取第一个地址。
    pub fn parse(input: &str) -> Result<Self, HostError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(HostError::InvalidFormat(input.to_string()));
        }

        if let Ok(ip) = input.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip, None));
        }
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self::from_ip(addr.ip(), Some(addr.port())));
        }
        if let Some(ip) = parse_cidr(input)? {
            return Ok(Self::from_ip(ip, None));
        }

        let (name, port) = match input.rsplit_once(':') {
            Some((name, port)) => {
                if name.contains(':') {
                    return Err(HostError::InvalidFormat(input.to_string()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| HostError::InvalidPort(port.to_string()))?;
                (name, Some(port))
            }
            None => (input, None),
        };

        if let Ok(ip) = name.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip, port));
        }
        if let Some(ip) = parse_cidr(name)? {
            return Ok(Self::from_ip(ip, port));
        }

        Ok(Self::from_ip(resolve(name)?, port))
    }

    fn from_ip(ip: IpAddr, port: Option<u16>) -> Self {
        Self {
            ip: ip.to_string(),
            port,
            ..Default::default()
        }
    }

    /// 设置序号
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// 设置用户
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// 设置候选密码 (逗号分隔)
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// 设置端口
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// 拆分候选密码，保留顺序
    ///
    /// 空密码也是一个候选项。
    pub fn passwords(&self) -> Vec<String> {
        self.password
            .split(',')
            .map(|p| p.trim().to_string())
            .collect()
    }

    /// 用客户端默认值填充空字段
    pub fn set_defaults(&mut self, port: u16, user: &str, password: &str) {
        self.default_port(port);
        if self.user.is_empty() {
            self.user = user.to_string();
        }
        if self.password.is_empty() {
            self.password = password.to_string();
        }
    }

    /// 未指定端口时使用给定端口
    pub fn default_port(&mut self, port: u16) {
        if self.port.is_none() {
            self.port = Some(port);
        }
    }

    /// 亲和键；端口为空与显式的默认端口是不同的键，分派前应先填充默认端口
    pub fn key(&self) -> HostKey {
        HostKey {
            ip: self.ip.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.user.is_empty() {
            write!(f, "{}@", self.user)?;
        }
        match self.port {
            Some(port) => write!(f, "{}:{}", self.ip, port),
            None => write!(f, "{}", self.ip),
        }
    }
}

fn parse_cidr(input: &str) -> Result<Option<IpAddr>, HostError> {
    let Some((addr, mask)) = input.split_once('/') else {
        return Ok(None);
    };
    let ip = addr
        .parse::<IpAddr>()
        .map_err(|_| HostError::InvalidFormat(input.to_string()))?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    match mask.parse::<u8>() {
        Ok(bits) if bits <= max => Ok(Some(ip)),
        _ => Err(HostError::InvalidFormat(input.to_string())),
    }
}

fn resolve(name: &str) -> Result<IpAddr, HostError> {
    (name, 0u16)
        .to_socket_addrs()
        .map_err(|e| HostError::Unresolvable(format!("{}: {}", name, e)))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| HostError::Unresolvable(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passwords_split_and_trim() {
        let host = Host::default().with_password("first, second ,third");
        assert_eq!(host.passwords(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_password_is_single_candidate() {
        let host = Host::default();
        assert_eq!(host.passwords(), vec![String::new()]);
    }

    #[test]
    fn test_set_defaults_keeps_explicit_values() {
        let mut host = Host::parse("10.0.0.1:2222").unwrap().with_user("ops");
        host.set_defaults(22, "admin", "secret");

        assert_eq!(host.port, Some(2222));
        assert_eq!(host.user, "ops");
        assert_eq!(host.password, "secret");
    }

    #[test]
    fn test_display() {
        let host = Host::parse("10.0.0.1:22").unwrap().with_user("admin");
        assert_eq!(host.to_string(), "admin@10.0.0.1:22");
        assert_eq!(Host::parse("10.0.0.1").unwrap().to_string(), "10.0.0.1");
    }

    #[test]
    fn test_key_distinguishes_ports() {
        let a = Host::parse("10.0.0.1:22").unwrap();
        let b = Host::parse("10.0.0.1:2222").unwrap();
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), a.clone().with_password("x").key());
    }

    #[test]
    fn test_default_port_unifies_key() {
        let explicit = Host::parse("10.0.0.1:22").unwrap();
        let mut implicit = Host::parse("10.0.0.1").unwrap();
        assert_ne!(explicit.key(), implicit.key());

        implicit.default_port(22);
        assert_eq!(explicit.key(), implicit.key());

        let mut other = Host::parse("10.0.0.1:2222").unwrap();
        other.default_port(22);
        assert_eq!(other.port, Some(2222));
    }
}

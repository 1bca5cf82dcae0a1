//! CVE 记录、数据源格式与版本号归一化

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, VulnerabilityError};

/// 受影响配置中的 RouterOS 版本
const CPE_PATTERN: &str = r":mi[ck]rotik:routeros:([\d\.]+):?";

/// 缓存中的 CVE 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cve {
    pub id: String,
    #[serde(default)]
    pub cvss: Option<f64>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub references: Vec<String>,
}

impl fmt::Display for Cve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cvss {
            Some(cvss) => write!(f, "{} (CVSS {:.1}): {}", self.id, cvss, self.summary)?,
            None => write!(f, "{} (CVSS n/a): {}", self.id, self.summary)?,
        }
        for reference in &self.references {
            write!(f, "\n  {}", reference)?;
        }
        Ok(())
    }
}

/// 一次检查的结果；为空表示已检查且未发现漏洞
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VulnerabilityReport {
    pub cves: Vec<Cve>,
}

impl VulnerabilityReport {
    pub fn is_empty(&self) -> bool {
        self.cves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cves.len()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.cves.iter().map(|cve| cve.id.as_str()).collect()
    }
}

impl fmt::Display for VulnerabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .cves
            .iter()
            .map(|cve| match cve.cvss {
                Some(cvss) => format!("{} ({:.1})", cve.id, cvss),
                None => cve.id.clone(),
            })
            .collect();
        write!(f, "vulnerabilities found: {}", items.join(", "))
    }
}

/// 数据源中的配置项，可能是字符串或对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Configuration {
    Id(String),
    Object { id: String },
}

impl Configuration {
    fn cpe(&self) -> &str {
        match self {
            Configuration::Id(id) | Configuration::Object { id } => id,
        }
    }
}

/// 数据源中的 CVE 记录
#[derive(Debug, Deserialize)]
struct FeedRecord {
    id: String,
    #[serde(default)]
    cvss: Option<f64>,
    #[serde(default, rename = "Modified")]
    modified: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    vulnerable_configuration: Vec<Configuration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Feed {
    Wrapped { data: Vec<FeedRecord> },
    Bare(Vec<FeedRecord>),
}

/// 解析后的数据源: CVE 记录与 版本 -> CVE 编号 倒排索引
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub cves: Vec<Cve>,
    pub index: BTreeMap<i64, Vec<String>>,
}

/// 解析数据源，支持 `{"data": [...]}` 与裸数组两种格式
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let records = match serde_json::from_slice::<Feed>(bytes)? {
        Feed::Wrapped { data } => data,
        Feed::Bare(records) => records,
    };
    let cpe = Regex::new(CPE_PATTERN).map_err(|e| VulnerabilityError::Parse(e.to_string()))?;

    let mut parsed = ParsedFeed::default();
    for record in records {
        for configuration in &record.vulnerable_configuration {
            let Some(version) = cpe
                .captures(configuration.cpe())
                .and_then(|caps| caps.get(1))
                .and_then(|m| normalize_version(m.as_str()))
            else {
                continue;
            };
            let ids = parsed.index.entry(version).or_default();
            if !ids.contains(&record.id) {
                ids.push(record.id.clone());
            }
        }

        parsed.cves.push(Cve {
            id: record.id,
            cvss: record.cvss,
            modified: record.modified,
            summary: record.summary,
            references: record.references,
        });
    }
    Ok(parsed)
}

/// 把 RouterOS 版本号归一化为整数，每个次级段占两位
///
/// `5.15` -> 51500，`6.48.1` -> 64801，`7` -> 70000。数值溢出时视为无法识别。
pub fn normalize_version(version: &str) -> Option<i64> {
    let mut segments = version.trim().split('.');
    let mut normalized = 0i64;
    let mut weight = 10_000i64;

    for step in 0..3 {
        let segment = match segments.next() {
            Some(segment) => segment,
            None => break,
        };
        let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            if step == 0 {
                return None;
            }
            break;
        }
        let value = digits.parse::<i64>().ok()?.checked_mul(weight)?;
        normalized = normalized.checked_add(value)?;
        weight /= 100;
        if digits.len() != segment.len() {
            break;
        }
    }
    Some(normalized)
}

/// 最新发布版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// 不带 `v` 前缀的版本号
    pub version: String,
    #[serde(default)]
    pub url: String,
    /// 草稿版本不对外提示
    #[serde(default)]
    pub draft: bool,
    /// 查询时间
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    draft: bool,
}

/// 解析发布信息，版本号取发布名称，名称为空时取标签
pub fn parse_release(bytes: &[u8], checked_at: DateTime<Utc>) -> Result<Release> {
    let release: GithubRelease = serde_json::from_slice(bytes)?;
    let version = match release.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => release.tag_name,
    };
    if version.is_empty() {
        return Err(VulnerabilityError::Parse("发布信息缺少版本号".to_string()));
    }
    Ok(Release {
        version: version.trim_start_matches('v').to_string(),
        url: release.html_url,
        draft: release.draft,
        checked_at,
    })
}

/// 数据源各集合的最近更新时间
///
/// 镜像提供 `{"cves": {"last_update": "..."}, ...}` 形式的信息，
/// 用于判断本地缓存是否已经是最新。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInfo {
    pub collections: BTreeMap<String, DateTime<Utc>>,
}

impl DbInfo {
    /// 远端有任一集合比本地新 (或本地没有记录)
    pub fn is_before(&self, remote: &DbInfo) -> bool {
        remote.collections.iter().any(|(name, updated)| {
            self.collections
                .get(name)
                .map_or(true, |local| local < updated)
        })
    }
}

#[derive(Debug, Deserialize)]
struct DbInfoEntry {
    #[serde(default)]
    last_update: Option<String>,
}

/// 解析数据源信息，忽略没有更新时间的集合
pub fn parse_db_info(bytes: &[u8]) -> Result<DbInfo> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(bytes)?;

    let mut info = DbInfo::default();
    for (name, value) in raw {
        let Ok(entry) = serde_json::from_value::<DbInfoEntry>(value) else {
            continue;
        };
        if let Some(updated) = entry.last_update.as_deref().and_then(parse_timestamp) {
            info.collections.insert(name, updated);
        }
    }

    if info.collections.is_empty() {
        return Err(VulnerabilityError::Parse("数据源信息中没有更新时间".to_string()));
    }
    Ok(info)
}

/// 时间戳可能不带时区，按 UTC 处理
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

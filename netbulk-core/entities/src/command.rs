//! 命令模板与执行结果

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 合成结果的命令体前缀 (建立连接、文件复制等非设备命令)
pub const SYNTHETIC_PREFIX: &str = "/<netbulk>";

/// 变量捕获记录的前缀
pub const CAPTURE_PREFIX: &str = "/<netbulk:regexp>";

/// 命令模板
///
/// `body` 中可以包含 `%{prefix<N>}` 占位符，执行前用同一任务中
/// 先前命令捕获的值替换。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// 命令体
    pub body: String,
    /// 输出匹配到该正则时视为命令完成
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    /// 捕获变量的名称前缀
    #[serde(default)]
    pub match_prefix: String,
    /// 捕获正则，每个分组生成一个 `%{match_prefix<N>}` 变量
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub r#match: Option<String>,
    /// 附加捕获正则，分组编号在 `match` 之后继续累加
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    /// 命令完成后的等待时间
    #[serde(default, with = "humantime_serde")]
    pub sleep: Duration,
}

impl Command {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// 设置完成判定正则
    pub fn with_expect(mut self, expect: impl Into<String>) -> Self {
        self.expect = Some(expect.into());
        self
    }

    /// 设置捕获前缀与捕获正则
    pub fn with_match(mut self, prefix: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.match_prefix = prefix.into();
        self.r#match = Some(pattern.into());
        self
    }

    /// 追加一个捕获正则
    pub fn with_matches(mut self, pattern: impl Into<String>) -> Self {
        self.matches.push(pattern.into());
        self
    }

    /// 设置完成后等待时间
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }
}

/// 单条命令的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// 实际发送的命令体 (占位符已替换)
    pub body: String,
    /// 按顺序记录的输出片段，包括捕获记录
    #[serde(default)]
    pub responses: Vec<String>,
    /// 执行错误
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// 创建合成结果，命令体带 [`SYNTHETIC_PREFIX`] 前缀
    pub fn synthetic(action: &str) -> Self {
        Self::new(format!("{}{}", SYNTHETIC_PREFIX, action))
    }

    /// 追加输出片段
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.responses.push(response.into());
        self
    }

    /// 记录错误
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

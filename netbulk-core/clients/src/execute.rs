//! 命令执行引擎
//!
//! 严格按顺序执行命令列表。发送前用 [`CaptureTable`] 替换 `%{prefix<N>}` 占位符，
//! 完成后把 `match` / `matches` 正则的分组写回捕获表，供后续命令使用。
//!
//! 每条命令 (发送、等待、完成后等待、捕获) 与取消信号和超时竞争，先完成者生效。
//! 任何错误都会终止后续命令，已收集的结果照常返回。

use netbulk_entities::{Command, CommandResult, CAPTURE_PREFIX};
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{ClientError, ExecuteError};

/// 捕获表
///
/// 键为完整占位符 `%{prefix<N>}`，只在一次执行内有效。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureTable {
    values: HashMap<String, String>,
}

impl CaptureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成占位符键
    pub fn key(prefix: &str, index: usize) -> String {
        format!("%{{{}{}}}", prefix, index)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 替换已知占位符，未知占位符原样保留
    ///
    /// 单遍扫描，替换进来的值不会被再次展开。
    pub fn substitute(&self, body: &str) -> String {
        let mut output = String::with_capacity(body.len());
        let mut rest = body;

        while let Some(start) = rest.find("%{") {
            output.push_str(&rest[..start]);
            let candidate = &rest[start..];
            let Some(end) = candidate.find('}') else {
                output.push_str(candidate);
                rest = "";
                break;
            };

            let placeholder = &candidate[..=end];
            match self.values.get(placeholder) {
                Some(value) => output.push_str(value),
                None => output.push_str(placeholder),
            }
            rest = &candidate[end + 1..];
        }

        output.push_str(rest);
        output
    }

    /// 指定前缀的全部捕获值，按序号排列
    pub fn values_matching(&self, prefix: &str) -> Vec<&str> {
        let pattern = format!(r"^%\{{{}(\d+)\}}$", regex::escape(prefix));
        let Ok(re) = Regex::new(&pattern) else {
            return Vec::new();
        };

        let mut values: Vec<(usize, &str)> = self
            .values
            .iter()
            .filter_map(|(key, value)| {
                let index = re.captures(key)?.get(1)?.as_str().parse().ok()?;
                Some((index, value.as_str()))
            })
            .collect();
        values.sort_by_key(|(index, _)| *index);
        values.into_iter().map(|(_, value)| value).collect()
    }
}

/// 一次执行的产出
#[derive(Debug, Default)]
pub struct Execution {
    pub results: Vec<CommandResult>,
    pub captures: CaptureTable,
    pub error: Option<ExecuteError>,
}

impl Execution {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// 编译后的命令正则
struct Patterns {
    expect: Option<Regex>,
    captures: Vec<(String, Regex)>,
}

impl Patterns {
    fn compile(command: &Command) -> Result<Self, ExecuteError> {
        let expect = command.expect.as_deref().map(compile).transpose()?;
        let captures = command
            .r#match
            .iter()
            .chain(command.matches.iter())
            .map(|pattern| Ok((pattern.clone(), compile(pattern)?)))
            .collect::<Result<Vec<_>, ExecuteError>>()?;
        Ok(Self { expect, captures })
    }

    /// 提取分组并写入捕获表，返回绑定记录
    ///
    /// 分组在全部正则间连续编号；未参与匹配的分组占用编号但不写入。
    fn bind(&self, prefix: &str, output: &str, table: &mut CaptureTable) -> Vec<String> {
        let mut records = Vec::new();
        let mut index = 0;
        for (pattern, re) in &self.captures {
            let groups = re.captures_len() - 1;
            let caps = re.captures(output);
            for group in 1..=groups {
                index += 1;
                let Some(value) = caps.as_ref().and_then(|c| c.get(group)) else {
                    continue;
                };
                let key = CaptureTable::key(prefix, index);
                records.push(format!(
                    "{} \"{}\" set key \"{}\" with value {}",
                    CAPTURE_PREFIX,
                    pattern,
                    key,
                    value.as_str()
                ));
                table.insert(key, value.as_str());
            }
        }
        records
    }
}

fn compile(pattern: &str) -> Result<Regex, ExecuteError> {
    Regex::new(pattern).map_err(|e| ExecuteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

enum Outcome {
    Done(Result<String, ClientError>),
    Timeout,
    Interrupted,
}

/// 按顺序执行命令
pub async fn execute_commands(
    cancel: &CancellationToken,
    client: &mut dyn Client,
    commands: &[Command],
) -> Execution {
    let timeout = client.config().command_timeout;
    let mut execution = Execution::default();

    for command in commands {
        let body = execution.captures.substitute(&command.body);

        let patterns = match Patterns::compile(command) {
            Ok(patterns) => patterns,
            Err(e) => {
                execution.results.push(CommandResult::new(&body).with_error(&e));
                execution.error = Some(e);
                break;
            }
        };

        debug!("发送命令: {}", body);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Interrupted,
            _ = tokio::time::sleep(timeout) => Outcome::Timeout,
            result = run_one(&mut *client, &body, patterns.expect.as_ref(), command.sleep) => Outcome::Done(result),
        };

        match outcome {
            Outcome::Done(Ok(output)) => {
                let records = patterns.bind(&command.match_prefix, &output, &mut execution.captures);
                let mut result = CommandResult::new(&body).with_response(output);
                result.responses.extend(records);
                execution.results.push(result);
            }
            Outcome::Done(Err(source)) => {
                warn!("命令执行失败 `{}`: {}", body, source);
                execution
                    .results
                    .push(CommandResult::new(&body).with_error(&source));
                execution.error = Some(ExecuteError::Client { body, source });
                break;
            }
            Outcome::Timeout => {
                warn!("命令执行超时 ({:?}): {}", timeout, body);
                execution.error = Some(ExecuteError::Timeout {
                    body,
                    after: timeout,
                });
                break;
            }
            Outcome::Interrupted => {
                execution.error = Some(ExecuteError::Interrupted { body });
                break;
            }
        }
    }

    execution
}

async fn run_one(
    client: &mut dyn Client,
    body: &str,
    expect: Option<&Regex>,
    sleep: Duration,
) -> Result<String, ClientError> {
    let output = client.run_cmd(body, expect).await?;
    if !sleep.is_zero() {
        tokio::time::sleep(sleep).await;
    }
    Ok(output)
}

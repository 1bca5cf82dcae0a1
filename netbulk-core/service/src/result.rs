//! 任务结果

use netbulk_entities::{CommandResult, Job};
use std::fmt;

use crate::error::ModeError;

/// 一个任务的完整结果
///
/// 按执行顺序记录每条命令的结果，另附下载地址与相互独立的错误列表。
#[derive(Debug)]
pub struct JobResult {
    pub job: Job,
    pub results: Vec<CommandResult>,
    pub download_urls: Vec<String>,
    pub errors: Vec<ModeError>,
}

impl JobResult {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            results: Vec::new(),
            download_urls: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// 只含一个错误的结果
    pub fn failed(job: Job, error: ModeError) -> Self {
        let mut result = Self::new(job);
        result.errors.push(error);
        result
    }

    /// 除提示外没有错误
    pub fn is_success(&self) -> bool {
        self.errors.iter().all(ModeError::is_warning)
    }

    pub fn push(&mut self, result: CommandResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = CommandResult>) {
        self.results.extend(results);
    }

    pub fn error(&mut self, error: impl Into<ModeError>) {
        self.errors.push(error.into());
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.job.host, self.job.kind)?;
        for result in &self.results {
            writeln!(f, "  > {}", result.body)?;
            for response in &result.responses {
                for line in response.lines() {
                    writeln!(f, "    {}", line)?;
                }
            }
            if let Some(error) = &result.error {
                writeln!(f, "    ! {}", error)?;
            }
        }
        for url in &self.download_urls {
            writeln!(f, "  download: {}", url)?;
        }
        for error in &self.errors {
            writeln!(f, "  error: {}", error)?;
        }
        Ok(())
    }
}

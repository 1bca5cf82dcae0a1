//! 终端输出处理

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ClientError;

/// RouterOS 提示符，例如 `[admin@MikroTik] > `
///
/// 首行可能带有 `ESC [9999B` 光标移动序列。
const PROMPT_PATTERN: &str = r##"(?sm)(\x1b)?(\x5b\x39\x39\x39\x39\x42)?\[[A-Za-z0-9!"#$%&'()*+,\-./:;<=>^_]*?@[A-Za-z0-9!"#$%&'()*+,\-./:;<=>^_]*?\] >.{0,1}$"##;

/// 行尾擦除序列 `ESC [K` 加换行
const ERASE_LINE: &str = "\x1b\x5b\x4b\x0a";

/// 编译后的提示符正则
pub(crate) fn prompt() -> Result<&'static Regex, ClientError> {
    static PROMPT: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PROMPT
        .get_or_init(|| Regex::new(PROMPT_PATTERN))
        .as_ref()
        .map_err(|e| ClientError::Session(format!("提示符正则无效: {}", e)))
}

/// 去掉回车、提示符、终端控制序列与非 ASCII 字符
pub(crate) fn clean_output(raw: &str, prompt: &Regex) -> String {
    let text = raw.replace('\r', "");
    let text = prompt.replace_all(&text, "");
    let text = text.replace(ERASE_LINE, "");
    text.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

//! RouterOS API 语句编解码
//!
//! 一条语句由若干个带长度前缀的词组成，以长度为零的词结束。
//! 长度前缀按大小占 1 到 5 个字节:
//!
//! | 长度范围              | 编码                       |
//! |-----------------------|----------------------------|
//! | `< 0x80`              | 1 字节                     |
//! | `< 0x4000`            | 2 字节，最高位 `10`        |
//! | `< 0x20_0000`         | 3 字节，最高位 `110`       |
//! | `< 0x1000_0000`       | 4 字节，最高位 `1110`      |
//! | 其他                  | `0xF0` 加 4 字节长度       |

use std::io;
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// 一条 API 语句
pub type Sentence = Vec<String>;

/// 语句编解码器
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceCodec;

fn encode_length(len: usize, dst: &mut BytesMut) -> io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "词过长"))?;

    if len < 0x80 {
        dst.put_u8(len as u8);
    } else if len < 0x4000 {
        dst.put_u16((len | 0x8000) as u16);
    } else if len < 0x20_0000 {
        let value = len | 0xC0_0000;
        dst.put_slice(&value.to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        dst.put_u32(len | 0xE000_0000);
    } else {
        dst.put_u8(0xF0);
        dst.put_u32(len);
    }
    Ok(())
}

/// 解析长度前缀，返回 (长度, 前缀字节数)
fn decode_length(src: &[u8]) -> io::Result<Option<(usize, usize)>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    let (prefix, mask) = match first {
        b if b & 0x80 == 0x00 => (1, 0x7F),
        b if b & 0xC0 == 0x80 => (2, 0x3F),
        b if b & 0xE0 == 0xC0 => (3, 0x1F),
        b if b & 0xF0 == 0xE0 => (4, 0x0F),
        0xF0 => (5, 0x00),
        b => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("无效的长度前缀 0x{:02X}", b),
            ))
        }
    };

    if src.len() < prefix {
        return Ok(None);
    }

    let mut len = (first & mask) as usize;
    for byte in &src[1..prefix] {
        len = (len << 8) | *byte as usize;
    }
    Ok(Some((len, prefix)))
}

impl Decoder for SentenceCodec {
    type Item = Sentence;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // 先确认缓冲区中有完整语句，再消费
        let mut offset = 0;
        let mut spans = Vec::new();
        loop {
            let Some((len, prefix)) = decode_length(&src[offset..])? else {
                return Ok(None);
            };
            let start = offset + prefix;
            if src.len() < start + len {
                return Ok(None);
            }
            offset = start + len;
            if len == 0 {
                break;
            }
            spans.push((start, len));
        }

        let words = spans
            .iter()
            .map(|&(start, len)| String::from_utf8_lossy(&src[start..start + len]).into_owned())
            .collect();
        src.advance(offset);
        Ok(Some(words))
    }
}

impl Encoder<Sentence> for SentenceCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Sentence, dst: &mut BytesMut) -> Result<(), Self::Error> {
        for word in item.iter().filter(|word| !word.is_empty()) {
            encode_length(word.len(), dst)?;
            dst.put_slice(word.as_bytes());
        }
        dst.put_u8(0);
        Ok(())
    }
}

//! 设备回复行解析
//!
//! 两套入口：
//!
//! - 严格解码 `decode_*`：指定地址与标签，任何偏差都是 [`ReplyError`]，
//!   用于"发命令等这一条回复"的场景；
//! - 宽松解析 [`Reply::parse`]：不认识的行返回 `None` 而不是错误，
//!   用于总线监听与运动监控（共享总线上别台设备的行只需跳过）。
//!
//! 行文本在进入本模块前已剥掉 CRLF。

use crate::{Address, ReplyError, StatusCode};

/// `GS` 状态回复标签
pub const STATUS_TAG: &str = "GS";
/// `GV` 速度回复标签
pub const VELOCITY_TAG: &str = "GV";
/// `PO` 位置回复标签
pub const POSITION_TAG: &str = "PO";

const STATUS_LEN: usize = 5;
const VELOCITY_LEN: usize = 5;
const POSITION_LEN: usize = 11;

/// 宽松解析出的回复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reply {
    Status { address: Address, code: StatusCode },
    Velocity { address: Address, percent: u8 },
    Position { address: Address, counts: i32 },
}

impl Reply {
    /// 尽力解析一行总线回复，认不出来就返回 `None`
    ///
    /// 标签或负载长度不符、十六进制坏掉、地址非法，全部静默跳过。
    /// 状态码超表**不在**此列：映射为 [`StatusCode::Unknown`]。
    pub fn parse(line: &str) -> Option<Reply> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 {
            return None;
        }
        let address = Address::new(bytes[0] as char).ok()?;
        // 地址字符必须是大写线上形式
        if !(bytes[0] as char).is_ascii_uppercase() && !(bytes[0] as char).is_ascii_digit() {
            return None;
        }
        let tag = &bytes[1..3];
        match tag {
            b"GS" if bytes.len() == STATUS_LEN => {
                let code = hex_u8(&bytes[3..5])?;
                Some(Reply::Status {
                    address,
                    code: StatusCode::from(code),
                })
            }
            b"GV" if bytes.len() == VELOCITY_LEN => {
                let percent = hex_u8(&bytes[3..5])?;
                Some(Reply::Velocity { address, percent })
            }
            b"PO" if bytes.len() == POSITION_LEN => {
                let counts = hex_i32(&bytes[3..11])?;
                Some(Reply::Position { address, counts })
            }
            _ => None,
        }
    }

    pub fn address(&self) -> Address {
        match *self {
            Reply::Status { address, .. }
            | Reply::Velocity { address, .. }
            | Reply::Position { address, .. } => address,
        }
    }
}

/// 严格解码 `XGSnn`
pub fn decode_status(line: &str, address: Address) -> Result<StatusCode, ReplyError> {
    let payload = strict_fields(line, address, STATUS_TAG, STATUS_LEN)?;
    let code = hex_u8(payload).ok_or_else(|| ReplyError::MalformedHex { line: line.into() })?;
    Ok(StatusCode::from(code))
}

/// 严格解码 `XGVnn`，返回速度百分比
pub fn decode_velocity(line: &str, address: Address) -> Result<u8, ReplyError> {
    let payload = strict_fields(line, address, VELOCITY_TAG, VELOCITY_LEN)?;
    hex_u8(payload).ok_or_else(|| ReplyError::MalformedHex { line: line.into() })
}

/// 严格解码 `XPOnnnnnnnn`，返回有符号编码器计数
pub fn decode_position(line: &str, address: Address) -> Result<i32, ReplyError> {
    let payload = strict_fields(line, address, POSITION_TAG, POSITION_LEN)?;
    hex_i32(payload).ok_or_else(|| ReplyError::MalformedHex { line: line.into() })
}

/// 公共的形状检查：长度、地址、标签，通过后返回负载字节
fn strict_fields<'a>(
    line: &'a str,
    address: Address,
    tag: &'static str,
    expected_len: usize,
) -> Result<&'a [u8], ReplyError> {
    let bytes = line.as_bytes();
    if bytes.len() < expected_len {
        return Err(ReplyError::TooShort {
            expected: expected_len,
            actual: bytes.len(),
            line: line.into(),
        });
    }
    if bytes[0] != address.to_char() as u8 {
        return Err(ReplyError::AddressMismatch {
            expected: address,
            line: line.into(),
        });
    }
    if &bytes[1..3] != tag.as_bytes() {
        return Err(ReplyError::UnexpectedTag {
            expected: tag,
            line: line.into(),
        });
    }
    Ok(&bytes[3..expected_len])
}

fn hex_u8(bytes: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(bytes).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// 8 位十六进制 → 有符号 32 位（二补码）
fn hex_i32(bytes: &[u8]) -> Option<i32> {
    let text = std::str::from_utf8(bytes).ok()?;
    u32::from_str_radix(text, 16).ok().map(|raw| raw as i32)
}

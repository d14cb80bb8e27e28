//! # Elliptec Protocol
//!
//! Thorlabs Elliptec (ELLx) 串口 ASCII 协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `address`: 总线地址（单个十六进制位）
//! - `command`: 主机命令帧构建
//! - `reply`: 设备回复行解析
//! - `status`: 设备状态码
//!
//! ## 线格式
//!
//! 命令 = 地址字符 + 两个小写助记符 + 可选大写十六进制负载，无结束符。
//! 回复 = 地址字符 + 两个大写标签 + 负载，以 CRLF 结束。
//! 总线固定 9600 波特 8N1。

pub mod address;
pub mod command;
pub mod reply;
pub mod status;

// 重新导出常用类型
pub use address::{Address, AddressRange, address_range};
pub use command::HomeDirection;
pub use reply::Reply;
pub use status::StatusCode;

use thiserror::Error;

/// 命令帧最大长度（移动命令：1 地址 + 2 助记符 + 8 位十六进制）
pub const MAX_FRAME_LEN: usize = 11;

/// 编码侧错误：主机输入在构帧前就被拒绝
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("address must be a single hex digit '0'..='F', got {found:?}")]
    InvalidAddress { found: String },

    #[error("velocity percent out of range: {percent} (expected 0..=100)")]
    PercentOutOfRange { percent: u8 },

    #[error("address range start {min} is above end {max}")]
    InvalidAddressRange { min: Address, max: Address },
}

/// 解码侧错误：收到的回复行不符合预期形状
///
/// 注意：未知的状态码**不是**解码错误，会映射为 [`StatusCode::Unknown`]。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("reply too short: expected {expected} chars, got {actual} in {line:?}")]
    TooShort {
        expected: usize,
        actual: usize,
        line: String,
    },

    #[error("reply address mismatch: expected {expected} in {line:?}")]
    AddressMismatch { expected: Address, line: String },

    #[error("unexpected reply tag: expected {expected} in {line:?}")]
    UnexpectedTag {
        expected: &'static str,
        line: String,
    },

    #[error("malformed hex field in reply {line:?}")]
    MalformedHex { line: String },
}

/// 单条主机命令帧
///
/// # 设计特性
///
/// - **Copy trait**:栈上定长缓冲，无堆分配
/// - **按构造即合法**:只能通过 [`command`] 模块的编码函数获得，
///   因此内容保证是合法 ASCII
///
/// 帧本身不携带结束符，按原样写入串口。
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    bytes: [u8; MAX_FRAME_LEN],
    len: u8,
}

impl Frame {
    /// 由编码器内部使用：`mnemonic` 必须恰好 2 字节，
    /// `payload` 必须是 ASCII 且不超过 8 字节。
    pub(crate) fn build(address: Address, mnemonic: &str, payload: &str) -> Self {
        debug_assert_eq!(mnemonic.len(), 2);
        debug_assert!(payload.len() <= MAX_FRAME_LEN - 3);

        let mut bytes = [0u8; MAX_FRAME_LEN];
        bytes[0] = address.to_char() as u8;
        bytes[1..3].copy_from_slice(mnemonic.as_bytes());
        bytes[3..3 + payload.len()].copy_from_slice(payload.as_bytes());

        Self {
            bytes,
            len: (3 + payload.len()) as u8,
        }
    }

    /// 写入串口的字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// 帧的 ASCII 文本
    pub fn as_str(&self) -> &str {
        // 构造时只写入 ASCII
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 帧的目标地址
    pub fn address(&self) -> Option<Address> {
        Address::new(self.bytes[0] as char).ok()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:?})", self.as_str())
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

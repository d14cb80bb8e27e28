//! # Elliptec Serial Link Layer
//!
//! 串口硬件抽象层，把后台读线程要用的收发两端从具体后端解耦。

use thiserror::Error;

pub mod port;

pub use port::{BAUD_RATE, SerialLink, SerialRxLink, SerialTxLink};

/// 串口链路统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    UnsupportedConfig,
    Disconnected,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NotFound
                | SerialDeviceErrorKind::AccessDenied
                | SerialDeviceErrorKind::Disconnected
        )
    }
}

/// 接收端：后台读线程独占
pub trait RxLink: Send {
    /// 读取现有字节；在配置的读超时内无数据返回 [`SerialError::Timeout`]
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;
}

/// 发送端：命令写入与驱动缓冲清理
pub trait TxLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;
    fn flush(&mut self) -> Result<(), SerialError>;
    /// 丢弃串口驱动的输入缓冲
    fn clear_input(&mut self) -> Result<(), SerialError>;
}

/// 可以拆成独立收发两端的链路
pub trait SplittableLink {
    type Rx: RxLink + 'static;
    type Tx: TxLink + 'static;

    fn split(self) -> Result<(Self::Rx, Self::Tx), SerialError>;
}

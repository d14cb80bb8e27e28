//! 驱动层统一错误类型

use std::time::Duration;

use elliptec_protocol::{Address, ReplyError, StatusCode, ValidationError};
use elliptec_serial::SerialError;
use thiserror::Error;

/// 驱动错误
///
/// 所有会话操作的失败都收敛到这一个类型。超时永远是普通的
/// [`DriverError::Timeout`]，不存在其他取消路径。
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Serial link error: {0}")]
    Serial(#[from] SerialError),

    #[error("Invalid command input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed reply: {0}")]
    Reply(#[from] ReplyError),

    #[error("Device reported fault: {}", .status.description())]
    Device { status: StatusCode },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("No device answered on the bus in range {min}..={max}")]
    NoDevice { min: Address, max: Address },

    #[error("Multiple devices answered ({found:?}); pass an explicit address")]
    AmbiguousBus { found: Vec<Address> },

    #[error("Transport already closed")]
    Closed,
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}

//! serialport 后端
//!
//! Elliptec 总线参数固定：9600 波特 8N1、无流控，不可配置。
//! 收发拆分用 `try_clone`，两个句柄指向同一个文件描述符。

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::{
    RxLink, SerialDeviceError, SerialDeviceErrorKind, SerialError, SplittableLink, TxLink,
};

/// 协议固定波特率
pub const BAUD_RATE: u32 = 9600;

/// 一条打开的 Elliptec 串口链路
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// 按协议固定参数打开串口
    ///
    /// `read_timeout` 是后台读线程单次 `read` 的阻塞上限，
    /// 决定停止标志的响应延迟。
    pub fn open(path: &str, read_timeout: Duration) -> Result<Self, SerialError> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(device_error)?;
        debug!(path, baud = BAUD_RATE, "serial port opened");
        Ok(Self { port })
    }
}

/// 后台读线程持有的接收句柄
pub struct SerialRxLink {
    port: Box<dyn SerialPort>,
}

/// 命令发送句柄
pub struct SerialTxLink {
    port: Box<dyn SerialPort>,
}

impl SplittableLink for SerialLink {
    type Rx = SerialRxLink;
    type Tx = SerialTxLink;

    fn split(self) -> Result<(SerialRxLink, SerialTxLink), SerialError> {
        let rx_port = self.port.try_clone().map_err(device_error)?;
        Ok((SerialRxLink { port: rx_port }, SerialTxLink { port: self.port }))
    }
}

impl RxLink for SerialRxLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            Ok(0) => Err(SerialError::Timeout),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => {
                Err(SerialError::Timeout)
            }
            Err(e) => Err(SerialError::Io(e)),
        }
    }
}

impl TxLink for SerialTxLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input).map_err(device_error)
    }
}

fn device_error(e: serialport::Error) -> SerialError {
    let kind = match e.kind {
        serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NotFound,
        serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(_) => SerialDeviceErrorKind::Disconnected,
        serialport::ErrorKind::Unknown => SerialDeviceErrorKind::Unknown,
    };
    SerialError::Device(SerialDeviceError::new(kind, e.description))
}

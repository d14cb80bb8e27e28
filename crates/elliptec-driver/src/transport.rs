//! 传输层：后台读线程 + 有界行队列
//!
//! 每条链路一个专职读线程，把串口字节流切成 CRLF 行并打上
//! 单调时间戳后推入有界队列。队列满时丢最旧的行：最新的
//! 总线活动永远可见。写串口在调用方线程完成，写后返回的
//! 时间戳是上层丢弃陈旧行的依据。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use elliptec_protocol::Frame;
use elliptec_serial::{RxLink, SerialError, SplittableLink, TxLink};
use tracing::{debug, trace, warn};

use crate::error::DriverError;

/// 读线程单次串口读的缓冲大小
const READ_CHUNK: usize = 256;

/// 传输层配置
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// 读线程单次 `read` 的阻塞上限，决定停止标志的响应延迟
    pub read_timeout: Duration,
    /// 每次写帧后的静默期（半双工总线上给设备让出转向时间），
    /// 零表示不等待
    pub settle: Duration,
    /// 行队列容量，满了丢最旧
    pub queue_capacity: usize,
    /// 关闭时等待读线程退出的上限
    pub shutdown_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            settle: Duration::ZERO,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

/// 一条带时间戳的回复行
#[derive(Debug, Clone)]
pub struct RxLine {
    /// 行完成（收到 LF）时的单调时间
    pub received_at: Instant,
    /// 剥掉 CRLF、按 UTF-8 宽松解码后的文本
    pub text: String,
    /// 结束符之前的原始字节，乱码诊断用
    pub raw: Vec<u8>,
}

/// 把串口字节流切成行
///
/// 以 LF 为界，行文本去掉结尾的 CR。不完整的尾巴留在缓冲里
/// 等后续字节。
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一段字节，返回其中完成的行
    pub fn push(&mut self, bytes: &[u8]) -> Vec<RxLine> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let mut raw = std::mem::take(&mut self.buf);
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                let text = String::from_utf8_lossy(&raw).into_owned();
                lines.push(RxLine {
                    received_at: Instant::now(),
                    text,
                    raw,
                });
            } else {
                self.buf.push(b);
            }
        }
        lines
    }

    /// 缓冲中未完成的字节数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// 共享总线传输：写端 + 行队列 + 读线程句柄
pub struct Transport {
    tx: Box<dyn TxLink>,
    lines: Receiver<RxLine>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    settle: Duration,
    shutdown_timeout: Duration,
}

impl Transport {
    /// 拆分链路并启动读线程
    pub fn start<L: SplittableLink>(link: L, config: &TransportConfig) -> Result<Self, DriverError> {
        let (rx, tx) = link.split()?;
        let (line_tx, line_rx) = crossbeam_channel::bounded(config.queue_capacity.max(1));
        // 读线程自己持有一个消费端，队列满时用它丢最旧的行
        let evict_rx = line_rx.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let reader = spawn(move || rx_loop(rx, line_tx, evict_rx, stop_flag));
        Ok(Self {
            tx: Box::new(tx),
            lines: line_rx,
            stop,
            reader: Some(reader),
            settle: config.settle,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// 读线程是否已经停掉
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// 写一帧（不带结束符），返回写完成后的单调时间戳
    ///
    /// 上层用这个时间戳过滤发送之前就已在队列里的行。
    pub fn write_frame(&mut self, frame: &Frame) -> Result<Instant, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        trace!(frame = %frame, "TX");
        self.tx.write_all(frame.as_bytes())?;
        self.tx.flush()?;
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        Ok(Instant::now())
    }

    /// 写一个裸 CR，复位所有设备的命令解析器
    ///
    /// 设备不回复这个字节。扫描前各发一次可以清掉设备侧
    /// 半截命令的残留状态。
    pub fn reset_parser(&mut self) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        trace!("TX parser reset (bare CR)");
        self.tx.write_all(b"\r")?;
        self.tx.flush()?;
        Ok(())
    }

    /// 清空行队列；`clear_driver_buffer` 为真时连串口驱动的
    /// 输入缓冲一起丢（尽力而为）
    pub fn flush_queue(&mut self, clear_driver_buffer: bool) {
        let mut dropped = 0usize;
        while self.lines.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            trace!(dropped, "flushed queued lines");
        }
        if clear_driver_buffer
            && let Err(e) = self.tx.clear_input()
        {
            debug!("clear_input failed (ignored): {e}");
        }
    }

    /// 阻塞取下一行，超时返回 `None`
    pub fn pop_line(&mut self, timeout: Duration) -> Option<RxLine> {
        self.lines.recv_timeout(timeout).ok()
    }

    /// 停止读线程并等待其退出（有界），可重复调用
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.reader.take()
            && let Err(_e) = handle.join_timeout(self.shutdown_timeout)
        {
            warn!(
                "RX thread did not exit within {:?}, detaching",
                self.shutdown_timeout
            );
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// 读线程主循环
///
/// 串口读超时是常态（总线安静），静默继续；其他读错误打日志
/// 退避后重试，串口拔掉也不让线程 panic。
fn rx_loop(
    mut rx: impl RxLink,
    lines: Sender<RxLine>,
    evict: Receiver<RxLine>,
    stop: Arc<AtomicBool>,
) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Acquire) {
        let n = match rx.read_chunk(&mut buf) {
            Ok(n) => n,
            Err(SerialError::Timeout) => continue,
            Err(e) => {
                warn!("serial read error: {e}");
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        };
        for line in assembler.push(&buf[..n]) {
            trace!(text = %line.text, "RX line");
            let mut pending = line;
            loop {
                match lines.try_send(pending) {
                    Ok(()) => break,
                    Err(TrySendError::Full(l)) => {
                        // 丢最旧，保最新
                        let _ = evict.try_recv();
                        pending = l;
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        trace!("line queue consumer gone, RX thread exiting");
                        return;
                    }
                }
            }
        }
    }
    trace!("RX thread stopped");
}

/// 带超时的线程 join 扩展
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(std::boxed::Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(std::boxed::Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "Thread panicked during join",
                )))
            }
        }
    }
}

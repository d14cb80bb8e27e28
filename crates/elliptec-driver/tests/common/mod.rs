#![allow(dead_code)] // 各测试二进制只用到子集

//! 脚本化总线：无硬件测试用的 SplittableLink 实现
//!
//! 写端把命令文本交给一个"设备线程"，设备线程按注册的
//! 应答函数生成回复行，模拟真实设备的"命令后回复"时序。
//! 测试还可以随时注入任意原始字节，模拟别台设备的流量
//! 和线缆乱码。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use elliptec_serial::{RxLink, SerialError, SplittableLink, TxLink};
use parking_lot::Mutex;

/// 应答函数：输入一条命令文本，返回要回的行（不带 CRLF）
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// 设备线程回话前的固定延迟，保证回复时间戳晚于命令发送
const DEVICE_LATENCY: Duration = Duration::from_millis(2);

pub struct ScriptedRx {
    feed: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

pub struct ScriptedTx {
    written: Sender<String>,
    commands: Sender<String>,
}

pub struct ScriptedLink {
    rx: ScriptedRx,
    tx: ScriptedTx,
}

/// 测试侧的总线句柄
pub struct BusHandle {
    feed: Sender<Vec<u8>>,
    written: Receiver<String>,
    responder: Arc<Mutex<Option<Responder>>>,
}

impl BusHandle {
    /// 注入一行回复（自动补 CRLF）
    pub fn inject_line(&self, line: &str) {
        let _ = self.feed.send(format!("{line}\r\n").into_bytes());
    }

    /// 注入任意原始字节
    pub fn inject_raw(&self, bytes: &[u8]) {
        let _ = self.feed.send(bytes.to_vec());
    }

    /// 取出目前为止写到总线上的所有命令文本
    pub fn writes(&self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(w) = self.written.try_recv() {
            out.push(w);
        }
        out
    }

    /// 注册应答函数，替换旧的
    pub fn set_responder<F>(&self, f: F)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        *self.responder.lock() = Some(Box::new(f));
    }

    /// 撤掉应答函数，总线从此装死
    pub fn go_silent(&self) {
        *self.responder.lock() = None;
    }
}

/// 建一条脚本化链路
pub fn scripted_link() -> (ScriptedLink, BusHandle) {
    let (feed_tx, feed_rx) = unbounded::<Vec<u8>>();
    let (written_tx, written_rx) = unbounded::<String>();
    let (cmd_tx, cmd_rx) = unbounded::<String>();
    let responder: Arc<Mutex<Option<Responder>>> = Arc::new(Mutex::new(None));

    // 设备线程：链路写端一关（命令通道断开）就退出
    let device_responder = responder.clone();
    let device_feed = feed_tx.clone();
    thread::spawn(move || {
        while let Ok(cmd) = cmd_rx.recv() {
            thread::sleep(DEVICE_LATENCY);
            let replies = {
                let mut guard = device_responder.lock();
                match guard.as_mut() {
                    Some(r) => r(&cmd),
                    None => Vec::new(),
                }
            };
            for line in replies {
                let _ = device_feed.send(format!("{line}\r\n").into_bytes());
            }
        }
    });

    let link = ScriptedLink {
        rx: ScriptedRx {
            feed: feed_rx,
            pending: Vec::new(),
        },
        tx: ScriptedTx {
            written: written_tx,
            commands: cmd_tx,
        },
    };
    let handle = BusHandle {
        feed: feed_tx,
        written: written_rx,
        responder,
    };
    (link, handle)
}

impl RxLink for ScriptedRx {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        if self.pending.is_empty() {
            match self.feed.recv_timeout(Duration::from_millis(5)) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(SerialError::Timeout);
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl TxLink for ScriptedTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let _ = self.written.send(text.clone());
        let _ = self.commands.send(text);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

impl SplittableLink for ScriptedLink {
    type Rx = ScriptedRx;
    type Tx = ScriptedTx;

    fn split(self) -> Result<(ScriptedRx, ScriptedTx), SerialError> {
        Ok((self.rx, self.tx))
    }
}

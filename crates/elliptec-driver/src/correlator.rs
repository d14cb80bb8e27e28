//! 命令/回复关联
//!
//! 共享半双工总线上没有请求 ID，只能靠时间戳加谓词把"我这条
//! 命令的回复"从行流里捞出来：发送时刻之前的行一律作废，
//! 之后的行逐条过谓词，不匹配的消费掉继续等。

use std::time::{Duration, Instant};

use elliptec_protocol::Frame;
use tracing::trace;

use crate::error::DriverError;
use crate::transport::{RxLine, Transport};

/// 陈旧判定的容差：行时间戳与发送时刻由不同线程打点，
/// 只有早于发送超过这个量的行才算陈旧
pub(crate) const STALE_GRACE: Duration = Duration::from_millis(1);

/// 发一帧并等待第一条匹配的回复行
///
/// - 时间戳早于发送时刻的行是陈旧残留，直接丢弃；
/// - 谓词不接受的行（别台设备、乱码）消费后继续等；
/// - 截止前没等到匹配行返回 [`DriverError::Timeout`]。
pub fn send_and_wait<P>(
    transport: &mut Transport,
    frame: &Frame,
    timeout: Duration,
    mut accept: P,
) -> Result<RxLine, DriverError>
where
    P: FnMut(&str) -> bool,
{
    let sent_at = transport.write_frame(frame)?;
    let deadline = sent_at + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DriverError::Timeout(timeout));
        }
        let Some(line) = transport.pop_line(remaining) else {
            return Err(DriverError::Timeout(timeout));
        };
        if line.received_at + STALE_GRACE < sent_at {
            trace!(text = %line.text, "discarding stale line");
            continue;
        }
        if accept(&line.text) {
            return Ok(line);
        }
        trace!(text = %line.text, "skipping unrelated line");
    }
}

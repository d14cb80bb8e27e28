//! 运动完成监控
//!
//! 运动命令（归零/移动）发出后设备会沉默一段时间，结束时
//! 自发地发一条 `GS` 或 `PO`。什么样的行算"动完了"用
//! [`CompletionPolicy`] 参数化；判定本身是纯状态机
//! [`MotionTracker`]，阻塞等待循环在外面喂行。

use std::time::{Duration, Instant};

use elliptec_protocol::{Address, Reply, StatusCode, command};
use tracing::{debug, trace};

use crate::error::DriverError;
use crate::stage::StatusCache;
use crate::transport::Transport;

/// 等待循环单次取行的阻塞上限
const POP_SLICE: Duration = Duration::from_millis(50);

/// 混合策略下的状态轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// 异步完成行的判定策略
///
/// 有的固件用一条 `GS00` 宣告运动结束，有的结束时必发
/// `PO`。默认的混合策略兼容两者：异步 `GS00` 不算数，
/// 但周期性主动轮询，轮询到 OK 即完成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// 异步 `GS00` 即完成
    StatusTerminates,
    /// 只认 `PO`，异步 `GS00` 继续等
    PositionRequired,
    /// 异步 `GS00` 不算数，但轮询到的 OK 算
    #[default]
    HybridWithPolling,
}

/// 运动监控状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// 还没发运动命令
    Idle,
    Busy,
    Done,
    Failed,
}

/// 纯判定核心：喂入总线行/轮询结果，产出状态迁移
///
/// 不做任何 IO，好单测。
#[derive(Debug)]
pub struct MotionTracker {
    address: Address,
    policy: CompletionPolicy,
    state: MotionState,
    fault: Option<StatusCode>,
}

impl MotionTracker {
    pub fn new(address: Address, policy: CompletionPolicy) -> Self {
        Self {
            address,
            policy,
            state: MotionState::Idle,
            fault: None,
        }
    }

    /// 运动命令一发出就处于 Busy
    pub fn started(address: Address, policy: CompletionPolicy) -> Self {
        let mut tracker = Self::new(address, policy);
        tracker.begin();
        tracker
    }

    /// 标记运动命令已写上总线
    pub fn begin(&mut self) {
        self.state = MotionState::Busy;
        self.fault = None;
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 失败时的状态码
    pub fn fault(&self) -> Option<StatusCode> {
        self.fault
    }

    /// 观察一条异步总线行
    ///
    /// 别台设备的行和认不出的乱码一律忽略，状态不变。
    pub fn observe_line(&mut self, text: &str) -> MotionState {
        if self.state != MotionState::Busy {
            return self.state;
        }
        match Reply::parse(text) {
            Some(Reply::Status { address, code }) if address == self.address => {
                return self.observe_status(code, false);
            }
            Some(Reply::Position { address, counts }) if address == self.address => {
                trace!(counts, "position line, motion done");
                self.state = MotionState::Done;
            }
            _ => {
                trace!(text, "ignoring line during motion");
            }
        }
        self.state
    }

    /// 观察一个同地址状态码
    ///
    /// `polled` 表示这是主动轮询的应答：设备答得上话又不忙，
    /// 无论策略如何都算完成。异步 OK 是否算数由策略决定。
    pub fn observe_status(&mut self, code: StatusCode, polled: bool) -> MotionState {
        if self.state != MotionState::Busy {
            return self.state;
        }
        if code.is_soft_busy() {
            trace!(?code, polled, "still moving");
        } else if code.is_ok() {
            let conclusive = polled || matches!(self.policy, CompletionPolicy::StatusTerminates);
            if conclusive {
                self.state = MotionState::Done;
            } else {
                trace!("async OK ignored, waiting for position line");
            }
        } else {
            debug!(?code, "device fault during motion");
            self.fault = Some(code);
            self.state = MotionState::Failed;
        }
        self.state
    }
}

/// 阻塞等待一次运动完成
///
/// 专职消费行队列并更新 `cache` 里的最近状态。`poll_interval`
/// 为 `Some` 时周期性发一条状态查询兜底；查询不在这里等回复，
/// 应答和别的行一样从队列里来——发完轮询后的第一条同地址
/// 状态行按轮询应答处理（忙时装死不答也是常态）。截止仍在
/// Busy 返回超时错误，不发任何补救命令。
pub fn wait_for_completion(
    transport: &mut Transport,
    tracker: &mut MotionTracker,
    cache: &StatusCache,
    started_at: Instant,
    timeout: Duration,
    poll_interval: Option<Duration>,
) -> Result<(), DriverError> {
    let deadline = started_at + timeout;
    let mut next_poll = poll_interval.map(|interval| started_at + interval);
    let mut poll_pending = false;
    loop {
        let now = Instant::now();
        if now >= deadline {
            cache.store(StatusCode::Unknown);
            return Err(DriverError::Timeout(timeout));
        }

        let slice = POP_SLICE.min(deadline - now);
        if let Some(line) = transport.pop_line(slice) {
            if line.received_at + crate::correlator::STALE_GRACE < started_at {
                trace!(text = %line.text, "discarding stale line");
                continue;
            }
            let state = match Reply::parse(&line.text) {
                Some(Reply::Status { address, code }) if address == tracker.address() => {
                    cache.store(code);
                    let polled = std::mem::take(&mut poll_pending);
                    tracker.observe_status(code, polled)
                }
                _ => tracker.observe_line(&line.text),
            };
            match state {
                MotionState::Done => return Ok(()),
                MotionState::Failed => {
                    return Err(DriverError::Device {
                        status: tracker.fault().unwrap_or(StatusCode::Unknown),
                    });
                }
                MotionState::Busy | MotionState::Idle => {}
            }
        }

        if let Some(at) = next_poll
            && Instant::now() >= at
        {
            next_poll = Some(Instant::now() + poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL));
            transport.write_frame(&command::status_query(tracker.address()))?;
            poll_pending = true;
        }
    }
}

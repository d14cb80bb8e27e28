//! 设备会话
//!
//! [`Stage`] 绑定总线上的一台设备，把协议操作包成阻塞方法。
//! 最近一次观察到的状态码放在 [`StatusCache`] 里，随每条
//! 解码成功的状态回复更新；超时后缓存回到 Unknown，绝不
//! 把陈旧状态当真。

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use elliptec_protocol::{Address, Frame, HomeDirection, StatusCode, command, reply};
use tracing::{debug, info, warn};

use crate::correlator::send_and_wait;
use crate::error::DriverError;
use crate::monitor::{CompletionPolicy, MotionTracker, wait_for_completion};
use crate::transport::{RxLine, Transport};

/// 最近观察到的设备状态
///
/// 无锁快照，读不阻塞写。初值 Unknown：还没跟设备说过话。
#[derive(Debug)]
pub struct StatusCache {
    last: ArcSwap<StatusCode>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self {
            last: ArcSwap::from_pointee(StatusCode::Unknown),
        }
    }

    pub fn store(&self, code: StatusCode) {
        self.last.store(Arc::new(code));
    }

    pub fn get(&self) -> StatusCode {
        **self.last.load()
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `stop` 的结果
///
/// 不少 Elliptec 固件根本不实现 `st`，回 CommandError。对
/// "确保不动"这个意图来说设备此刻既然答得上话就没在动，
/// 所以这不是失败，只是值得告诉调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 设备确认停止
    Stopped,
    /// 固件不支持 stop，但设备已经静止
    NotSupported(StatusCode),
}

/// 一台已绑定的 Elliptec 设备会话
///
/// 由 [`StageBuilder`](crate::StageBuilder) 构造。
/// 独占传输层；共享总线上的多台设备用各自的 `Stage` 时
/// 需要各开一条串口，或在上层自行串行化。
pub struct Stage {
    transport: Transport,
    address: Address,
    policy: CompletionPolicy,
    reply_timeout: Duration,
    poll_interval: Duration,
    cache: StatusCache,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("address", &self.address)
            .field("policy", &self.policy)
            .field("reply_timeout", &self.reply_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub(crate) fn new(
        transport: Transport,
        address: Address,
        policy: CompletionPolicy,
        reply_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            address,
            policy,
            reply_timeout,
            poll_interval,
            cache: StatusCache::new(),
        }
    }

    /// 绑定的总线地址
    pub fn address(&self) -> Address {
        self.address
    }

    /// 最近观察到的状态码（不发总线流量）
    pub fn last_status(&self) -> StatusCode {
        self.cache.get()
    }

    /// 查询设备状态
    pub fn get_status(&mut self) -> Result<StatusCode, DriverError> {
        let line = self.exchange(command::status_query(self.address), reply::STATUS_TAG)?;
        let code = reply::decode_status(&line.text, self.address)?;
        self.cache.store(code);
        Ok(code)
    }

    /// 查询速度百分比
    pub fn get_speed(&mut self) -> Result<u8, DriverError> {
        let line = self.exchange(command::velocity_query(self.address), reply::VELOCITY_TAG)?;
        Ok(reply::decode_velocity(&line.text, self.address)?)
    }

    /// 设置速度百分比，设备以状态回复确认
    pub fn set_speed(&mut self, percent: u8) -> Result<(), DriverError> {
        let frame = command::set_velocity(self.address, percent)?;
        let line = self.exchange(frame, reply::STATUS_TAG)?;
        let code = reply::decode_status(&line.text, self.address)?;
        self.cache.store(code);
        if !code.is_ok() {
            return Err(DriverError::Device { status: code });
        }
        Ok(())
    }

    /// 查询当前位置（编码器计数）
    pub fn get_position(&mut self) -> Result<i32, DriverError> {
        let line = self.exchange(command::position_query(self.address), reply::POSITION_TAG)?;
        Ok(reply::decode_position(&line.text, self.address)?)
    }

    /// 归零并等待完成
    pub fn home(&mut self, direction: HomeDirection, timeout: Duration) -> Result<(), DriverError> {
        debug!(address = %self.address, ?direction, "home");
        self.run_motion(command::home(self.address, direction), timeout)
    }

    /// 相对移动并等待完成
    pub fn move_relative(&mut self, counts: i32, timeout: Duration) -> Result<(), DriverError> {
        debug!(address = %self.address, counts, "move relative");
        self.run_motion(command::move_relative(self.address, counts), timeout)
    }

    /// 绝对移动并等待完成
    pub fn move_absolute(&mut self, counts: i32, timeout: Duration) -> Result<(), DriverError> {
        debug!(address = %self.address, counts, "move absolute");
        self.run_motion(command::move_absolute(self.address, counts), timeout)
    }

    /// 请求停止当前运动
    ///
    /// 设备回 OK 即停止；回 CommandError 表示固件没有这条命令，
    /// 作为 [`StopOutcome::NotSupported`] 正常返回；回忙说明
    /// 停止正在进行，转入完成等待。其余状态码是真故障。
    pub fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, DriverError> {
        let line = self.exchange(command::stop(self.address), reply::STATUS_TAG)?;
        let code = reply::decode_status(&line.text, self.address)?;
        self.cache.store(code);
        match code {
            StatusCode::Ok => Ok(StopOutcome::Stopped),
            StatusCode::CommandError => {
                info!(address = %self.address, "stop not supported by firmware");
                Ok(StopOutcome::NotSupported(code))
            }
            code if code.is_soft_busy() => {
                debug!(address = %self.address, "stop acknowledged busy, waiting");
                let mut tracker = MotionTracker::started(self.address, self.policy);
                let poll = self.poll_interval_for_policy();
                wait_for_completion(
                    &mut self.transport,
                    &mut tracker,
                    &self.cache,
                    line.received_at,
                    timeout,
                    poll,
                )?;
                Ok(StopOutcome::Stopped)
            }
            code => Err(DriverError::Device { status: code }),
        }
    }

    /// 旁听总线：把行队列里的行交给回调，直到超时或回调返回 `false`
    ///
    /// 诊断用，不发任何命令。
    pub fn listen<F>(&mut self, duration: Duration, mut on_line: F)
    where
        F: FnMut(&RxLine) -> bool,
    {
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            let slice = remaining.min(Duration::from_millis(100));
            if let Some(line) = self.transport.pop_line(slice)
                && !on_line(&line)
            {
                return;
            }
        }
    }

    /// 发一个裸 CR 复位设备侧命令解析器
    pub fn reset_parser(&mut self) -> Result<(), DriverError> {
        self.transport.reset_parser()
    }

    /// 停读线程、关串口；幂等，`Drop` 也会走这里
    pub fn close(&mut self) {
        self.transport.close();
    }

    // ==================== 内部 ====================

    /// 单回合问答：用标签+地址谓词关联回复，超时把缓存打回 Unknown
    fn exchange(&mut self, frame: Frame, tag: &'static str) -> Result<RxLine, DriverError> {
        let address = self.address;
        let result = send_and_wait(&mut self.transport, &frame, self.reply_timeout, |text| {
            let bytes = text.as_bytes();
            bytes.len() >= 3 && bytes[0] == address.to_char() as u8 && &bytes[1..3] == tag.as_bytes()
        });
        match result {
            Ok(line) => Ok(line),
            Err(e) => {
                if e.is_timeout() {
                    warn!(address = %address, frame = %frame, "no reply, status now unknown");
                    self.cache.store(StatusCode::Unknown);
                }
                Err(e)
            }
        }
    }

    /// 运动命令公共路径：发帧即 Busy，喂行直到完成或截止
    fn run_motion(&mut self, frame: Frame, timeout: Duration) -> Result<(), DriverError> {
        let mut tracker = MotionTracker::started(self.address, self.policy);
        let sent_at = self.transport.write_frame(&frame)?;
        let poll = self.poll_interval_for_policy();
        wait_for_completion(
            &mut self.transport,
            &mut tracker,
            &self.cache,
            sent_at,
            timeout,
            poll,
        )
    }

    fn poll_interval_for_policy(&self) -> Option<Duration> {
        matches!(self.policy, CompletionPolicy::HybridWithPolling).then_some(self.poll_interval)
    }
}

//! 驱动层模块
//!
//! 本模块提供 Elliptec 电动台的设备驱动功能，包括：
//! - 后台读线程与有界行队列（传输层）
//! - 时间戳 + 谓词的命令/回复关联（总线无请求 ID）
//! - 总线地址扫描与绑定
//! - 运动完成监控（策略化的完成判定 + 轮询兜底）
//! - 阻塞式设备会话 [`Stage`]
//!
//! # 并发模型
//!
//! 每条链路一个专职读线程，其余全部在调用方线程阻塞完成。
//! 没有事件循环，取消只有超时一种形式。

mod builder;
pub mod correlator;
mod error;
pub mod monitor;
pub mod scan;
mod stage;
pub mod transport;

pub use builder::StageBuilder;
pub use correlator::send_and_wait;
pub use error::DriverError;
pub use monitor::{CompletionPolicy, DEFAULT_POLL_INTERVAL, MotionState, MotionTracker};
pub use scan::{DEFAULT_PROBE_TIMEOUT, scan};
pub use stage::{Stage, StatusCache, StopOutcome};
pub use transport::{LineAssembler, RxLine, Transport, TransportConfig};

// 上层常用的协议类型
pub use elliptec_protocol::{Address, HomeDirection, StatusCode};

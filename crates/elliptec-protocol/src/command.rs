//! 主机命令帧构建
//!
//! 助记符小写，负载大写十六进制，无结束符。
//! 负载校验在构帧前完成，线上永远不出现非法帧。

use crate::{Address, Frame, ValidationError};

/// 速度百分比上限
pub const MAX_VELOCITY_PERCENT: u8 = 100;

/// 归零方向（`ho` 命令的单字符负载）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HomeDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl HomeDirection {
    fn payload(self) -> &'static str {
        match self {
            HomeDirection::Clockwise => "0",
            HomeDirection::CounterClockwise => "1",
        }
    }
}

/// `Xgs` — 状态查询
pub fn status_query(address: Address) -> Frame {
    Frame::build(address, "gs", "")
}

/// `Xgv` — 速度查询
pub fn velocity_query(address: Address) -> Frame {
    Frame::build(address, "gv", "")
}

/// `Xgp` — 位置查询
pub fn position_query(address: Address) -> Frame {
    Frame::build(address, "gp", "")
}

/// `Xst` — 停止当前运动
pub fn stop(address: Address) -> Frame {
    Frame::build(address, "st", "")
}

/// `XsvNN` — 设置速度百分比，超过 100 在编码侧拒绝
pub fn set_velocity(address: Address, percent: u8) -> Result<Frame, ValidationError> {
    if percent > MAX_VELOCITY_PERCENT {
        return Err(ValidationError::PercentOutOfRange { percent });
    }
    Ok(Frame::build(address, "sv", &format!("{percent:02X}")))
}

/// `XhoD` — 归零
pub fn home(address: Address, direction: HomeDirection) -> Frame {
    Frame::build(address, "ho", direction.payload())
}

/// `XmrNNNNNNNN` — 相对移动（编码器计数，二补码 32 位）
pub fn move_relative(address: Address, counts: i32) -> Frame {
    Frame::build(address, "mr", &encode_long32(counts))
}

/// `XmaNNNNNNNN` — 绝对移动
pub fn move_absolute(address: Address, counts: i32) -> Frame {
    Frame::build(address, "ma", &encode_long32(counts))
}

/// 有符号 32 位 → 8 位大写十六进制（二补码）
fn encode_long32(value: i32) -> String {
    format!("{:08X}", value as u32)
}

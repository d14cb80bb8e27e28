//! 设备状态码
//!
//! `GS` 回复携带的两位十六进制状态。固件手册定义 0..=13，
//! 之外的值一律落入 [`StatusCode::Unknown`]，解码永不失败。

use num_enum::FromPrimitive;

/// Elliptec 固件状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    CommunicationTimeout = 1,
    MechanicalTimeout = 2,
    CommandError = 3,
    ValueOutOfRange = 4,
    ModuleIsolated = 5,
    ModuleOutOfIsolation = 6,
    InitError = 7,
    ThermalError = 8,
    Busy = 9,
    SensorError = 10,
    MotorError = 11,
    OutOfRange = 12,
    OverCurrent = 13,
    /// 手册之外的任何值
    #[num_enum(default)]
    Unknown = 0xFF,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }

    /// 运动中属于正常的"还没好"状态：Busy 以及机械超时
    /// （部分固件在长行程中用机械超时回答状态查询）
    pub fn is_soft_busy(self) -> bool {
        matches!(self, StatusCode::Busy | StatusCode::MechanicalTimeout)
    }

    /// 人类可读描述，用于日志与 CLI 输出
    pub fn description(self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::CommunicationTimeout => "communication timeout",
            StatusCode::MechanicalTimeout => "mechanical timeout",
            StatusCode::CommandError => "command error or not supported",
            StatusCode::ValueOutOfRange => "value out of range",
            StatusCode::ModuleIsolated => "module isolated",
            StatusCode::ModuleOutOfIsolation => "module out of isolation",
            StatusCode::InitError => "initialization error",
            StatusCode::ThermalError => "thermal error",
            StatusCode::Busy => "busy",
            StatusCode::SensorError => "sensor error",
            StatusCode::MotorError => "motor error",
            StatusCode::OutOfRange => "out of range",
            StatusCode::OverCurrent => "over current",
            StatusCode::Unknown => "unknown status code",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        assert_eq!(StatusCode::from(0u8), StatusCode::Ok);
        assert_eq!(StatusCode::from(2u8), StatusCode::MechanicalTimeout);
        assert_eq!(StatusCode::from(9u8), StatusCode::Busy);
        assert_eq!(StatusCode::from(13u8), StatusCode::OverCurrent);
    }

    #[test]
    fn out_of_table_codes_become_unknown() {
        assert_eq!(StatusCode::from(14u8), StatusCode::Unknown);
        assert_eq!(StatusCode::from(0x42u8), StatusCode::Unknown);
        assert_eq!(StatusCode::from(0xFFu8), StatusCode::Unknown);
    }

    #[test]
    fn soft_busy_covers_busy_and_mechanical_timeout() {
        assert!(StatusCode::Busy.is_soft_busy());
        assert!(StatusCode::MechanicalTimeout.is_soft_busy());
        assert!(!StatusCode::Ok.is_soft_busy());
        assert!(!StatusCode::MotorError.is_soft_busy());
    }
}

//! 总线地址
//!
//! Elliptec 总线上每台设备占一个十六进制位地址（`'0'..='F'`），
//! 同一条 RS-485 总线最多 16 台设备。

use crate::ValidationError;

/// 单个十六进制位的总线地址
///
/// 构造时接受大小写，内部统一为大写线上形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(u8);

impl Address {
    /// 默认扫描范围下界 `'0'`
    pub const MIN: Address = Address(0x0);
    /// 默认扫描范围上界 `'F'`
    pub const MAX: Address = Address(0xF);

    pub fn new(c: char) -> Result<Self, ValidationError> {
        match c.to_digit(16) {
            Some(v) => Ok(Self(v as u8)),
            None => Err(ValidationError::InvalidAddress {
                found: c.to_string(),
            }),
        }
    }

    /// 线上的地址字符（大写）
    pub fn to_char(self) -> char {
        char::from_digit(self.0 as u32, 16)
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('0')
    }

    /// 地址的数值 (0..=15)
    pub fn index(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl std::str::FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Address::new(c),
            _ => Err(ValidationError::InvalidAddress { found: s.into() }),
        }
    }
}

/// 闭区间地址迭代器，升序产出
#[derive(Debug, Clone)]
pub struct AddressRange {
    next: u8,
    end: u8,
    done: bool,
}

impl Iterator for AddressRange {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        if self.done {
            return None;
        }
        let out = Address(self.next);
        if self.next == self.end {
            self.done = true;
        } else {
            self.next += 1;
        }
        Some(out)
    }
}

/// 构造 `min..=max` 的地址范围，`min > max` 报错
pub fn address_range(min: Address, max: Address) -> Result<AddressRange, ValidationError> {
    if min > max {
        return Err(ValidationError::InvalidAddressRange { min, max });
    }
    Ok(AddressRange {
        next: min.0,
        end: max.0,
        done: false,
    })
}

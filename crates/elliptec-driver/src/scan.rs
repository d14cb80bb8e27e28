//! 总线地址扫描
//!
//! 逐个地址发状态查询，在探测超时内答话的算在线。Elliptec
//! 设备忽略发给别人的命令，所以静默只代表"这个地址没人"，
//! 不是错误。

use std::time::Duration;

use elliptec_protocol::{Address, Reply, address_range, command};
use tracing::{debug, trace};

use crate::correlator::send_and_wait;
use crate::error::DriverError;
use crate::transport::Transport;

/// 默认单地址探测超时
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(600);

/// 扫描 `min..=max`，升序返回答话的地址
///
/// 扫描前先发一个裸 CR 复位所有设备的命令解析器；每个地址
/// 探测前清掉行队列和驱动缓冲，避免上一个地址的迟到回复
/// 算到下一个头上。探测超时按地址吞掉，串口错误照常上抛。
pub fn scan(
    transport: &mut Transport,
    min: Address,
    max: Address,
    probe_timeout: Duration,
) -> Result<Vec<Address>, DriverError> {
    transport.reset_parser()?;
    let mut found = Vec::new();
    for address in address_range(min, max)? {
        transport.flush_queue(true);
        let frame = command::status_query(address);
        let matched = send_and_wait(transport, &frame, probe_timeout, |text| {
            matches!(
                Reply::parse(text),
                Some(Reply::Status { address: a, .. }) if a == address
            )
        });
        match matched {
            Ok(line) => {
                debug!(%address, text = %line.text, "probe answered");
                found.push(address);
            }
            Err(DriverError::Timeout(_)) => {
                trace!(%address, "probe silent");
            }
            Err(e) => return Err(e),
        }
    }
    debug!(found = found.len(), "bus scan complete");
    Ok(found)
}

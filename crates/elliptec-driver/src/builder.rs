//! 会话构造器

use std::time::Duration;

use elliptec_protocol::Address;
use elliptec_serial::{SerialLink, SplittableLink};
use tracing::info;

use crate::error::DriverError;
use crate::monitor::{CompletionPolicy, DEFAULT_POLL_INTERVAL};
use crate::scan::{DEFAULT_PROBE_TIMEOUT, scan};
use crate::stage::Stage;
use crate::transport::{Transport, TransportConfig};

/// [`Stage`] 构造器
///
/// 不给地址就扫描绑定：范围内恰好一台设备时绑它，零台或
/// 多台都是错误——静默猜地址在共享总线上太容易指错设备。
///
/// ```no_run
/// use elliptec_driver::StageBuilder;
///
/// let stage = StageBuilder::new("/dev/ttyUSB0")
///     .address('3')
///     .build()?;
/// # Ok::<(), elliptec_driver::DriverError>(())
/// ```
pub struct StageBuilder {
    port: String,
    address: Option<Address>,
    min_address: Address,
    max_address: Address,
    policy: CompletionPolicy,
    config: TransportConfig,
    reply_timeout: Duration,
    probe_timeout: Duration,
    poll_interval: Duration,
    address_error: Option<DriverError>,
}

impl StageBuilder {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            address: None,
            min_address: Address::MIN,
            max_address: Address::MAX,
            policy: CompletionPolicy::default(),
            config: TransportConfig::default(),
            reply_timeout: Duration::from_secs(1),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            address_error: None,
        }
    }

    /// 显式指定设备地址，跳过扫描
    ///
    /// 非法字符推迟到 `build` 时报错，让链式调用保持顺手。
    pub fn address(mut self, address: char) -> Self {
        match Address::new(address) {
            Ok(a) => self.address = Some(a),
            Err(e) => self.address_error = Some(e.into()),
        }
        self
    }

    /// 扫描绑定时的地址范围（闭区间），默认 `'0'..='F'`
    pub fn address_range(mut self, min: Address, max: Address) -> Self {
        self.min_address = min;
        self.max_address = max;
        self
    }

    /// 运动完成判定策略
    pub fn completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 传输层参数
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// 单回合问答的回复超时
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// 扫描时单地址探测超时
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// 混合策略下的状态轮询间隔
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 打开串口并绑定设备
    pub fn build(self) -> Result<Stage, DriverError> {
        let link = SerialLink::open(&self.port, self.config.read_timeout)?;
        self.build_with_link(link)
    }

    /// 在已有链路上绑定设备（测试与自定义后端用）
    pub fn build_with_link<L: SplittableLink>(self, link: L) -> Result<Stage, DriverError> {
        if let Some(e) = self.address_error {
            return Err(e);
        }
        let mut transport = Transport::start(link, &self.config)?;
        let address = match self.address {
            Some(address) => address,
            None => {
                let found = scan(
                    &mut transport,
                    self.min_address,
                    self.max_address,
                    self.probe_timeout,
                )?;
                match found.as_slice() {
                    [] => {
                        return Err(DriverError::NoDevice {
                            min: self.min_address,
                            max: self.max_address,
                        });
                    }
                    [only] => *only,
                    _ => return Err(DriverError::AmbiguousBus { found }),
                }
            }
        };
        info!(%address, port = %self.port, "stage bound");
        Ok(Stage::new(
            transport,
            address,
            self.policy,
            self.reply_timeout,
            self.poll_interval,
        ))
    }
}

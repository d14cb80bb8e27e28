//! # Elliptec CLI
//!
//! Elliptec 电动台的发现与运动命令行工具。
//!
//! ```bash
//! # 扫一遍总线，列出在线地址
//! elliptec-cli --port /dev/ttyUSB0 scan
//!
//! # 绑定地址 3 的设备并归零
//! elliptec-cli --port /dev/ttyUSB0 --address 3 home
//!
//! # 总线上只有一台设备时可以不给地址
//! elliptec-cli --port /dev/ttyUSB0 move --relative 1024
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use elliptec_driver::{
    DEFAULT_PROBE_TIMEOUT, HomeDirection, Stage, StageBuilder, Transport, TransportConfig, scan,
};
use elliptec_protocol::Address;
use elliptec_serial::SerialLink;
use tracing::info;

/// Elliptec CLI - 电动台命令行工具
#[derive(Parser, Debug)]
#[command(name = "elliptec-cli")]
#[command(about = "Command-line tool for Elliptec stage discovery and motion", long_about = None)]
#[command(version)]
struct Cli {
    /// 串口设备路径（如 /dev/ttyUSB0）
    #[arg(short, long)]
    port: String,

    /// 设备地址（单个十六进制位）；不给则扫描绑定
    #[arg(short, long)]
    address: Option<char>,

    /// 单条回复超时（毫秒）
    #[arg(long, default_value_t = 1000)]
    reply_timeout_ms: u64,

    /// 运动完成超时（秒）
    #[arg(long, default_value_t = 30)]
    motion_timeout_s: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描总线，列出在线地址
    Scan,

    /// 查询设备状态
    Status,

    /// 查询当前位置（编码器计数）
    Position,

    /// 查询或设置速度百分比
    Speed {
        /// 给出即设置，省略即查询
        percent: Option<u8>,
    },

    /// 归零
    Home {
        /// 逆时针归零（默认顺时针）
        #[arg(long)]
        ccw: bool,
    },

    /// 移动（--relative 与 --absolute 二选一）
    Move {
        /// 相对移动的编码器计数
        #[arg(long, allow_hyphen_values = true)]
        relative: Option<i32>,

        /// 绝对目标的编码器计数
        #[arg(long, allow_hyphen_values = true)]
        absolute: Option<i32>,
    },

    /// 请求停止当前运动
    Stop,

    /// 旁听总线流量（Ctrl-C 提前退出）
    Listen {
        /// 旁听时长（秒）
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("elliptec_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let motion_timeout = Duration::from_secs(cli.motion_timeout_s);

    match cli.command {
        Commands::Scan => run_scan(&cli.port),
        Commands::Status => {
            let mut stage = bind(&cli)?;
            let code = stage.get_status()?;
            println!("status: {} ({:?})", code.description(), code);
            Ok(())
        }
        Commands::Position => {
            let mut stage = bind(&cli)?;
            println!("position: {} counts", stage.get_position()?);
            Ok(())
        }
        Commands::Speed { percent: None } => {
            let mut stage = bind(&cli)?;
            println!("speed: {}%", stage.get_speed()?);
            Ok(())
        }
        Commands::Speed {
            percent: Some(percent),
        } => {
            let mut stage = bind(&cli)?;
            stage.set_speed(percent)?;
            println!("speed set to {percent}%");
            Ok(())
        }
        Commands::Home { ccw } => {
            let direction = if ccw {
                HomeDirection::CounterClockwise
            } else {
                HomeDirection::Clockwise
            };
            let mut stage = bind(&cli)?;
            stage.home(direction, motion_timeout)?;
            println!("homed");
            Ok(())
        }
        Commands::Move { relative, absolute } => {
            let mut stage = bind(&cli)?;
            match (relative, absolute) {
                (Some(counts), None) => stage.move_relative(counts, motion_timeout)?,
                (None, Some(counts)) => stage.move_absolute(counts, motion_timeout)?,
                _ => bail!("pass exactly one of --relative or --absolute"),
            }
            println!("move complete, position: {} counts", stage.get_position()?);
            Ok(())
        }
        Commands::Stop => {
            let mut stage = bind(&cli)?;
            let outcome = stage.stop(motion_timeout)?;
            println!("stop: {outcome:?}");
            Ok(())
        }
        Commands::Listen { seconds } => run_listen(&cli, Duration::from_secs(seconds)),
    }
}

/// 按命令行参数绑定一台设备
fn bind(cli: &Cli) -> Result<Stage> {
    let mut builder =
        StageBuilder::new(&cli.port).reply_timeout(Duration::from_millis(cli.reply_timeout_ms));
    if let Some(address) = cli.address {
        builder = builder.address(address);
    }
    let stage = builder.build()?;
    info!(address = %stage.address(), "bound");
    Ok(stage)
}

/// 扫描不绑定，直接在传输层上跑
fn run_scan(port: &str) -> Result<()> {
    let config = TransportConfig::default();
    let link = SerialLink::open(port, config.read_timeout)?;
    let mut transport = Transport::start(link, &config)?;
    let found = scan(
        &mut transport,
        Address::MIN,
        Address::MAX,
        DEFAULT_PROBE_TIMEOUT,
    )?;
    if found.is_empty() {
        println!("no devices found");
    } else {
        for address in found {
            println!("device at address {address}");
        }
    }
    Ok(())
}

/// 旁听总线：打印每一行，Ctrl-C 或到时退出
fn run_listen(cli: &Cli, duration: Duration) -> Result<()> {
    let mut stage = bind(cli)?;
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    println!("listening for {duration:?} (Ctrl-C to quit)");
    let started = std::time::Instant::now();
    stage.listen(duration, |line| {
        println!("{:>10.3}s  {}", started.elapsed().as_secs_f64(), line.text);
        running.load(Ordering::SeqCst)
    });
    Ok(())
}

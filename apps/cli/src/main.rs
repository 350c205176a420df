//! # Motus CLI
//!
//! 在宿主机上运行运动控制核心：从 stdin 读 TCode 指令行，经解析线程
//! 写入共享轴状态，执行循环按设定频率驱动所选拓扑。
//!
//! ```bash
//! # 干跑（舵机输出只进日志，RUST_LOG=trace 可见每拍目标值）
//! motus-cli --config motus.toml
//!
//! # SR6CAN 模式接真实 SocketCAN 接口
//! motus-cli --config motus.toml --mode 8 --backend socketcan
//! ```

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use motus_executor::{
    DataPacket, ExecutorRunner, PacketSource, ParserThread, Settings, command_queue,
    create_executor, mode_name,
};
use motus_protocol::tcode::TCodeState;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod backend;

use backend::{Backend, build_parts};

/// Motus CLI - TCode 运动控制核心宿主运行器
#[derive(Parser, Debug)]
#[command(name = "motus-cli")]
#[command(about = "Host-side runner for the Motus motion-control core", long_about = None)]
#[command(version)]
struct Cli {
    /// 设置文件（TOML）；缺省用内建默认值
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖设置中的拓扑模式号
    #[arg(short, long)]
    mode: Option<i32>,

    /// 输出后端
    #[arg(short, long, value_enum, default_value_t = Backend::DryRun)]
    backend: Backend,

    /// 打印构建信息（JSON）后退出
    #[arg(long)]
    build_info: bool,
}

/// 构建信息
fn build_parameters() -> String {
    serde_json::json!({
        "firmware": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "TCode v0.3",
    })
    .to_string()
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.build_info {
        println!("{}", build_parameters());
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(mode) = cli.mode {
        settings.servo.mode = mode;
    }
    info!(
        "mode {} ({}), loop {} Hz, backend {:?}",
        settings.servo.mode,
        mode_name(settings.servo.mode),
        settings.servo.pwm_frequency,
        cli.backend
    );

    let (parts, _keepalive) = build_parts(&settings, cli.backend)?;
    let executor = create_executor(&settings, parts)?;

    let state = Arc::new(Mutex::new(TCodeState::new()));
    let (command_tx, command_rx) = command_queue();
    let mut parser = ParserThread::spawn(command_rx, Arc::clone(&state));
    let mut runner = ExecutorRunner::spawn(executor, state, settings.servo.pwm_frequency);

    // 握手应答回显到 stdout
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        for reply in reply_rx {
            print!("{reply}");
            let _ = std::io::stdout().flush();
        }
    });

    // Ctrl-C 或 stdin 关闭都触发停机
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.try_send(());
        })
        .context("installing Ctrl-C handler")?;
    }

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            let packet = DataPacket {
                source: PacketSource::Uart,
                payload: line.into_bytes(),
                reply: Some(reply_tx.clone()),
            };
            if command_tx.send(packet).is_err() {
                break;
            }
        }
        let _ = shutdown_tx.try_send(());
    });

    let _ = shutdown_rx.recv();
    info!("shutting down");

    // stdin 线程可能仍阻塞在读上，不等它退出
    runner.stop();
    parser.stop();
    Ok(())
}

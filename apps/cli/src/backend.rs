//! 输出后端装配
//!
//! 组合根：按模式和后端构造执行机构与 CAN 总线句柄，整体注入
//! 执行器工厂。舵机拓扑在宿主机上没有真实 PWM 外设，统一落到
//! 日志执行机构上。

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use motus_actuator::{Actuator, ActuatorError, Wait};
use motus_can::mock::MockCanAdapter;
use motus_driver::{CtwBus, CtwConfig};
use motus_executor::{ExecutorParts, Settings};
use parking_lot::Mutex;
use tracing::{info, trace};

/// 输出后端选择
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// 干跑：舵机输出只进日志，CAN 走进程内回环
    DryRun,
    /// Linux SocketCAN（仅 SR6CAN 模式使用）
    #[cfg(target_os = "linux")]
    Socketcan,
}

/// 后端存活句柄
///
/// 进程内回环的对端要握在手里，掉了总线就断。
pub struct Keepalive {
    _mock_can: Option<MockCanAdapter>,
}

/// 只保留最近目标值的执行机构，输出以 trace 日志可见
struct LogActuator {
    channel: usize,
    offset: f32,
    target: Mutex<f32>,
}

impl LogActuator {
    fn new(channel: usize, offset: f32) -> Self {
        Self {
            channel,
            offset,
            target: Mutex::new(0.0),
        }
    }
}

impl Actuator for LogActuator {
    fn set_target(&self, value: f32) {
        *self.target.lock() = (value + self.offset).clamp(-1.0, 1.0);
    }

    fn actuate(&self, _wait: Wait) -> Result<(), ActuatorError> {
        trace!("servo {} -> {:+.3}", self.channel, *self.target.lock());
        Ok(())
    }

    fn target(&self) -> f32 {
        *self.target.lock()
    }
}

/// 各拓扑需要的舵机通道数
fn servo_count(mode: i32) -> usize {
    match mode {
        0 => 4,
        3 => 7,
        6 => 3,
        9 => 6,
        _ => 0,
    }
}

/// 构造硬件句柄
///
/// 模式号不认识时交给工厂报错，这里只按已知拓扑备料。
pub fn build_parts(settings: &Settings, backend: Backend) -> Result<(ExecutorParts, Keepalive)> {
    let mode = settings.servo.mode;

    let servos: Vec<Arc<dyn Actuator>> = (0..servo_count(mode))
        .map(|channel| {
            // O6 的零位脉宽在解算后叠加，其余拓扑作为安装偏置进执行机构
            let offset = if mode == 9 {
                0.0
            } else {
                settings.servo.offset(channel)
            };
            Arc::new(LogActuator::new(channel, offset)) as Arc<dyn Actuator>
        })
        .collect();

    if mode != 8 {
        return Ok((
            ExecutorParts { servos, ctw: None },
            Keepalive { _mock_can: None },
        ));
    }

    let config = CtwConfig {
        bitrate: settings.can.bitrate,
        ..CtwConfig::default()
    };

    match backend {
        Backend::DryRun => {
            let (host, device) = motus_can::mock::mock_bus_pair();
            let bus = CtwBus::new(host, config)
                .context("starting CTW bus on the in-process loopback")?;
            info!("CTW bus on in-process loopback, no motors will answer");
            Ok((
                ExecutorParts {
                    servos,
                    ctw: Some(Arc::new(bus)),
                },
                Keepalive {
                    _mock_can: Some(device),
                },
            ))
        },
        #[cfg(target_os = "linux")]
        Backend::Socketcan => {
            let adapter = motus_can::SocketCanAdapter::new(settings.can.interface.as_str())
                .with_context(|| format!("opening CAN interface {}", settings.can.interface))?;
            let bus = CtwBus::new(adapter, config).context("starting CTW bus")?;
            Ok((
                ExecutorParts {
                    servos,
                    ctw: Some(Arc::new(bus)),
                },
                Keepalive { _mock_can: None },
            ))
        },
    }
}

//! # Motus Actuator Layer
//!
//! 舵机/执行机构抽象：归一化目标值（-1.0 ~ 1.0）到输出波形的转换。
//!
//! 三种波形后端共享同一套脉宽约定：中位 1500 µs，±1.0 对应
//! ±1000 µs，最终脉宽钳制在 500–2500 µs。后端不直接触碰硬件，
//! 而是把波形写入注入的输出端口 trait（[`PwmPort`] / [`PulsePort`] /
//! [`SpiPort`]），同一份代码既能驱动硬件端口也能驱动测试 mock。

use thiserror::Error;

pub mod pwm;
pub mod rmt;
pub mod spi;

#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use pwm::PwmActuator;
pub use rmt::RmtActuator;
pub use spi::SpiActuator;

/// 脉宽下限（µs）
pub const PULSE_MIN_US: u32 = 500;
/// 脉宽上限（µs）
pub const PULSE_MAX_US: u32 = 2500;
/// 中位脉宽（µs）
pub const PULSE_CENTER_US: u32 = 1500;
/// 满量程脉宽偏移（µs），目标值 ±1.0 对应 ±1000 µs
pub const PULSE_SPAN_US: f32 = 1000.0;

/// actuate 的等待语义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// 发起输出后立即返回
    NonBlocking,
    /// 阻塞直到本周期波形输出完成
    Forever,
    /// 最多等待指定毫秒数
    Millis(u32),
}

/// 输出端口错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("port busy")]
    Busy,
    #[error("wait timed out")]
    Timeout,
    #[error("bus already initialized")]
    AlreadyInitialized,
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// 执行机构错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("PWM frequency {hz} Hz out of supported range 50-333 Hz")]
    InvalidFrequency { hz: u32 },
    #[error("SPI clock {hz} Hz is not usable")]
    InvalidClock { hz: u32 },
    #[error("waveform needs {required} bytes but buffer holds {capacity}")]
    FrameTooLarge { required: usize, capacity: usize },
    #[error(transparent)]
    Port(#[from] PortError),
}

/// PWM 输出端口：按占空比计数值输出
pub trait PwmPort: Send {
    fn write_duty(&mut self, duty: u16) -> Result<(), PortError>;
}

/// 脉冲序列输出端口：输出一个 高电平 + 低电平 符号（tick 计数）
pub trait PulsePort: Send {
    fn transmit(&mut self, high_ticks: u16, low_ticks: u16, wait: Wait) -> Result<(), PortError>;
}

/// SPI 输出端口：整帧写出位图波形
pub trait SpiPort: Send {
    /// 初始化共享总线；重复初始化返回 [`PortError::AlreadyInitialized`]
    fn init(&mut self) -> Result<(), PortError>;
    fn write(&mut self, buffer: &[u8], wait: Wait) -> Result<(), PortError>;
}

/// 统一的执行机构接口
///
/// `set_target` 只更新目标值，`actuate` 才产生输出；控制循环里
/// 两者成对调用。实现内部用 `parking_lot::Mutex` 保护状态，
/// 因此可以跨线程共享。
pub trait Actuator: Send + Sync {
    /// 设置归一化目标值；实现负责加上安装偏置并钳制到 [-1, 1]
    fn set_target(&self, value: f32);

    /// 按当前目标值输出一个波形周期
    fn actuate(&self, wait: Wait) -> Result<(), ActuatorError>;

    /// 当前（已钳制的）目标值
    fn target(&self) -> f32;

    /// 是否提供位置反馈
    fn has_feedback(&self) -> bool {
        false
    }

    /// 位置反馈值（无反馈能力时为 None）
    fn feedback(&self) -> Option<f64> {
        None
    }
}

/// 归一化目标值（含偏置、已钳制）转脉宽（µs）
pub fn target_to_pulse_us(target: f32) -> u32 {
    let pulse = PULSE_CENTER_US as f32 + target * PULSE_SPAN_US;
    (pulse.round() as i64).clamp(PULSE_MIN_US as i64, PULSE_MAX_US as i64) as u32
}

/// 目标值预处理：加偏置后钳制到 [-1, 1]
pub(crate) fn clamp_target(value: f32, offset: f32) -> f32 {
    (value + offset).clamp(-1.0, 1.0)
}

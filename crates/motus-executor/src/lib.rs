//! # Motus Executor Layer
//!
//! 控制回路框架：把 TCode 轴状态变成周期性的硬件输出。
//!
//! - [`settings`]：TOML 设置（轴标定、舵机零位、模式、CAN 参数）
//! - [`packet`]：传输层数据包队列与指令解析线程
//! - [`runner`]：[`Executor`] trait 与周期执行循环
//! - 拓扑实现：[`osr`]、[`sr6`]、[`trrmax`]、[`o6`]、[`sr6can`]
//! - [`factory`]：按模式号组装拓扑
//!
//! 所有硬件句柄（执行机构、CAN 总线）由组合根构造后注入，
//! 本层不持有任何全局状态。

pub mod factory;
pub mod o6;
pub mod osr;
pub mod packet;
pub mod runner;
pub mod settings;
pub mod sr6;
pub mod sr6can;
pub mod trrmax;

pub use factory::{ExecutorParts, create_executor, mode_name, supported_modes};
pub use packet::{DataPacket, PacketSource, ParserThread, command_queue};
pub use runner::{Executor, ExecutorRunner};
pub use settings::{AxisCalibration, Settings, SettingsError};

use thiserror::Error;

/// 执行器层错误
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("unknown servo mode: {mode}, supported: 0(OSR), 3(SR6), 6(TrRMax), 8(SR6CAN), 9(O6)")]
    UnknownMode { mode: i32 },

    #[error("mode {mode} requires {detail}")]
    MissingHardware { mode: i32, detail: String },

    #[error(transparent)]
    Driver(#[from] motus_driver::DriverError),

    #[error(transparent)]
    Actuator(#[from] motus_actuator::ActuatorError),

    #[error(transparent)]
    Settings(#[from] settings::SettingsError),
}

/// 线性区间映射（不钳制）
///
/// 标定链依赖"不钳制"的语义：left/right 可以超出 [0,1]，
/// 钳制统一发生在执行机构层。
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_range_basic() {
        assert_eq!(map_range(0.5, 0.0, 1.0, -1.0, 1.0), 0.0);
        assert_eq!(map_range(0.0, 0.0, 1.0, -50.0, 50.0), -50.0);
        assert_eq!(map_range(1.0, 0.0, 1.0, -50.0, 50.0), 50.0);
    }

    #[test]
    fn test_map_range_does_not_clamp() {
        assert_eq!(map_range(2.0, 0.0, 1.0, 0.0, 10.0), 20.0);
        assert_eq!(map_range(-1.0, 0.0, 1.0, 0.0, 10.0), -10.0);
    }
}

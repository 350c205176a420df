//! 脉冲序列舵机输出（单符号：高电平脉宽 + 固定低电平段）

use parking_lot::Mutex;
use tracing::trace;

use crate::{Actuator, ActuatorError, PulsePort, Wait, clamp_target, target_to_pulse_us};

/// 每个符号后的固定低电平时长（µs）
const LOW_US: u32 = 500;

struct Inner<P> {
    port: P,
    target: f32,
}

/// 脉冲序列舵机
///
/// 每个输出周期发送一个符号：目标脉宽的高电平段 + 固定 500 µs
/// 低电平段，时长以 tick 计（tick 时长构造时指定，典型 1 µs）。
pub struct RmtActuator<P: PulsePort> {
    inner: Mutex<Inner<P>>,
    offset: f32,
    tick_us: u32,
}

impl<P: PulsePort> RmtActuator<P> {
    pub fn new(port: P, tick_us: u32, offset: f32) -> Self {
        Self {
            inner: Mutex::new(Inner { port, target: 0.0 }),
            offset,
            // 零 tick 无意义，按 1µs 处理
            tick_us: tick_us.max(1),
        }
    }

    /// tick 时长（µs）
    pub fn tick_us(&self) -> u32 {
        self.tick_us
    }
}

impl<P: PulsePort> Actuator for RmtActuator<P> {
    fn set_target(&self, value: f32) {
        self.inner.lock().target = clamp_target(value, self.offset);
    }

    fn actuate(&self, wait: Wait) -> Result<(), ActuatorError> {
        let mut inner = self.inner.lock();
        let pulse = target_to_pulse_us(inner.target);
        let high_ticks = (pulse / self.tick_us) as u16;
        let low_ticks = (LOW_US / self.tick_us) as u16;
        trace!(
            "pulse actuate: target={}, high={} ticks, low={} ticks",
            inner.target, high_ticks, low_ticks
        );
        inner.port.transmit(high_ticks, low_ticks, wait)?;
        Ok(())
    }

    fn target(&self) -> f32 {
        self.inner.lock().target
    }
}

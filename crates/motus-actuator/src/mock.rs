//! 记录型输出端口（测试 / 仿真）

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Actuator, ActuatorError, PortError, PulsePort, PwmPort, SpiPort, Wait, clamp_target};

/// 记录占空比写入的 PWM 端口
#[derive(Debug, Default)]
pub struct RecordingPwmPort {
    log: Arc<Mutex<Vec<u16>>>,
}

impl RecordingPwmPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// 共享句柄，actuator 取得端口所有权后仍可查看写入记录
    pub fn log(&self) -> Arc<Mutex<Vec<u16>>> {
        Arc::clone(&self.log)
    }
}

impl PwmPort for RecordingPwmPort {
    fn write_duty(&mut self, duty: u16) -> Result<(), PortError> {
        self.log.lock().push(duty);
        Ok(())
    }
}

/// 记录符号（高/低电平 tick 数）的脉冲端口
#[derive(Debug, Default)]
pub struct RecordingPulsePort {
    log: Arc<Mutex<Vec<(u16, u16)>>>,
}

impl RecordingPulsePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<Vec<(u16, u16)>>> {
        Arc::clone(&self.log)
    }
}

impl PulsePort for RecordingPulsePort {
    fn transmit(&mut self, high_ticks: u16, low_ticks: u16, _wait: Wait) -> Result<(), PortError> {
        self.log.lock().push((high_ticks, low_ticks));
        Ok(())
    }
}

/// 记录整帧写入的 SPI 端口
#[derive(Debug, Default)]
pub struct RecordingSpiPort {
    log: Arc<Mutex<Vec<Vec<u8>>>>,
    initialized: bool,
}

impl RecordingSpiPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.log)
    }

    /// 模拟总线已被其他实例初始化的情形
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }
}

impl SpiPort for RecordingSpiPort {
    fn init(&mut self) -> Result<(), PortError> {
        if self.initialized {
            return Err(PortError::AlreadyInitialized);
        }
        self.initialized = true;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8], _wait: Wait) -> Result<(), PortError> {
        self.log.lock().push(buffer.to_vec());
        Ok(())
    }
}

/// 记录目标值序列的执行机构（执行器层测试用）
#[derive(Debug, Default)]
pub struct RecordingActuator {
    target: Mutex<f32>,
    offset: f32,
    history: Arc<Mutex<Vec<f32>>>,
}

impl RecordingActuator {
    pub fn new(offset: f32) -> Self {
        Self {
            target: Mutex::new(0.0),
            offset,
            history: Arc::default(),
        }
    }

    /// 每次 actuate 时刻的目标值序列
    pub fn history(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.history)
    }
}

impl Actuator for RecordingActuator {
    fn set_target(&self, value: f32) {
        *self.target.lock() = clamp_target(value, self.offset);
    }

    fn actuate(&self, _wait: Wait) -> Result<(), ActuatorError> {
        self.history.lock().push(*self.target.lock());
        Ok(())
    }

    fn target(&self) -> f32 {
        *self.target.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_actuator_clamps_and_records() {
        let servo = RecordingActuator::new(0.25);
        let history = servo.history();

        servo.set_target(0.5);
        servo.actuate(Wait::NonBlocking).unwrap();
        servo.set_target(2.0);
        servo.actuate(Wait::NonBlocking).unwrap();

        let got = history.lock().clone();
        assert_eq!(got, vec![0.75, 1.0]);
    }
}

//! PWM 舵机输出（14 位占空比）

use parking_lot::Mutex;
use tracing::trace;

use crate::{Actuator, ActuatorError, PwmPort, Wait, clamp_target, target_to_pulse_us};

/// 占空比分辨率：14 位
const DUTY_MAX: u32 = (1 << 14) - 1;

/// 支持的 PWM 频率范围（Hz）
const FREQ_MIN_HZ: u32 = 50;
const FREQ_MAX_HZ: u32 = 333;

struct Inner<P> {
    port: P,
    target: f32,
}

/// PWM 舵机
///
/// 频率在构造时校验（50–333 Hz），周期内脉宽按 14 位分辨率
/// 转为占空比计数值。PWM 是持续电平输出，`actuate` 写入占空比后
/// 立即生效，等待语义对本后端无意义。
pub struct PwmActuator<P: PwmPort> {
    inner: Mutex<Inner<P>>,
    offset: f32,
    period_us: u32,
}

impl<P: PwmPort> PwmActuator<P> {
    pub fn new(port: P, frequency_hz: u32, offset: f32) -> Result<Self, ActuatorError> {
        if !(FREQ_MIN_HZ..=FREQ_MAX_HZ).contains(&frequency_hz) {
            return Err(ActuatorError::InvalidFrequency { hz: frequency_hz });
        }
        Ok(Self {
            inner: Mutex::new(Inner { port, target: 0.0 }),
            offset,
            period_us: 1_000_000 / frequency_hz,
        })
    }

    /// PWM 周期（µs）
    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    fn pulse_to_duty(&self, pulse_us: u32) -> u16 {
        let duty = pulse_us as f32 / self.period_us as f32 * DUTY_MAX as f32;
        duty.round() as u16
    }
}

impl<P: PwmPort> Actuator for PwmActuator<P> {
    fn set_target(&self, value: f32) {
        self.inner.lock().target = clamp_target(value, self.offset);
    }

    fn actuate(&self, _wait: Wait) -> Result<(), ActuatorError> {
        let mut inner = self.inner.lock();
        let pulse = target_to_pulse_us(inner.target);
        let duty = self.pulse_to_duty(pulse);
        trace!("pwm actuate: target={}, pulse={}us, duty={}", inner.target, pulse, duty);
        inner.port.write_duty(duty)?;
        Ok(())
    }

    fn target(&self) -> f32 {
        self.inner.lock().target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingPwmPort;

    #[test]
    fn test_frequency_validated() {
        assert!(matches!(
            PwmActuator::new(RecordingPwmPort::new(), 49, 0.0),
            Err(ActuatorError::InvalidFrequency { hz: 49 })
        ));
        assert!(matches!(
            PwmActuator::new(RecordingPwmPort::new(), 334, 0.0),
            Err(ActuatorError::InvalidFrequency { hz: 334 })
        ));
        assert!(PwmActuator::new(RecordingPwmPort::new(), 50, 0.0).is_ok());
        assert!(PwmActuator::new(RecordingPwmPort::new(), 333, 0.0).is_ok());
    }

    #[test]
    fn test_center_duty_at_50hz() {
        let port = RecordingPwmPort::new();
        let log = port.log();
        let servo = PwmActuator::new(port, 50, 0.0).unwrap();
        servo.actuate(Wait::NonBlocking).unwrap();

        // 20ms 周期内 1500µs 脉宽 → 1500/20000 * 16383 ≈ 1229
        assert_eq!(log.lock().as_slice(), &[1229]);
    }

    #[test]
    fn test_offset_applied_and_clamped() {
        let port = RecordingPwmPort::new();
        let servo = PwmActuator::new(port, 50, 0.5).unwrap();
        servo.set_target(0.8);
        assert!((servo.target() - 1.0).abs() < 1e-6);
        servo.set_target(-0.8);
        assert!((servo.target() - (-0.3)).abs() < 1e-6);
    }

    #[test]
    fn test_full_scale_duty_bounds() {
        let port = RecordingPwmPort::new();
        let log = port.log();
        let servo = PwmActuator::new(port, 50, 0.0).unwrap();

        servo.set_target(1.0);
        servo.actuate(Wait::NonBlocking).unwrap();
        servo.set_target(-1.0);
        servo.actuate(Wait::NonBlocking).unwrap();

        let duties = log.lock().clone();
        // 2500µs / 20000µs 与 500µs / 20000µs
        assert_eq!(duties, vec![2048, 410]);
    }
}

//! SPI 位图舵机输出
//!
//! 把 3000 µs 的波形周期按 SPI 时钟逐位展开成字节缓冲区：
//! 脉宽对应的位全部置 1，其余位为 0，整帧一次写出。
//! 位序为每字节 LSB 在前。

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{Actuator, ActuatorError, PortError, SpiPort, Wait, clamp_target, target_to_pulse_us};

/// 波形周期（µs）
const PERIOD_US: u64 = 3000;

/// 缓冲区下限（字节）
const MIN_BUFFER_LEN: usize = 256;

struct Inner<P> {
    port: P,
    target: f32,
    buffer: Vec<u8>,
}

/// SPI 舵机
pub struct SpiActuator<P: SpiPort> {
    inner: Mutex<Inner<P>>,
    offset: f32,
    clock_hz: u32,
    period_bits: usize,
}

impl<P: SpiPort> SpiActuator<P> {
    /// 构造并初始化共享 SPI 总线
    ///
    /// 缓冲区按周期位数的 1.5 倍预留、且不小于 256 字节。
    /// 总线已被其他实例初始化时不视为错误。
    pub fn new(mut port: P, clock_hz: u32, offset: f32) -> Result<Self, ActuatorError> {
        if clock_hz == 0 {
            return Err(ActuatorError::InvalidClock { hz: clock_hz });
        }

        match port.init() {
            Ok(()) => {},
            Err(PortError::AlreadyInitialized) => {
                debug!("SPI bus already initialized, sharing existing bus");
            },
            Err(e) => return Err(e.into()),
        }

        let period_bits = (PERIOD_US * clock_hz as u64 / 1_000_000) as usize;
        let buffer_len = (period_bits * 3 / 2).div_ceil(8).max(MIN_BUFFER_LEN);

        Ok(Self {
            inner: Mutex::new(Inner {
                port,
                target: 0.0,
                buffer: vec![0u8; buffer_len],
            }),
            offset,
            clock_hz,
            period_bits,
        })
    }

    /// 周期内的总位数
    pub fn period_bits(&self) -> usize {
        self.period_bits
    }
}

impl<P: SpiPort> Actuator for SpiActuator<P> {
    fn set_target(&self, value: f32) {
        self.inner.lock().target = clamp_target(value, self.offset);
    }

    fn actuate(&self, wait: Wait) -> Result<(), ActuatorError> {
        let mut inner = self.inner.lock();

        let pulse_us = target_to_pulse_us(inner.target) as u64;
        let high_bits = (pulse_us * self.clock_hz as u64 / 1_000_000) as usize;
        let frame_bytes = self.period_bits.div_ceil(8);

        // 波形超出缓冲区时整帧放弃，不写出截断的波形
        if frame_bytes > inner.buffer.len() {
            return Err(ActuatorError::FrameTooLarge {
                required: frame_bytes,
                capacity: inner.buffer.len(),
            });
        }

        inner.buffer[..frame_bytes].fill(0);
        for bit in 0..high_bits.min(self.period_bits) {
            inner.buffer[bit / 8] |= 1 << (bit % 8);
        }

        trace!(
            "spi actuate: target={}, high_bits={}, frame_bytes={}",
            inner.target, high_bits, frame_bytes
        );

        let Inner { port, buffer, .. } = &mut *inner;
        port.write(&buffer[..frame_bytes], wait)?;
        Ok(())
    }

    fn target(&self) -> f32 {
        self.inner.lock().target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSpiPort;

    #[test]
    fn test_zero_clock_rejected() {
        assert!(matches!(
            SpiActuator::new(RecordingSpiPort::new(), 0, 0.0),
            Err(ActuatorError::InvalidClock { hz: 0 })
        ));
    }

    #[test]
    fn test_buffer_floor_256_bytes() {
        // 100 kHz 时钟：3000µs → 300 位，1.5 倍后仍远小于 256 字节
        let servo = SpiActuator::new(RecordingSpiPort::new(), 100_000, 0.0).unwrap();
        assert_eq!(servo.period_bits(), 300);
    }

    #[test]
    fn test_center_pulse_bit_pattern() {
        // 1 MHz：1 位 = 1µs，中位 1500µs → 前 1500 位为 1
        let port = RecordingSpiPort::new();
        let log = port.log();
        let servo = SpiActuator::new(port, 1_000_000, 0.0).unwrap();
        servo.actuate(Wait::NonBlocking).unwrap();

        let frames = log.lock();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        // 3000 位 → 375 字节
        assert_eq!(frame.len(), 375);
        // 前 1500 位（187.5 字节）为 1
        assert_eq!(frame[0], 0xFF);
        assert_eq!(frame[186], 0xFF);
        // 第 187 字节：低 4 位（位 1496-1499）为 1
        assert_eq!(frame[187], 0x0F);
        assert_eq!(frame[188], 0x00);
        assert_eq!(frame[374], 0x00);
    }

    #[test]
    fn test_already_initialized_bus_tolerated() {
        let mut port = RecordingSpiPort::new();
        port.mark_initialized();
        assert!(SpiActuator::new(port, 1_000_000, 0.0).is_ok());
    }

    #[test]
    fn test_full_negative_pulse() {
        let port = RecordingSpiPort::new();
        let log = port.log();
        let servo = SpiActuator::new(port, 1_000_000, 0.0).unwrap();
        servo.set_target(-1.0);
        servo.actuate(Wait::NonBlocking).unwrap();

        let frames = log.lock();
        let frame = &frames[0];
        // 500µs → 前 500 位为 1（62.5 字节）
        assert_eq!(frame[61], 0xFF);
        assert_eq!(frame[62], 0x0F);
        assert_eq!(frame[63], 0x00);
    }
}

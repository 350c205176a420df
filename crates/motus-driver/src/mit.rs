//! MIT 总线驱动（力控方言）
//!
//! MIT 方言是同步的请求/应答：控制帧发出后电机立刻回状态帧，
//! 不需要后台接收线程。适配器整体持一把锁，发送与等应答在同一
//! 临界区内完成，天然避免应答错配。

use std::time::Duration;

use motus_can::{CanAdapter, CanError, MotusFrame};
use motus_protocol::mit::{
    self, MitAxisState, MotorControl, MotorStatus, clear_errors_frame, control_frame,
    fault_description, get_error_frame, set_axis_state_frame, set_position_frame, unpack_fault_code,
    unpack_status,
};
use motus_protocol::{can_id, ctw::check_node_id};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::DriverError;

/// MIT 总线
pub struct MitBus {
    adapter: Mutex<Box<dyn CanAdapter>>,
    response_timeout: Duration,
}

impl MitBus {
    pub fn new(adapter: impl CanAdapter + 'static, response_timeout: Duration) -> Self {
        Self {
            adapter: Mutex::new(Box::new(adapter)),
            response_timeout,
        }
    }

    /// 动态控制（fire-and-forget，不收应答）
    pub fn dynamic_control(&self, node_id: u8, control: &MotorControl) -> Result<(), DriverError> {
        check_node_id(node_id)?;
        self.adapter.lock().send(control_frame(node_id, control))?;
        Ok(())
    }

    /// 动态控制并等待状态应答
    ///
    /// 应答节点号与请求不一致视为无效应答。
    pub fn dynamic_control_with_response(
        &self,
        node_id: u8,
        control: &MotorControl,
    ) -> Result<MotorStatus, DriverError> {
        check_node_id(node_id)?;
        let mut adapter = self.adapter.lock();
        adapter.send(control_frame(node_id, control))?;

        let frame = self.await_response(&mut **adapter, node_id)?;
        let status = unpack_status(frame.data_slice()).map_err(|e| {
            DriverError::InvalidResponse {
                node_id,
                detail: e.to_string(),
            }
        })?;

        if status.node_id != node_id {
            return Err(DriverError::InvalidResponse {
                node_id,
                detail: format!("status frame from node {}", status.node_id),
            });
        }
        Ok(status)
    }

    /// 读取故障字
    pub fn get_fault(&self, node_id: u8) -> Result<u64, DriverError> {
        check_node_id(node_id)?;
        let mut adapter = self.adapter.lock();
        adapter.send(get_error_frame(node_id))?;

        let frame = self.await_cmd(&mut **adapter, node_id, mit::cmd::GET_ERROR)?;
        let fault = unpack_fault_code(frame.data_slice()).map_err(|e| {
            DriverError::InvalidResponse {
                node_id,
                detail: e.to_string(),
            }
        })?;

        if fault != mit::fault::NONE {
            warn!("node {} fault: {}", node_id, fault_description(fault));
        }
        Ok(fault)
    }

    /// 清除故障
    pub fn clear_fault(&self, node_id: u8) -> Result<(), DriverError> {
        check_node_id(node_id)?;
        self.adapter.lock().send(clear_errors_frame(node_id))?;
        Ok(())
    }

    /// 进入闭环控制
    pub fn start_motor(&self, node_id: u8) -> Result<(), DriverError> {
        self.set_axis_state(node_id, MitAxisState::ClosedLoopControl)
    }

    /// 回到空闲
    pub fn stop_motor(&self, node_id: u8) -> Result<(), DriverError> {
        self.set_axis_state(node_id, MitAxisState::Idle)
    }

    /// 设置轴状态
    pub fn set_axis_state(&self, node_id: u8, state: MitAxisState) -> Result<(), DriverError> {
        check_node_id(node_id)?;
        self.adapter.lock().send(set_axis_state_frame(node_id, state))?;
        Ok(())
    }

    /// 覆写当前位置计数（机械零点标定）
    pub fn set_position(&self, node_id: u8, position: f32) -> Result<(), DriverError> {
        check_node_id(node_id)?;
        self.adapter.lock().send(set_position_frame(node_id, position))?;
        Ok(())
    }

    /// 等待指定节点的控制状态应答，丢弃无关帧
    fn await_response(
        &self,
        adapter: &mut dyn CanAdapter,
        node_id: u8,
    ) -> Result<MotusFrame, DriverError> {
        self.await_cmd(adapter, node_id, mit::cmd::MIT_CONTROL)
    }

    fn await_cmd(
        &self,
        adapter: &mut dyn CanAdapter,
        node_id: u8,
        cmd_id: u8,
    ) -> Result<MotusFrame, DriverError> {
        let expected = can_id(node_id, cmd_id) as u32;
        let deadline = std::time::Instant::now() + self.response_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::Timeout {
                    node_id,
                    timeout_ms: self.response_timeout.as_millis() as u64,
                });
            }
            match adapter.receive_timeout(remaining) {
                Ok(frame) if frame.id == expected => return Ok(frame),
                Ok(frame) => {
                    debug!("ignoring unrelated frame 0x{:X} while awaiting node {}", frame.id, node_id);
                },
                Err(CanError::Timeout) => {
                    return Err(DriverError::Timeout {
                        node_id,
                        timeout_ms: self.response_timeout.as_millis() as u64,
                    });
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_can::mock::mock_bus_pair;
    use motus_protocol::mit::{position_to_int, velocity_to_int};

    fn bus_with_device() -> (MitBus, motus_can::mock::MockCanAdapter) {
        let (host, device) = mock_bus_pair();
        (MitBus::new(host, Duration::from_millis(100)), device)
    }

    #[test]
    fn test_dynamic_control_frame_on_wire() {
        let (bus, mut device) = bus_with_device();
        let control = MotorControl {
            position: 1.0,
            velocity: 0.0,
            kp: 100.0,
            kd: 1.0,
            torque: 0.0,
        };
        bus.dynamic_control(2, &control).unwrap();

        let frame = device.receive_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.id, can_id(2, mit::cmd::MIT_CONTROL) as u32);
        let pos = position_to_int(1.0);
        assert_eq!(frame.data[0], (pos >> 8) as u8);
        assert_eq!(frame.data[1], (pos & 0xFF) as u8);
    }

    #[test]
    fn test_control_with_response_roundtrip() {
        let (bus, mut device) = bus_with_device();

        let responder = std::thread::spawn(move || {
            let _request = device.receive_timeout(Duration::from_secs(1)).unwrap();
            // 状态帧：b0 节点号，b1-2 位置，b3-4 速度/力矩 nibble 混排，b5 力矩低字节
            let pos = position_to_int(0.5);
            let vel = velocity_to_int(0.0) as u16;
            let torque = 2048u16;
            let data = [
                3,
                (pos >> 8) as u8,
                (pos & 0xFF) as u8,
                (vel >> 4) as u8,
                (((vel & 0xF) << 4) as u8) | ((torque >> 8) as u8 & 0xF),
                (torque & 0xFF) as u8,
            ];
            device
                .send(MotusFrame::new_standard(can_id(3, mit::cmd::MIT_CONTROL), &data))
                .unwrap();
            device
        });

        let status = bus
            .dynamic_control_with_response(3, &MotorControl::default())
            .unwrap();
        assert_eq!(status.node_id, 3);
        // 位置反解带 2 倍系数（协议层按设备实测行为实现）
        assert!((status.position - 1.0).abs() < 0.01);
        responder.join().unwrap();
    }

    #[test]
    fn test_node_mismatch_is_invalid_response() {
        let (bus, mut device) = bus_with_device();

        let responder = std::thread::spawn(move || {
            let _request = device.receive_timeout(Duration::from_secs(1)).unwrap();
            // CAN ID 是节点 4，载荷却声称节点 7
            let data = [7, 0, 0, 0, 0, 0];
            device
                .send(MotusFrame::new_standard(can_id(4, mit::cmd::MIT_CONTROL), &data))
                .unwrap();
            device
        });

        let err = bus
            .dynamic_control_with_response(4, &MotorControl::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidResponse { node_id: 4, .. }));
        responder.join().unwrap();
    }

    #[test]
    fn test_get_fault_parses_big_endian_word() {
        let (bus, mut device) = bus_with_device();

        let responder = std::thread::spawn(move || {
            let _request = device.receive_timeout(Duration::from_secs(1)).unwrap();
            let data = mit::fault::CURRENT_LIMIT_VIOLATION.to_be_bytes();
            device
                .send(MotusFrame::new_standard(can_id(1, mit::cmd::GET_ERROR), &data))
                .unwrap();
            device
        });

        let fault = bus.get_fault(1).unwrap();
        assert_eq!(fault, mit::fault::CURRENT_LIMIT_VIOLATION);
        responder.join().unwrap();
    }

    #[test]
    fn test_response_timeout() {
        let (host, _device) = mock_bus_pair();
        let bus = MitBus::new(host, Duration::from_millis(10));
        let err = bus
            .dynamic_control_with_response(1, &MotorControl::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { node_id: 1, .. }));
    }
}

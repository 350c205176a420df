//! CTW 总线驱动（CANsimple/SDO 方言）
//!
//! 发送、反馈缓存、统计三类状态各自持锁，互不嵌套：
//! - `tx`：发送半端，所有写帧串行化
//! - `feedback`：反馈缓存，后台分类线程唯一写入
//! - `stats`：总线占用统计
//!
//! endpoint 读是总线上唯一的请求/应答路径：注册等待槽 → 发请求 →
//! 等分类线程投递应答。写全部 fire-and-forget。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use motus_can::{MotusFrame, SplittableAdapter, TxAdapter};
use motus_protocol::ctw::{
    self, AxisState, ControllerMode, InputMode, check_node_id, clear_errors_frame, endpoint,
    endpoint_read_request, endpoint_write_f32, parse_encoder_estimates, set_axis_state_frame,
    set_controller_mode_frame, set_input_torque_frame, set_input_vel_frame, unpack_endpoint,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::feedback::{FeedbackCache, MotorFeedback};
use crate::stats::BusStats;
use crate::subscriber::FeedbackSubscriber;
use crate::DriverError;

/// CTW 总线配置
#[derive(Debug, Clone)]
pub struct CtwConfig {
    /// 名义波特率（bit/s），用于占用率统计
    pub bitrate: u32,
    /// endpoint 读超时
    pub read_timeout: Duration,
}

impl Default for CtwConfig {
    fn default() -> Self {
        Self {
            bitrate: 1_000_000,
            read_timeout: Duration::from_millis(10),
        }
    }
}

/// 在途的 endpoint 读请求（同一时刻至多一个）
struct PendingRead {
    node_id: u8,
    endpoint_id: u16,
    reply: Sender<MotusFrame>,
}

/// CTW 总线
pub struct CtwBus {
    tx: Mutex<Box<dyn TxAdapter>>,
    feedback: Arc<Mutex<FeedbackCache>>,
    pending: Arc<Mutex<Option<PendingRead>>>,
    stats: Arc<Mutex<BusStats>>,
    subscriber: FeedbackSubscriber,
    config: CtwConfig,
    consecutive_timeouts: AtomicU32,
}

impl CtwBus {
    /// 在适配器上启动总线：拆分收发两端并启动后台分类线程
    pub fn new<A>(adapter: A, config: CtwConfig) -> Result<Self, DriverError>
    where
        A: SplittableAdapter,
        A::RxAdapter: 'static,
        A::TxAdapter: 'static,
    {
        let (rx, tx) = adapter.split()?;

        let feedback = Arc::new(Mutex::new(FeedbackCache::new()));
        let pending: Arc<Mutex<Option<PendingRead>>> = Arc::new(Mutex::new(None));
        let stats = Arc::new(Mutex::new(BusStats::new()));

        let fb = Arc::clone(&feedback);
        let pd = Arc::clone(&pending);
        let st = Arc::clone(&stats);
        let bitrate = config.bitrate;

        let subscriber = FeedbackSubscriber::spawn(rx, move |frame| {
            {
                let mut stats = st.lock();
                stats.record_received(frame);
                stats.maybe_report(bitrate);
            }
            classify_frame(frame, &fb, &pd);
        });

        Ok(Self {
            tx: Mutex::new(Box::new(tx)),
            feedback,
            pending,
            stats,
            subscriber,
            config,
            consecutive_timeouts: AtomicU32::new(0),
        })
    }

    /// 停止后台接收线程
    pub fn shutdown(&mut self) {
        self.subscriber.stop();
    }

    fn send_frame(&self, frame: MotusFrame) -> Result<(), DriverError> {
        self.tx.lock().send(frame)?;
        let mut stats = self.stats.lock();
        stats.record_sent(&frame);
        stats.maybe_report(self.config.bitrate);
        Ok(())
    }

    /// 读取 endpoint 值（阻塞，带超时）
    ///
    /// 超时是正常返回，不会影响总线状态；连续超时只在第一次
    /// 以 warn 级别记录，其余降为 debug。
    pub fn read_endpoint(
        &self,
        node_id: u8,
        endpoint_id: u16,
        value_size: usize,
    ) -> Result<Vec<u8>, DriverError> {
        check_node_id(node_id)?;

        let (reply_tx, reply_rx) = bounded(1);
        *self.pending.lock() = Some(PendingRead {
            node_id,
            endpoint_id,
            reply: reply_tx,
        });

        if let Err(e) = self.send_frame(endpoint_read_request(node_id, endpoint_id)?) {
            *self.pending.lock() = None;
            return Err(e);
        }

        match reply_rx.recv_timeout(self.config.read_timeout) {
            Ok(frame) => {
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                let (eid, value) = unpack_endpoint(frame.data_slice(), value_size)
                    .map_err(|e| DriverError::InvalidResponse {
                        node_id,
                        detail: e.to_string(),
                    })?;
                if eid != endpoint_id {
                    return Err(DriverError::InvalidResponse {
                        node_id,
                        detail: format!("endpoint mismatch: requested {endpoint_id}, got {eid}"),
                    });
                }
                Ok(value.to_vec())
            },
            Err(_) => {
                *self.pending.lock() = None;
                let misses = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed);
                if misses == 0 {
                    warn!(
                        "endpoint read timed out: node {}, endpoint {}",
                        node_id, endpoint_id
                    );
                } else {
                    debug!(
                        "endpoint read timed out again ({}x): node {}, endpoint {}",
                        misses + 1,
                        node_id,
                        endpoint_id
                    );
                }
                Err(DriverError::Timeout {
                    node_id,
                    timeout_ms: self.config.read_timeout.as_millis() as u64,
                })
            },
        }
    }

    /// 读取 f32 endpoint
    pub fn read_endpoint_f32(&self, node_id: u8, endpoint_id: u16) -> Result<f32, DriverError> {
        let value = self.read_endpoint(node_id, endpoint_id, 4)?;
        Ok(f32::from_le_bytes([value[0], value[1], value[2], value[3]]))
    }

    /// 读取单字节 endpoint
    pub fn read_endpoint_u8(&self, node_id: u8, endpoint_id: u16) -> Result<u8, DriverError> {
        let value = self.read_endpoint(node_id, endpoint_id, 1)?;
        Ok(value[0])
    }

    /// 位置指令（fire-and-forget）
    pub fn set_position(&self, node_id: u8, position: f32) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_INPUT_POS,
            position,
        )?)
    }

    /// 速度指令
    pub fn set_velocity(&self, node_id: u8, velocity: f32) -> Result<(), DriverError> {
        self.send_frame(set_input_vel_frame(node_id, velocity)?)
    }

    /// 力矩指令
    pub fn set_torque(&self, node_id: u8, torque: f32) -> Result<(), DriverError> {
        self.send_frame(set_input_torque_frame(node_id, torque)?)
    }

    /// 设置轴状态
    pub fn set_axis_state(&self, node_id: u8, state: AxisState) -> Result<(), DriverError> {
        debug!("node {}: requesting axis state {}", node_id, state.name());
        self.send_frame(set_axis_state_frame(node_id, state)?)
    }

    /// 进入闭环控制
    pub fn start_motor(&self, node_id: u8) -> Result<(), DriverError> {
        self.set_axis_state(node_id, AxisState::ClosedLoopControl)
    }

    /// 回到空闲
    pub fn stop_motor(&self, node_id: u8) -> Result<(), DriverError> {
        self.set_axis_state(node_id, AxisState::Idle)
    }

    /// 设置控制器模式与输入模式
    pub fn set_controller_mode(
        &self,
        node_id: u8,
        control_mode: ControllerMode,
        input_mode: InputMode,
    ) -> Result<(), DriverError> {
        self.send_frame(set_controller_mode_frame(node_id, control_mode, input_mode)?)
    }

    /// 设置输入滤波带宽（Hz）
    pub fn set_filter_bandwidth(&self, node_id: u8, bandwidth: f32) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_INPUT_FILTER_BANDWIDTH,
            bandwidth,
        )?)
    }

    /// 写位置环增益（kp / ki / kd）
    pub fn set_position_gains(
        &self,
        node_id: u8,
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_POS_GAIN,
            kp,
        )?)?;
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_POS_INTEGRATOR_GAIN,
            ki,
        )?)?;
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_POS_DIFF_GAIN,
            kd,
        )?)
    }

    /// 写速度环增益（kp / ki / kd）
    pub fn set_velocity_gains(
        &self,
        node_id: u8,
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_VEL_GAIN,
            kp,
        )?)?;
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_VEL_INTEGRATOR_GAIN,
            ki,
        )?)?;
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_VEL_DIFF_GAIN,
            kd,
        )?)
    }

    /// 写位置积分限幅
    pub fn set_position_integrator_limit(
        &self,
        node_id: u8,
        limit: f32,
    ) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_POS_INTEGRATOR_LIMIT,
            limit,
        )?)
    }

    /// 写速度限幅
    pub fn set_velocity_limit(&self, node_id: u8, limit: f32) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_VEL_LIMIT,
            limit,
        )?)
    }

    /// 写电机电流限幅
    pub fn set_current_limit(&self, node_id: u8, limit: f32) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::MOTOR_CONFIG_CURRENT_LIMIT,
            limit,
        )?)
    }

    /// 写转动惯量前馈
    pub fn set_inertia(&self, node_id: u8, inertia: f32) -> Result<(), DriverError> {
        self.send_frame(endpoint_write_f32(
            node_id,
            endpoint::CONTROLLER_CONFIG_INERTIA,
            inertia,
        )?)
    }

    /// 清除电机错误
    pub fn clear_errors(&self, node_id: u8) -> Result<(), DriverError> {
        self.send_frame(clear_errors_frame(node_id)?)
    }

    /// 缓存反馈快照（不触发总线流量）
    pub fn get_cached_feedback(&self, node_id: u8) -> Option<MotorFeedback> {
        self.feedback.lock().get(node_id)
    }

    /// 主动刷新反馈：逐项 endpoint 读位置/速度/状态
    ///
    /// 上电状态读取失败只告警，不阻止返回其余数据。
    pub fn get_feedback(&self, node_id: u8) -> Result<MotorFeedback, DriverError> {
        let position = self.read_endpoint_f32(node_id, endpoint::ENCODER_POS_ESTIMATE)?;
        let velocity = self.read_endpoint_f32(node_id, endpoint::ENCODER_VEL_ESTIMATE)?;
        let axis_state = self.read_endpoint_u8(node_id, endpoint::AXIS_CURRENT_STATE)?;

        let armed = match self.read_endpoint_u8(node_id, endpoint::AXIS_MOTOR_IS_ARMED) {
            Ok(v) => Some(v != 0),
            Err(e) => {
                warn!("node {}: motor armed read failed: {}", node_id, e);
                None
            },
        };

        let mut cache = self.feedback.lock();
        cache.update(node_id, |fb| {
            fb.position = position;
            fb.velocity = velocity;
            fb.axis_state = axis_state;
            if let Some(armed) = armed {
                fb.motor_armed = armed;
            }
        });
        cache
            .get(node_id)
            .ok_or_else(|| DriverError::InvalidResponse {
                node_id,
                detail: "node id out of range".to_string(),
            })
    }
}

/// 后台分类：按命令号把帧路由到缓存和等待槽
fn classify_frame(
    frame: &MotusFrame,
    feedback: &Mutex<FeedbackCache>,
    pending: &Mutex<Option<PendingRead>>,
) {
    if frame.is_extended {
        debug!("ignoring extended frame 0x{:X} on CTW bus", frame.id);
        return;
    }

    let node_id = frame.node_id();
    let cmd_id = frame.cmd_id();

    match cmd_id {
        ctw::cmd::GET_ENCODER_ESTIMATES => match parse_encoder_estimates(frame) {
            Ok((pos, vel)) => {
                feedback.lock().update(node_id, |fb| {
                    fb.position = pos;
                    fb.velocity = vel;
                    fb.last_update_us = frame.timestamp_us;
                });
            },
            Err(e) => debug!("bad encoder estimate frame from node {}: {}", node_id, e),
        },
        ctw::cmd::TX_SDO => {
            let data = frame.data_slice();
            if data.len() < 3 {
                debug!("short SDO response from node {}", node_id);
                return;
            }
            let eid = u16::from_le_bytes([data[1], data[2]]);

            // 已知的反馈类 endpoint 顺带写入缓存
            match eid {
                endpoint::ENCODER_POS_ESTIMATE if data.len() >= 8 => {
                    let pos = f32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                    feedback.lock().update(node_id, |fb| {
                        fb.position = pos;
                        fb.last_update_us = frame.timestamp_us;
                    });
                },
                endpoint::ENCODER_VEL_ESTIMATE if data.len() >= 8 => {
                    let vel = f32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                    feedback.lock().update(node_id, |fb| {
                        fb.velocity = vel;
                        fb.last_update_us = frame.timestamp_us;
                    });
                },
                endpoint::AXIS_CURRENT_STATE if data.len() >= 5 => {
                    feedback.lock().update(node_id, |fb| fb.axis_state = data[4]);
                },
                endpoint::AXIS_MOTOR_IS_ARMED if data.len() >= 5 => {
                    feedback.lock().update(node_id, |fb| fb.motor_armed = data[4] != 0);
                },
                _ => {},
            }

            // 投递给等待中的读请求
            let mut slot = pending.lock();
            let matched = slot
                .as_ref()
                .is_some_and(|p| p.node_id == node_id && p.endpoint_id == eid);
            if matched && let Some(p) = slot.take() {
                let _ = p.reply.send(*frame);
            }
        },
        ctw::cmd::HEARTBEAT | ctw::cmd::GET_IQ => {},
        other => {
            debug!("unhandled CTW frame: node {}, cmd 0x{:02X}", node_id, other);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_can::mock::{MockCanAdapter, mock_bus_pair};
    use motus_can::CanAdapter;
    use motus_protocol::can_id;

    fn bus_with_device() -> (CtwBus, MockCanAdapter) {
        let (host, device) = mock_bus_pair();
        let config = CtwConfig {
            bitrate: 1_000_000,
            read_timeout: Duration::from_millis(50),
        };
        (CtwBus::new(host, config).unwrap(), device)
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while !cond() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_encoder_broadcast_updates_cache() {
        let (bus, mut device) = bus_with_device();

        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&2.5f32.to_le_bytes());
        data[4..].copy_from_slice(&(-1.0f32).to_le_bytes());
        device
            .send(MotusFrame::new_standard(
                can_id(3, ctw::cmd::GET_ENCODER_ESTIMATES),
                &data,
            ))
            .unwrap();

        wait_for(|| bus.get_cached_feedback(3).unwrap().position == 2.5);
        let fb = bus.get_cached_feedback(3).unwrap();
        assert_eq!(fb.position, 2.5);
        assert_eq!(fb.velocity, -1.0);
    }

    #[test]
    fn test_read_endpoint_roundtrip() {
        let (bus, mut device) = bus_with_device();

        // 仿真设备：应答一次位置 endpoint 读
        let responder = std::thread::spawn(move || {
            let request = device.receive_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(request.id, can_id(2, ctw::cmd::TX_SDO) as u32);
            assert_eq!(request.data[0], ctw::ENDPOINT_OPCODE_READ);

            let mut data = [0u8; 8];
            data[1..3].copy_from_slice(&endpoint::ENCODER_POS_ESTIMATE.to_le_bytes());
            data[4..8].copy_from_slice(&3.75f32.to_le_bytes());
            device
                .send(MotusFrame::new_standard(can_id(2, ctw::cmd::TX_SDO), &data))
                .unwrap();
            device
        });

        let pos = bus.read_endpoint_f32(2, endpoint::ENCODER_POS_ESTIMATE).unwrap();
        assert_eq!(pos, 3.75);
        // 应答顺带进了缓存
        assert_eq!(bus.get_cached_feedback(2).unwrap().position, 3.75);
        responder.join().unwrap();
    }

    #[test]
    fn test_short_response_is_invalid() {
        let (bus, mut device) = bus_with_device();

        let responder = std::thread::spawn(move || {
            let _request = device.receive_timeout(Duration::from_secs(1)).unwrap();
            // 6 字节应答：对 4 字节数值不够长
            let mut data = [0u8; 6];
            data[1..3].copy_from_slice(&endpoint::ENCODER_POS_ESTIMATE.to_le_bytes());
            device
                .send(MotusFrame::new_standard(can_id(1, ctw::cmd::TX_SDO), &data))
                .unwrap();
            device
        });

        let err = bus.read_endpoint_f32(1, endpoint::ENCODER_POS_ESTIMATE).unwrap_err();
        assert!(matches!(err, DriverError::InvalidResponse { node_id: 1, .. }));
        responder.join().unwrap();
    }

    #[test]
    fn test_timed_out_read_leaves_cache_unchanged() {
        let (bus, _device) = bus_with_device();

        let before = bus.get_cached_feedback(4).unwrap();
        let err = bus.read_endpoint_f32(4, endpoint::ENCODER_POS_ESTIMATE).unwrap_err();
        assert!(matches!(err, DriverError::Timeout { node_id: 4, .. }));
        assert_eq!(bus.get_cached_feedback(4).unwrap(), before);
    }

    #[test]
    fn test_set_position_frame_on_wire() {
        let (bus, mut device) = bus_with_device();

        bus.set_position(5, 0.125).unwrap();

        let frame = device.receive_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.id, can_id(5, ctw::cmd::RX_SDO) as u32);
        assert_eq!(frame.data[0], ctw::ENDPOINT_OPCODE_WRITE);
        assert_eq!(
            u16::from_le_bytes([frame.data[1], frame.data[2]]),
            endpoint::CONTROLLER_INPUT_POS
        );
        assert_eq!(&frame.data[4..8], &0.125f32.to_le_bytes());
    }

    #[test]
    fn test_start_stop_motor_states() {
        let (bus, mut device) = bus_with_device();

        bus.start_motor(1).unwrap();
        let frame = device.receive_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.id, can_id(1, ctw::cmd::SET_AXIS_STATE) as u32);
        assert_eq!(frame.data[0], 8);

        bus.stop_motor(1).unwrap();
        let frame = device.receive_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.data[0], 1);
    }

    #[test]
    fn test_invalid_node_rejected() {
        let (bus, _device) = bus_with_device();
        assert!(bus.set_position(0, 0.0).is_err());
        assert!(bus.set_position(9, 0.0).is_err());
    }
}

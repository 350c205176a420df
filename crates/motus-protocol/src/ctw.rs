//! CTW 协议：CANsimple 派生的电机控制方言
//!
//! 标准 11 位 CAN ID = `(node_id << 5) | cmd_id`，节点号 1-8。
//! 在直达命令帧之外，协议带一套 SteadyWin 风格的 SDO endpoint 读写：
//! byte0 操作码（0=读 1=写），bytes1-2 小端 endpoint ID，byte3 保留，
//! bytes4-7 数值（至多 4 字节）。写走 RxSDO (CmdID 0x04) 不等应答，
//! 读发 TxSDO 请求 (CmdID 0x05) 后阻塞等待同命令号的应答帧。

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{MotusFrame, ProtocolError, can_id};

/// CTW 命令号（CAN ID 低 5 位）
pub mod cmd {
    /// 心跳广播（接收侧忽略）
    pub const HEARTBEAT: u8 = 0x01;
    /// RxSDO endpoint 写；同一命令号也承载直达速度指令
    pub const RX_SDO: u8 = 0x04;
    /// TxSDO endpoint 读请求/应答；同一命令号也承载直达力矩指令
    pub const TX_SDO: u8 = 0x05;
    /// 设置轴状态（bytes0-3: 状态 u32 小端）
    pub const SET_AXIS_STATE: u8 = 0x07;
    /// 编码器估计广播（bytes0-3 位置，bytes4-7 速度，f32 小端）
    pub const GET_ENCODER_ESTIMATES: u8 = 0x09;
    /// Iq 电流广播（接收侧忽略）
    pub const GET_IQ: u8 = 0x0A;
    /// 设置控制器模式（bytes0-3 控制模式，bytes4-7 输入模式，u32 小端）
    pub const SET_CONTROLLER_MODE: u8 = 0x0B;
}

/// SDO endpoint 地址（ODrive 0.6.0 endpoint 表的使用子集）
pub mod endpoint {
    pub const AXIS_CURRENT_STATE: u16 = 141;
    pub const AXIS_MOTOR_IS_ARMED: u16 = 193;
    pub const MOTOR_CONFIG_CURRENT_LIMIT: u16 = 248;
    pub const CONTROLLER_INPUT_POS: u16 = 268;
    pub const CONTROLLER_CONFIG_POS_GAIN: u16 = 289;
    pub const CONTROLLER_CONFIG_POS_INTEGRATOR_GAIN: u16 = 290;
    pub const CONTROLLER_CONFIG_POS_INTEGRATOR_LIMIT: u16 = 291;
    pub const CONTROLLER_CONFIG_POS_DIFF_GAIN: u16 = 292;
    pub const CONTROLLER_CONFIG_VEL_GAIN: u16 = 293;
    pub const CONTROLLER_CONFIG_VEL_INTEGRATOR_GAIN: u16 = 294;
    pub const CONTROLLER_CONFIG_VEL_INTEGRATOR_LIMIT: u16 = 295;
    pub const CONTROLLER_CONFIG_VEL_DIFF_GAIN: u16 = 296;
    pub const CONTROLLER_CONFIG_VEL_LIMIT: u16 = 297;
    pub const CONTROLLER_CONFIG_INERTIA: u16 = 305;
    pub const CONTROLLER_CONFIG_INPUT_FILTER_BANDWIDTH: u16 = 310;
    pub const ENCODER_POS_ESTIMATE: u16 = 349;
    pub const ENCODER_VEL_ESTIMATE: u16 = 355;
    /// 写此 endpoint（无数值）清除电机错误
    pub const CLEAR_ERRORS: u16 = 0x1E0;
}

/// endpoint 帧操作码：读
pub const ENDPOINT_OPCODE_READ: u8 = 0;
/// endpoint 帧操作码：写
pub const ENDPOINT_OPCODE_WRITE: u8 = 1;

/// 合法节点号范围 1..=8
pub const MAX_NODE_ID: u8 = 8;

/// 校验节点号（1-8）
pub fn check_node_id(node_id: u8) -> Result<(), ProtocolError> {
    if (1..=MAX_NODE_ID).contains(&node_id) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidValue {
            field: "node_id".to_string(),
            value: node_id,
        })
    }
}

/// 轴状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AxisState {
    Undefined = 0,
    Idle = 1,
    StartupSequence = 2,
    FullCalibrationSequence = 3,
    MotorCalibration = 4,
    SensorlessControl = 5,
    EncoderIndexSearch = 6,
    EncoderOffsetCalibration = 7,
    ClosedLoopControl = 8,
    LockinSpin = 9,
    EncoderDirFind = 10,
    Homing = 11,
    EncoderHallPolarityCalibration = 12,
    EncoderHallPhaseCalibration = 13,
}

impl AxisState {
    /// 状态的可读名称（用于日志）
    pub fn name(self) -> &'static str {
        match self {
            AxisState::Undefined => "UNDEFINED",
            AxisState::Idle => "IDLE",
            AxisState::StartupSequence => "STARTUP_SEQUENCE",
            AxisState::FullCalibrationSequence => "FULL_CALIBRATION_SEQUENCE",
            AxisState::MotorCalibration => "MOTOR_CALIBRATION",
            AxisState::SensorlessControl => "SENSORLESS_CONTROL",
            AxisState::EncoderIndexSearch => "ENCODER_INDEX_SEARCH",
            AxisState::EncoderOffsetCalibration => "ENCODER_OFFSET_CALIBRATION",
            AxisState::ClosedLoopControl => "CLOSED_LOOP_CONTROL",
            AxisState::LockinSpin => "LOCKIN_SPIN",
            AxisState::EncoderDirFind => "ENCODER_DIR_FIND",
            AxisState::Homing => "HOMING",
            AxisState::EncoderHallPolarityCalibration => "ENCODER_HALL_POLARITY_CALIBRATION",
            AxisState::EncoderHallPhaseCalibration => "ENCODER_HALL_PHASE_CALIBRATION",
        }
    }
}

/// 控制器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ControllerMode {
    Voltage = 0,
    Current = 1,
    Velocity = 2,
    Position = 3,
    Mismatch = 4,
}

/// 输入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum InputMode {
    Inactive = 0,
    Passthrough = 1,
    VelRamp = 2,
    PosFilter = 3,
    Mixed = 4,
    TrapTraj = 5,
    TorqueRamp = 6,
    Mirror = 7,
}

/// 打包 SDO endpoint 帧（8 字节）
///
/// value 至多 4 字节，超长返回 `InvalidLength`。
pub fn pack_endpoint(
    opcode: u8,
    endpoint_id: u16,
    value: &[u8],
) -> Result<[u8; 8], ProtocolError> {
    if value.len() > 4 {
        return Err(ProtocolError::InvalidLength {
            expected: 4,
            actual: value.len(),
        });
    }

    let mut data = [0u8; 8];
    data[0] = opcode;
    data[1..3].copy_from_slice(&endpoint_id.to_le_bytes());
    // byte3 保留
    data[4..4 + value.len()].copy_from_slice(value);
    Ok(data)
}

/// 解包 endpoint 读应答
///
/// 应答载荷短于 `4 + value_size` 视为无效应答。
/// 返回 (endpoint_id, 数值字节)。
pub fn unpack_endpoint(
    data: &[u8],
    value_size: usize,
) -> Result<(u16, &[u8]), ProtocolError> {
    if data.len() < 4 + value_size {
        return Err(ProtocolError::InvalidLength {
            expected: 4 + value_size,
            actual: data.len(),
        });
    }

    let endpoint_id = u16::from_le_bytes([data[1], data[2]]);
    Ok((endpoint_id, &data[4..4 + value_size]))
}

/// 构建 endpoint 写帧（RxSDO，不等应答）
pub fn endpoint_write_frame(
    node_id: u8,
    endpoint_id: u16,
    value: &[u8],
) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let data = pack_endpoint(ENDPOINT_OPCODE_WRITE, endpoint_id, value)?;
    Ok(MotusFrame::new_standard(can_id(node_id, cmd::RX_SDO), &data))
}

/// 构建 endpoint f32 写帧
pub fn endpoint_write_f32(
    node_id: u8,
    endpoint_id: u16,
    value: f32,
) -> Result<MotusFrame, ProtocolError> {
    endpoint_write_frame(node_id, endpoint_id, &value.to_le_bytes())
}

/// 构建 endpoint u32 写帧
pub fn endpoint_write_u32(
    node_id: u8,
    endpoint_id: u16,
    value: u32,
) -> Result<MotusFrame, ProtocolError> {
    endpoint_write_frame(node_id, endpoint_id, &value.to_le_bytes())
}

/// 构建 endpoint 读请求帧（TxSDO）
pub fn endpoint_read_request(node_id: u8, endpoint_id: u16) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let data = pack_endpoint(ENDPOINT_OPCODE_READ, endpoint_id, &[])?;
    Ok(MotusFrame::new_standard(can_id(node_id, cmd::TX_SDO), &data))
}

/// 构建清错帧（写 CLEAR_ERRORS endpoint，无数值）
pub fn clear_errors_frame(node_id: u8) -> Result<MotusFrame, ProtocolError> {
    endpoint_write_frame(node_id, endpoint::CLEAR_ERRORS, &[])
}

/// 构建直达速度指令帧
pub fn set_input_vel_frame(node_id: u8, velocity: f32) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&velocity.to_le_bytes());
    Ok(MotusFrame::new_standard(can_id(node_id, cmd::RX_SDO), &data))
}

/// 构建直达力矩指令帧
pub fn set_input_torque_frame(node_id: u8, torque: f32) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&torque.to_le_bytes());
    Ok(MotusFrame::new_standard(can_id(node_id, cmd::TX_SDO), &data))
}

/// 构建设置轴状态帧
pub fn set_axis_state_frame(node_id: u8, state: AxisState) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&(u8::from(state) as u32).to_le_bytes());
    Ok(MotusFrame::new_standard(
        can_id(node_id, cmd::SET_AXIS_STATE),
        &data,
    ))
}

/// 构建设置控制器模式帧
pub fn set_controller_mode_frame(
    node_id: u8,
    control_mode: ControllerMode,
    input_mode: InputMode,
) -> Result<MotusFrame, ProtocolError> {
    check_node_id(node_id)?;
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&(u8::from(control_mode) as u32).to_le_bytes());
    data[4..].copy_from_slice(&(u8::from(input_mode) as u32).to_le_bytes());
    Ok(MotusFrame::new_standard(
        can_id(node_id, cmd::SET_CONTROLLER_MODE),
        &data,
    ))
}

/// 解析编码器估计广播帧（cmd 0x09）
///
/// 返回 (位置 rad, 速度 rad/s)。
pub fn parse_encoder_estimates(frame: &MotusFrame) -> Result<(f32, f32), ProtocolError> {
    if frame.len < 8 {
        return Err(ProtocolError::InvalidLength {
            expected: 8,
            actual: frame.len as usize,
        });
    }
    let pos = f32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], frame.data[3]]);
    let vel = f32::from_le_bytes([frame.data[4], frame.data[5], frame.data[6], frame.data[7]]);
    Ok((pos, vel))
}

/// 计算一帧在总线上占用的位数（含位填充估计）
///
/// 标准帧：SOF(1) + 仲裁(12) + 控制(6) + 数据(8n) + CRC(17) + ACK(2)
/// + EOF(7) + IFS(3)；扩展帧仲裁场为 32 位。位填充按可填充区段
/// （仲裁+控制、数据+CRC）每 5 位插 1 位的最坏情况估计。
pub fn frame_bits(data_len: usize, is_extended: bool) -> u32 {
    let arb_ctrl: u32 = if is_extended { 1 + 32 + 6 } else { 1 + 12 + 6 };
    let data_crc: u32 = 8 * data_len as u32 + 17;
    let fixed: u32 = 2 + 7 + 3;
    arb_ctrl + data_crc + fixed + arb_ctrl / 5 + data_crc / 5
}

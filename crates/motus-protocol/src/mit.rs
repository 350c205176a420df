//! MIT 协议：SteadyWin GIM 电驱的定点打包 CAN 方言
//!
//! 与 CTW 共用 `(node_id << 5) | cmd_id` 的标准 ID 布局，但控制/状态帧
//! 是跨字节的定点字段：位置 16 位，速度/Kp/Kd/力矩各 12 位。
//! 所有换算都是线性定标，常数见各函数。

use crate::{MotusFrame, ProtocolError, can_id};

/// MIT 命令号
pub mod cmd {
    /// 紧急停止
    pub const ESTOP: u8 = 0x02;
    /// 获取错误（应答为 8 字节大端异常码）
    pub const GET_ERROR: u8 = 0x03;
    /// 设置轴节点 ID
    pub const SET_AXIS_NODE_ID: u8 = 0x06;
    /// 设置轴状态（启动=8 / 停止=1 / 设零点=7）
    pub const SET_AXIS_STATE: u8 = 0x07;
    /// MIT 动态控制帧
    pub const MIT_CONTROL: u8 = 0x08;
    /// 获取编码器估算值
    pub const GET_ENCODER_ESTIMATES: u8 = 0x09;
    /// 设置控制器模式
    pub const SET_CONTROLLER_MODE: u8 = 0x0B;
    /// 设置输入位置
    pub const SET_INPUT_POS: u8 = 0x0C;
    /// 设置输入速度
    pub const SET_INPUT_VEL: u8 = 0x0D;
    /// 设置输入力矩
    pub const SET_INPUT_TORQUE: u8 = 0x0E;
    /// 设置限制
    pub const SET_LIMITS: u8 = 0x0F;
    /// 清除错误
    pub const CLEAR_ERRORS: u8 = 0x18;
    /// 直接设置位置（4 字节 f32）
    pub const SET_POSITION: u8 = 0x19;
    /// 保存配置
    pub const SAVE_CONFIGURATION: u8 = 0x1F;
}

/// MIT 轴状态子集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MitAxisState {
    Undefined = 0,
    Idle = 1,
    FullCalibrationSequence = 3,
    MotorCalibration = 4,
    /// 编码器偏移校准（设置零点）
    EncoderOffsetCalibration = 7,
    ClosedLoopControl = 8,
}

/// MIT 动态控制参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorControl {
    /// 位置 (rad)
    pub position: f64,
    /// 速度 (rad/s)
    pub velocity: f64,
    /// 位置增益
    pub kp: f64,
    /// 速度增益
    pub kd: f64,
    /// 力矩 (N·m)
    pub torque: f64,
}

/// MIT 状态反馈
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorStatus {
    /// 应答来源节点
    pub node_id: u8,
    /// 位置 (rad)
    pub position: f64,
    /// 速度 (rad/s)
    pub velocity: f64,
    /// 力矩 (N·m)
    pub torque: f64,
    /// 异常码（仅 GET_ERROR 应答填充）
    pub fault_code: u64,
}

// ========== 定点换算 ==========

/// 位置 → 16 位定点：(v + 15.91) * 65535 / 31.82
pub fn position_to_int(position: f64) -> u16 {
    ((position + 15.91) * 65535.0 / 31.82) as u16
}

/// 16 位定点 → 位置（驱动器侧定标带 2 倍系数）
pub fn int_to_position(pos_int: u16) -> f64 {
    2.0 * (pos_int as f64 * 31.82 / 65535.0 - 15.91)
}

/// 速度 → 12 位定点：(v + 82.73) * 4095 / 165.46
pub fn velocity_to_int(velocity: f64) -> i16 {
    ((velocity + 82.73) * 4095.0 / 165.46) as i16
}

/// 12 位定点 → 速度
pub fn int_to_velocity(vel_int: i16) -> f64 {
    (vel_int as u16) as f64 * 165.46 / 4095.0 - 82.73
}

/// Kp → 12 位定点：v * 4095 / 500
pub fn kp_to_int(kp: f64) -> i16 {
    (kp * 4095.0 / 500.0) as i16
}

/// 12 位定点 → Kp
pub fn int_to_kp(kp_int: i16) -> f64 {
    kp_int as f64 * 500.0 / 4095.0
}

/// Kd → 12 位定点：v * 4095 / 5
pub fn kd_to_int(kd: f64) -> i16 {
    (kd * 4095.0 / 5.0) as i16
}

/// 12 位定点 → Kd
pub fn int_to_kd(kd_int: i16) -> f64 {
    kd_int as f64 * 5.0 / 4095.0
}

/// 力矩 → 12 位定点：(v + 6.24) * 4095 / 12.48
pub fn torque_to_int(torque: f64) -> i16 {
    ((torque + 6.24) * 4095.0 / 12.48) as i16
}

/// 12 位定点 → 力矩
pub fn int_to_torque(torque_int: i16) -> f64 {
    torque_int as f64 * 12.48 / 4095.0 - 6.24
}

// ========== 帧打包/解包 ==========

/// 打包 MIT 动态控制帧（8 字节）
///
/// 位置 16 位占 byte0-1（高位在前）；速度 12 位占 byte2 + byte3 高半字节；
/// Kp 12 位占 byte3 低半字节 + byte4；Kd 12 位占 byte5 + byte6 高半字节；
/// 力矩 12 位占 byte6 低半字节 + byte7。
pub fn pack_control(control: &MotorControl) -> [u8; 8] {
    let mut data = [0u8; 8];

    let pos_int = position_to_int(control.position);
    data[0] = (pos_int >> 8) as u8;
    data[1] = (pos_int & 0xFF) as u8;

    let vel_int = velocity_to_int(control.velocity);
    data[2] = (vel_int >> 4) as u8;
    data[3] = ((vel_int & 0x0F) << 4) as u8;

    let kp_int = kp_to_int(control.kp);
    data[3] |= ((kp_int >> 8) & 0x0F) as u8;
    data[4] = (kp_int & 0xFF) as u8;

    let kd_int = kd_to_int(control.kd);
    data[5] = (kd_int >> 4) as u8;
    data[6] = ((kd_int & 0x0F) << 4) as u8;

    let torque_int = torque_to_int(control.torque);
    data[6] |= ((torque_int >> 8) & 0x0F) as u8;
    data[7] = (torque_int & 0xFF) as u8;

    data
}

/// 解包 MIT 状态帧
///
/// byte0 节点号；位置 byte1-2；速度 byte3 + byte4 高半字节；
/// 力矩 byte4 低半字节 + byte5。载荷短于 6 字节视为无效。
pub fn unpack_status(data: &[u8]) -> Result<MotorStatus, ProtocolError> {
    if data.len() < 6 {
        return Err(ProtocolError::InvalidLength {
            expected: 6,
            actual: data.len(),
        });
    }

    let pos_int = ((data[1] as u16) << 8) | data[2] as u16;
    let vel_int = ((data[3] as i16) << 4) | (data[4] >> 4) as i16;
    let torque_int = (((data[4] & 0x0F) as i16) << 8) | data[5] as i16;

    Ok(MotorStatus {
        node_id: data[0],
        position: int_to_position(pos_int),
        velocity: int_to_velocity(vel_int),
        torque: int_to_torque(torque_int),
        fault_code: 0,
    })
}

/// 解析 GET_ERROR 应答（8 字节大端异常码）
pub fn unpack_fault_code(data: &[u8]) -> Result<u64, ProtocolError> {
    if data.len() != 8 {
        return Err(ProtocolError::InvalidLength {
            expected: 8,
            actual: data.len(),
        });
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(data);
    Ok(u64::from_be_bytes(bytes))
}

/// 构建动态控制帧
pub fn control_frame(node_id: u8, control: &MotorControl) -> MotusFrame {
    MotusFrame::new_standard(can_id(node_id, cmd::MIT_CONTROL), &pack_control(control))
}

/// 构建设置轴状态帧
pub fn set_axis_state_frame(node_id: u8, state: MitAxisState) -> MotusFrame {
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&(state as u32).to_le_bytes());
    MotusFrame::new_standard(can_id(node_id, cmd::SET_AXIS_STATE), &data)
}

/// 构建获取异常帧
pub fn get_error_frame(node_id: u8) -> MotusFrame {
    MotusFrame::new_standard(can_id(node_id, cmd::GET_ERROR), &[0u8; 8])
}

/// 构建清除异常帧
pub fn clear_errors_frame(node_id: u8) -> MotusFrame {
    MotusFrame::new_standard(can_id(node_id, cmd::CLEAR_ERRORS), &[0u8; 8])
}

/// 构建直接设置位置帧（4 字节小端 f32）
pub fn set_position_frame(node_id: u8, position: f32) -> MotusFrame {
    MotusFrame::new_standard(can_id(node_id, cmd::SET_POSITION), &position.to_le_bytes())
}

// ========== 异常码 ==========

/// MIT 异常位（64 位掩码）
pub mod fault {
    pub const NONE: u64 = 0x0000_0000;
    pub const PHASE_RESISTANCE_OUT_OF_RANGE: u64 = 0x0000_0001;
    pub const PHASE_INDUCTANCE_OUT_OF_RANGE: u64 = 0x0000_0002;
    pub const CONTROL_DEADLINE_MISSED: u64 = 0x0000_0010;
    pub const MODULATION_MAGNITUDE: u64 = 0x0000_0080;
    pub const CURRENT_SENSE_SATURATION: u64 = 0x0000_0400;
    pub const CURRENT_LIMIT_VIOLATION: u64 = 0x0000_1000;
    pub const MOTOR_THERMISTOR_OVER_TEMP: u64 = 0x0002_0000;
    pub const FET_THERMISTOR_OVER_TEMP: u64 = 0x0004_0000;
    pub const TIMER_UPDATE_MISSED: u64 = 0x0008_0000;
    pub const CURRENT_MEASUREMENT_UNAVAILABLE: u64 = 0x0010_0000;
    pub const CONTROLLER_FAILED: u64 = 0x0020_0000;
    pub const I_BUS_OUT_OF_RANGE: u64 = 0x0040_0000;
    pub const BRAKE_RESISTOR_DISARMED: u64 = 0x0080_0000;
    pub const SYSTEM_LEVEL: u64 = 0x0100_0000;
    pub const BAD_TIMING: u64 = 0x0200_0000;
    pub const UNKNOWN_PHASE_ESTIMATE: u64 = 0x0400_0000;
    pub const UNKNOWN_PHASE_VEL: u64 = 0x0800_0000;
    pub const UNKNOWN_TORQUE: u64 = 0x1000_0000;
    pub const UNKNOWN_CURRENT_COMMAND: u64 = 0x2000_0000;
    pub const UNKNOWN_CURRENT_MEASUREMENT: u64 = 0x4000_0000;
    pub const UNKNOWN_VBUS_VOLTAGE: u64 = 0x8000_0000;
    pub const UNKNOWN_VOLTAGE_COMMAND: u64 = 0x1_0000_0000;
    pub const UNKNOWN_GAINS: u64 = 0x2_0000_0000;
    pub const CONTROLLER_INITIALIZING: u64 = 0x4_0000_0000;
    pub const UNBALANCED_PHASES: u64 = 0x8_0000_0000;
}

const FAULT_TABLE: &[(u64, &str)] = &[
    (fault::PHASE_RESISTANCE_OUT_OF_RANGE, "phase resistance out of range"),
    (fault::PHASE_INDUCTANCE_OUT_OF_RANGE, "phase inductance out of range"),
    (fault::CONTROL_DEADLINE_MISSED, "control deadline missed"),
    (fault::MODULATION_MAGNITUDE, "SVM modulation magnitude fault"),
    (fault::CURRENT_SENSE_SATURATION, "current sense saturation"),
    (fault::CURRENT_LIMIT_VIOLATION, "current limit violation"),
    (fault::MOTOR_THERMISTOR_OVER_TEMP, "motor thermistor over temperature"),
    (fault::FET_THERMISTOR_OVER_TEMP, "FET thermistor over temperature"),
    (fault::TIMER_UPDATE_MISSED, "timer update missed"),
    (fault::CURRENT_MEASUREMENT_UNAVAILABLE, "current measurement unavailable"),
    (fault::CONTROLLER_FAILED, "controller failed"),
    (fault::I_BUS_OUT_OF_RANGE, "DC bus current out of range"),
    (fault::BRAKE_RESISTOR_DISARMED, "brake resistor disarmed"),
    (fault::SYSTEM_LEVEL, "system level fault"),
    (fault::BAD_TIMING, "bad current sampling timing"),
    (fault::UNKNOWN_PHASE_ESTIMATE, "unknown phase estimate"),
    (fault::UNKNOWN_PHASE_VEL, "unknown phase velocity"),
    (fault::UNKNOWN_TORQUE, "unknown torque"),
    (fault::UNKNOWN_CURRENT_COMMAND, "unknown current command"),
    (fault::UNKNOWN_CURRENT_MEASUREMENT, "unknown current measurement"),
    (fault::UNKNOWN_VBUS_VOLTAGE, "unknown VBUS voltage"),
    (fault::UNKNOWN_VOLTAGE_COMMAND, "unknown voltage command"),
    (fault::UNKNOWN_GAINS, "unknown current loop gains"),
    (fault::CONTROLLER_INITIALIZING, "controller initializing"),
    (fault::UNBALANCED_PHASES, "unbalanced phases"),
];

/// 构建异常码的可读描述（逐位 OR 测试，`"; "` 连接）
pub fn fault_description(fault_code: u64) -> String {
    if fault_code == fault::NONE {
        return "no fault".to_string();
    }

    let parts: Vec<&str> = FAULT_TABLE
        .iter()
        .filter(|(bit, _)| fault_code & bit != 0)
        .map(|(_, desc)| *desc)
        .collect();

    parts.join("; ")
}

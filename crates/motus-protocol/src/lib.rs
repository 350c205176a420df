//! # Motus Protocol
//!
//! 运动控制核心的线缆协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `tcode`: TCode 运动指令文法、轴状态与时间插值
//! - `ctw`: CANsimple 派生协议（SteadyWin SDO endpoint 读写）
//! - `mit`: MIT 定点打包的第二种 CAN 电机方言
//!
//! ## 字节序
//!
//! 两种 CAN 方言的 endpoint/数值字段均为 Intel (LSB) 低位在前（小端字节序），
//! MIT 状态帧中的定点字段按字段定义跨字节打包。
//! 本模块提供了小端转换工具函数。

pub mod ctw;
pub mod mit;
pub mod tcode;

// ctw/mit 两种方言存在同名命令常量，保持命名空间访问
pub use tcode::*;

/// CAN 2.0 标准帧的统一抽象
///
/// # 设计目的
///
/// `MotusFrame` 是协议层和硬件层之间的中间抽象：
/// - **层次解耦**：协议层不依赖底层 CAN 实现（SocketCAN/Mock）
/// - **统一接口**：上层通过 `CanAdapter` trait 使用统一的帧类型
/// - **类型安全**：编译时保证帧格式正确，避免原始字节操作错误
///
/// # 设计特性
///
/// - **Copy trait**：零成本复制，适合高频 CAN 场景
/// - **固定 8 字节**：避免堆分配
/// - **时间戳支持**：`timestamp_us` 字段记录接收时刻
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotusFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl MotusFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    /// 通用构造器
    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }

    /// 节点号：标准 ID 的高 6 位
    pub fn node_id(&self) -> u8 {
        ((self.id >> 5) & 0x3F) as u8
    }

    /// 命令号：标准 ID 的低 5 位
    pub fn cmd_id(&self) -> u8 {
        (self.id & 0x1F) as u8
    }
}

/// 组合标准 CAN ID: `(node_id << 5) | cmd_id`
pub const fn can_id(node_id: u8, cmd_id: u8) -> u16 {
    ((node_id as u16) << 5) | (cmd_id as u16 & 0x1F)
}

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },
}

/// 字节序转换工具函数
///
/// 两种 CAN 方言的数值字段均为 Intel (LSB) 低位在前，
/// 这些函数用于在协议层进行小端字节序转换。
///
/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// 小端字节序转 f32
pub fn bytes_to_f32_le(bytes: [u8; 4]) -> f32 {
    f32::from_le_bytes(bytes)
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// u32 转小端字节序
pub fn u32_to_bytes_le(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// f32 转小端字节序
pub fn f32_to_bytes_le(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_split() {
        let frame = MotusFrame::new_standard(can_id(3, 0x09), &[0; 8]);
        assert_eq!(frame.node_id(), 3);
        assert_eq!(frame.cmd_id(), 0x09);
    }

    #[test]
    fn test_can_id_layout() {
        assert_eq!(can_id(1, 0x04), 0x24);
        assert_eq!(can_id(8, 0x1F), (8 << 5) | 0x1F);
        // cmd_id 超出 5 位被截断
        assert_eq!(can_id(1, 0x25), can_id(1, 0x05));
    }

    #[test]
    fn test_frame_data_slice() {
        let frame = MotusFrame::new_standard(0x123, &[1, 2, 3, 4]);
        assert_eq!(frame.len, 4);
        assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
        assert_eq!(frame.data[4..], [0, 0, 0, 0]);
    }

    #[test]
    fn test_bytes_to_u16_le() {
        assert_eq!(bytes_to_u16_le([0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_bytes_to_u32_le() {
        assert_eq!(bytes_to_u32_le([0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_f32_roundtrip() {
        let bytes = f32_to_bytes_le(1.5);
        assert_eq!(bytes_to_f32_le(bytes), 1.5);
    }
}

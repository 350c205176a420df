//! 运行设置（TOML）
//!
//! 设置在启动时加载一次，之后只读。所有字段带缺省值，
//! 空文件也能得到一份可运行的居中配置。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::map_range;

/// 设置加载错误
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 单个逻辑轴的标定参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisCalibration {
    /// 输入区间左端点（归一化）
    pub left: f32,
    /// 输入区间右端点（归一化）
    pub right: f32,
    /// 方向反转
    pub reverse: bool,
    /// 输出比例
    pub scale: f32,
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 1.0,
            reverse: false,
            scale: 1.0,
        }
    }
}

impl AxisCalibration {
    /// 标定链：先压缩到 [left, right]，可选反向，再映射到物理
    /// 区间 [out_min, out_max]，最后乘比例。任何一步都不钳制。
    pub fn apply(&self, value: f32, out_min: f32, out_max: f32) -> f32 {
        let mut v = map_range(value, 0.0, 1.0, self.left, self.right);
        if self.reverse {
            v = self.left + self.right - v;
        }
        map_range(v, 0.0, 1.0, out_min, out_max) * self.scale
    }
}

/// 舵机输出通道数上限（A..G）
pub const SERVO_CHANNELS: usize = 7;

/// 舵机与轴标定设置
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSettings {
    /// 拓扑模式号（见 factory）
    pub mode: i32,
    /// PWM 输出频率，同时是控制循环频率（Hz）
    pub pwm_frequency: u32,
    /// 各通道零位脉宽（µs），索引 0..6 对应通道 A..G
    pub zero: [u32; SERVO_CHANNELS],
    pub l0: AxisCalibration,
    pub l1: AxisCalibration,
    pub l2: AxisCalibration,
    pub r0: AxisCalibration,
    pub r1: AxisCalibration,
    pub r2: AxisCalibration,
}

impl Default for ServoSettings {
    fn default() -> Self {
        Self {
            mode: 0,
            pwm_frequency: 50,
            zero: [1500; SERVO_CHANNELS],
            l0: AxisCalibration::default(),
            l1: AxisCalibration::default(),
            l2: AxisCalibration::default(),
            r0: AxisCalibration::default(),
            r1: AxisCalibration::default(),
            r2: AxisCalibration::default(),
        }
    }
}

impl ServoSettings {
    /// 通道安装偏置：零位脉宽相对 1500 µs 的归一化偏移
    pub fn offset(&self, channel: usize) -> f32 {
        let zero = self.zero.get(channel).copied().unwrap_or(1500);
        (zero as f32 - 1500.0) / 1000.0
    }
}

/// CAN 电机设置（SR6CAN 拓扑）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    /// 每台电机的机械安装偏移（度）
    pub offsets: [f32; 6],
    /// 位置环增益
    pub position_kp: f32,
    pub position_ki: f32,
    pub position_kd: f32,
    /// 速度环增益
    pub velocity_kp: f32,
    pub velocity_ki: f32,
    pub velocity_kd: f32,
    /// 第七轴延长臂长度（与坐标同单位）
    pub extension_length: f32,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            offsets: [0.0; 6],
            position_kp: 20.0,
            position_ki: 0.0,
            position_kd: 0.0,
            velocity_kp: 0.05,
            velocity_ki: 0.1,
            velocity_kd: 0.0,
            extension_length: 0.0,
        }
    }
}

/// CAN 接口设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanSettings {
    /// SocketCAN 接口名
    pub interface: String,
    /// 名义波特率（bit/s）
    pub bitrate: u32,
}

impl Default for CanSettings {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            bitrate: 500_000,
        }
    }
}

/// 全部运行设置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub servo: ServoSettings,
    pub motor: MotorSettings,
    pub can: CanSettings,
}

impl Settings {
    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// 诊断用的 JSON 摘要
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.servo.mode, 0);
        assert_eq!(settings.servo.pwm_frequency, 50);
        assert_eq!(settings.servo.zero, [1500; SERVO_CHANNELS]);
        assert_eq!(settings.can.interface, "can0");
        assert_eq!(settings.can.bitrate, 500_000);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let settings = Settings::from_toml_str(
            r#"
            [servo]
            mode = 3
            pwm_frequency = 333
            zero = [1480, 1520, 1500, 1500, 1500, 1500, 1500]

            [servo.l0]
            left = 0.1
            right = 0.9
            reverse = true
            scale = 0.8

            [can]
            interface = "vcan0"
            "#,
        )
        .unwrap();
        assert_eq!(settings.servo.mode, 3);
        assert_eq!(settings.servo.pwm_frequency, 333);
        assert!(settings.servo.l0.reverse);
        assert_eq!(settings.servo.l0.scale, 0.8);
        assert_eq!(settings.can.interface, "vcan0");
        // 未出现的表保持缺省
        assert_eq!(settings.motor.position_kp, 20.0);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Settings::from_toml_str("[servo\nmode=").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_calibration_chain() {
        let cal = AxisCalibration {
            left: 0.0,
            right: 1.0,
            reverse: false,
            scale: 1.0,
        };
        // 居中输入映射到物理区间中点
        assert_eq!(cal.apply(0.5, -50.0, 50.0), 0.0);
        assert_eq!(cal.apply(1.0, -50.0, 50.0), 50.0);

        let narrowed = AxisCalibration {
            left: 0.25,
            right: 0.75,
            reverse: false,
            scale: 1.0,
        };
        // 满幅输入被压缩到标定窗口
        assert_eq!(narrowed.apply(1.0, -1.0, 1.0), 0.5);
        assert_eq!(narrowed.apply(0.0, -1.0, 1.0), -0.5);
    }

    #[test]
    fn test_calibration_reverse() {
        let cal = AxisCalibration {
            left: 0.0,
            right: 1.0,
            reverse: true,
            scale: 1.0,
        };
        assert_eq!(cal.apply(1.0, -1.0, 1.0), -1.0);
        assert_eq!(cal.apply(0.0, -1.0, 1.0), 1.0);
        assert_eq!(cal.apply(0.5, -1.0, 1.0), 0.0);
    }

    #[test]
    fn test_servo_offset_from_zero_pulse() {
        let mut servo = ServoSettings::default();
        servo.zero[0] = 1600;
        servo.zero[1] = 1400;
        assert!((servo.offset(0) - 0.1).abs() < 1e-6);
        assert!((servo.offset(1) + 0.1).abs() < 1e-6);
        assert_eq!(servo.offset(2), 0.0);
        // 越界通道按零偏置处理
        assert_eq!(servo.offset(99), 0.0);
    }

    #[test]
    fn test_json_summary_is_nonempty() {
        let settings = Settings::default();
        let json = settings.to_json();
        assert!(json.contains("pwm_frequency"));
    }
}

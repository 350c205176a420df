//! TrRMax 拓扑：三舵机并联三脚架
//!
//! 三个摇臂沿 120° 分布，平台姿态由三个挂点的 z 高度唯一确定：
//! 行程整体抬升，滚转/俯仰按分布圆半径分解到各挂点。

use std::f32::consts::PI;
use std::sync::Arc;

use motus_actuator::{Actuator, Wait};
use motus_protocol::tcode::AXIS_COUNT;
use tracing::{info, warn};

use crate::runner::Executor;
use crate::settings::ServoSettings;

/// 挂点分布圆半径（mm）
const MOUNT_RADIUS: f32 = 40.0;
/// 摇臂行程：z = ARM_TRAVEL · sin(θ)
const ARM_TRAVEL: f32 = 80.0;
/// 行程半幅（mm）
const STROKE_RANGE: f32 = 50.0;
/// 滚转/俯仰半幅（度）
const TILT_RANGE: f32 = 45.0;

pub struct TrRMaxExecutor {
    servos: [Arc<dyn Actuator>; 3],
    cal: ServoSettings,
    duties: [f32; 3],
}

impl TrRMaxExecutor {
    /// 通道顺序：[A, B, C]，A/B 为前挂点对，C 为后挂点
    pub fn new(servos: [Arc<dyn Actuator>; 3], cal: ServoSettings) -> Self {
        let mut executor = Self {
            servos,
            cal,
            duties: [0.0; 3],
        };
        // 上电回中
        executor.compute(&[0.5; AXIS_COUNT]);
        info!("TrRMax executor ready");
        executor
    }
}

impl Executor for TrRMaxExecutor {
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
        let stroke = self.cal.l0.apply(axes[0], -STROKE_RANGE, STROKE_RANGE);
        let roll = self.cal.r1.apply(axes[4], -TILT_RANGE, TILT_RANGE).to_radians();
        let pitch = self.cal.r2.apply(axes[5], -TILT_RANGE, TILT_RANGE).to_radians();

        // 三个挂点的姿态分量：后挂点只受滚转，前挂点对受滚转一半
        // 加 ±(√3/2)·R 的俯仰分量
        let h_rear = -MOUNT_RADIUS * roll.sin();
        let tilt = (3.0f32.sqrt() / 2.0) * MOUNT_RADIUS * roll.cos() * pitch.sin();
        let h_front_a = (MOUNT_RADIUS / 2.0) * roll.sin() + tilt;
        let h_front_b = (MOUNT_RADIUS / 2.0) * roll.sin() - tilt;

        let heights = [stroke + h_front_a, stroke + h_front_b, stroke + h_rear];

        for (i, z) in heights.into_iter().enumerate() {
            let theta = (z / ARM_TRAVEL).clamp(-1.0, 1.0).asin();
            let theta_deg = theta * 180.0 / PI;
            // 零位脉宽 ±1000 µs 对应 ±90°
            let pulse_us = self.cal.zero[i] as f32 + theta_deg / 90.0 * 1000.0;
            self.duties[i] = ((pulse_us - 1500.0) / 1000.0).clamp(-1.0, 1.0);
        }
    }

    fn execute(&mut self) {
        for (servo, duty) in self.servos.iter().zip(self.duties) {
            servo.set_target(duty);
            if let Err(e) = servo.actuate(Wait::NonBlocking) {
                warn!("servo output failed: {e}");
            }
        }
    }
}

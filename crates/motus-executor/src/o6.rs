//! O6 拓扑：六轴并联平台
//!
//! 六维位姿经逆运动学解算出六个摇臂角；无解时保持上一帧的
//! 可行解，平台停在最后的合法位姿上。

use std::sync::Arc;

use motus_actuator::{Actuator, Wait};
use motus_geometry::{KinematicsParams, solve_robot_kinematics};
use motus_protocol::tcode::AXIS_COUNT;
use tracing::{info, warn};

use crate::map_range;
use crate::runner::Executor;
use crate::settings::ServoSettings;

/// 平台工作原点高度（与运动学参数同单位）
const HOME_HEIGHT: f64 = 19.3;
/// 平移半幅（x/y）
const LATERAL_RANGE: f32 = 3.0;
/// 升降半幅（z）
const VERTICAL_RANGE: f32 = 6.0;
/// 姿态角半幅（度）
const ANGLE_RANGE: f32 = 25.0;

pub struct O6Executor {
    servos: [Arc<dyn Actuator>; 6],
    cal: ServoSettings,
    params: KinematicsParams,
    /// 最近一次可行解（rad）
    thetas: [f64; 6],
}

impl O6Executor {
    pub fn new(servos: [Arc<dyn Actuator>; 6], cal: ServoSettings) -> Self {
        let mut executor = Self {
            servos,
            cal,
            params: KinematicsParams::default(),
            thetas: [0.0; 6],
        };
        // 上电解算一次原点位姿
        executor.compute(&[0.5; AXIS_COUNT]);
        info!("O6 executor ready");
        executor
    }
}

impl Executor for O6Executor {
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
        let z = self.cal.l0.apply(axes[0], -VERTICAL_RANGE, VERTICAL_RANGE);
        let y = self.cal.l1.apply(axes[1], -LATERAL_RANGE, LATERAL_RANGE);
        let x = self.cal.l2.apply(axes[2], -LATERAL_RANGE, LATERAL_RANGE);
        let yaw = self.cal.r0.apply(axes[3], -ANGLE_RANGE, ANGLE_RANGE);
        let roll = self.cal.r1.apply(axes[4], -ANGLE_RANGE, ANGLE_RANGE);
        let pitch = self.cal.r2.apply(axes[5], -ANGLE_RANGE, ANGLE_RANGE);

        match solve_robot_kinematics(
            x as f64,
            y as f64,
            z as f64 + HOME_HEIGHT,
            roll as f64,
            pitch as f64,
            yaw as f64,
            &self.params,
        ) {
            Some(mut thetas) => {
                // 偶数位电机镜像安装，输出方向取反
                for theta in thetas.iter_mut().step_by(2) {
                    *theta = -*theta;
                }
                self.thetas = thetas;
            },
            None => warn!("kinematics has no solution, holding last pose"),
        }
    }

    fn execute(&mut self) {
        for (i, servo) in self.servos.iter().enumerate() {
            let angle_deg = self.thetas[i].to_degrees() as f32;
            // ±90° 映射到 500–2500 µs，零位脉宽平移后再次钳制
            let pulse_us = map_range(angle_deg, -90.0, 90.0, 500.0, 2500.0);
            let pulse_us = (self.cal.zero[i] as f32 + (pulse_us - 1500.0)).clamp(500.0, 2500.0);
            let target = (pulse_us - 1500.0) / 1000.0;

            servo.set_target(target);
            if let Err(e) = servo.actuate(Wait::NonBlocking) {
                warn!("servo output failed: {e}");
            }
        }
    }
}

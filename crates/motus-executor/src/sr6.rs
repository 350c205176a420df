//! SR6 拓扑：六连杆平台 + 扭转
//!
//! 四个主舵机通过双曲柄带动平台的升降/前后/滚转，两个俯仰舵机
//! 通过附加连杆控制俯仰与侧移，第七通道输出扭转脉冲串。
//! 坐标与长度均为 0.01 mm 定点单位。

use std::f32::consts::PI;
use std::sync::Arc;

use motus_actuator::{Actuator, Wait};
use motus_protocol::tcode::AXIS_COUNT;
use tracing::{info, warn};

use crate::map_range;
use crate::runner::Executor;
use crate::settings::ServoSettings;

/// 主臂支点到平台参考点的水平距离
const PIVOT_X: f32 = 16248.0;
/// 主舵机连杆的纵向基准
const MAIN_Y_BASE: f32 = 1500.0;
/// 俯仰舵机连杆的纵向基准
const PITCH_Y_BASE: f32 = 4500.0;
/// 左右主臂间距
const ARM_SPACING: f32 = 13700.0;
/// 滚转对俯仰连杆侧移的耦合臂长
const PITCH_Z_COUPLING: f32 = 5500.0;

/// 主舵机反解
///
/// 曲柄 50 mm、连杆 x 满足 c² 展开后的常数 28125；
/// acos 参数钳制到 [-1,1]，几何不可达时输出饱和而不是 NaN。
fn main_servo_angle(x: f32, y: f32) -> f32 {
    let x = x / 100.0;
    let y = y / 100.0;
    let gamma = x.atan2(y);
    let csq = x * x + y * y;
    let c = csq.sqrt();
    let beta = ((csq - 28125.0) / (100.0 * c)).clamp(-1.0, 1.0).acos();
    gamma + beta - PI
}

/// 俯仰舵机反解
///
/// 先按俯仰角把连杆挂点平移到位（臂长 55 mm，安装角 0.2618 rad），
/// 再对等效连杆长 bsq 做同样的余弦定理解算。
fn pitch_servo_angle(x: f32, y: f32, z: f32, pitch: f32) -> f32 {
    let pitch = pitch * 0.0001745;
    let x = x + 5500.0 * (0.2618 + pitch).sin();
    let y = y - 5500.0 * (0.2618 + pitch).cos();
    let x = x / 100.0;
    let y = y / 100.0;
    let z = z / 100.0;
    let bsq = 36250.0 - (75.0 + z) * (75.0 + z);
    let gamma = x.atan2(y);
    let csq = x * x + y * y;
    let c = csq.sqrt();
    let beta = ((csq + 75.0 * 75.0 - bsq) / (2.0 * 75.0 * c))
        .clamp(-1.0, 1.0)
        .acos();
    gamma + beta - PI
}

/// 舵机角（rad，±π/2 满幅）转归一化占空比
fn angle_to_duty(angle: f32) -> f32 {
    map_range(angle, -PI / 2.0, PI / 2.0, -1.0, 1.0)
}

pub struct Sr6Executor {
    /// [下左, 下右, 上左, 上右, 俯仰左, 俯仰右]
    main_servos: [Arc<dyn Actuator>; 6],
    /// 扭转通道（脉冲串输出）
    twist_servo: Arc<dyn Actuator>,
    cal: ServoSettings,
    duties: [f32; 7],
}

impl Sr6Executor {
    pub fn new(
        main_servos: [Arc<dyn Actuator>; 6],
        twist_servo: Arc<dyn Actuator>,
        cal: ServoSettings,
    ) -> Self {
        let mut executor = Self {
            main_servos,
            twist_servo,
            cal,
            duties: [0.0; 7],
        };
        // 上电回中
        executor.compute(&[0.5; AXIS_COUNT]);
        info!("SR6 executor ready");
        executor
    }
}

impl Executor for Sr6Executor {
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
        let twist = self.cal.r0.apply(axes[3], -PI / 2.0, PI / 2.0);
        let x = self.cal.l1.apply(axes[1], -3000.0, 3000.0);
        let roll = self.cal.r1.apply(axes[4], -2500.0, 2500.0);
        let pitch = -self.cal.r2.apply(axes[5], -2500.0, 2500.0);
        let y = -self.cal.l0.apply(axes[0], -6000.0, 6000.0);
        let z = self.cal.l2.apply(axes[2], -3000.0, 3000.0);

        // 滚转角为 0.01° 定点
        let roll_sin = (roll / 100.0 / 180.0 * PI).sin();
        let d = ARM_SPACING / 2.0;

        let lower_left = main_servo_angle(PIVOT_X - x, MAIN_Y_BASE + y + d * roll_sin);
        let lower_right = main_servo_angle(PIVOT_X - x, MAIN_Y_BASE + y - d * roll_sin);
        let upper_left = main_servo_angle(PIVOT_X - x, MAIN_Y_BASE - y - d * roll_sin);
        let upper_right = main_servo_angle(PIVOT_X - x, MAIN_Y_BASE - y + d * roll_sin);

        let pitch_left = pitch_servo_angle(
            PIVOT_X - x,
            PITCH_Y_BASE - y - d * roll_sin,
            z - PITCH_Z_COUPLING * roll_sin,
            -pitch,
        );
        let pitch_right = pitch_servo_angle(
            PIVOT_X - x,
            PITCH_Y_BASE - y + d * roll_sin,
            -(z - PITCH_Z_COUPLING * roll_sin),
            -pitch,
        );

        self.duties = [
            angle_to_duty(lower_left),
            -angle_to_duty(lower_right),
            -angle_to_duty(upper_left),
            angle_to_duty(upper_right),
            angle_to_duty(pitch_left),
            -angle_to_duty(pitch_right),
            angle_to_duty(twist),
        ];
    }

    fn execute(&mut self) {
        for (servo, duty) in self.main_servos.iter().zip(self.duties) {
            servo.set_target(duty);
            if let Err(e) = servo.actuate(Wait::NonBlocking) {
                warn!("main servo output failed: {e}");
            }
        }
        self.twist_servo.set_target(self.duties[6]);
        if let Err(e) = self.twist_servo.actuate(Wait::NonBlocking) {
            warn!("twist servo output failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_actuator::mock::RecordingActuator;
    use proptest::prelude::*;

    fn build() -> Sr6Executor {
        let mains: [Arc<dyn Actuator>; 6] =
            std::array::from_fn(|_| Arc::new(RecordingActuator::new(0.0)) as Arc<dyn Actuator>);
        let twist = Arc::new(RecordingActuator::new(0.0)) as Arc<dyn Actuator>;
        Sr6Executor::new(mains, twist, ServoSettings::default())
    }

    #[test]
    fn test_centered_input_is_near_neutral() {
        let mut executor = build();
        executor.compute(&[0.5; AXIS_COUNT]);
        let d = executor.duties;
        // 四个主舵机的几何常数在中位解出接近零的角
        for (i, duty) in d[..4].iter().enumerate() {
            assert!(duty.abs() < 0.01, "duty[{i}] = {duty}");
        }
        // 俯仰对有固有的安装角偏置，但左右互为镜像
        assert!((d[4] + d[5]).abs() < 1e-5, "pitch pair: {} {}", d[4], d[5]);
        assert_eq!(d[6], 0.0);
    }

    #[test]
    fn test_left_right_symmetry_at_zero_roll() {
        let mut executor = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[0] = 0.8;
        executor.compute(&axes);

        let d = executor.duties;
        // 无滚转时左右连杆几何相同，仅输出方向相反
        assert!((d[0] + d[1]).abs() < 1e-5, "lower pair: {} {}", d[0], d[1]);
        assert!((d[2] + d[3]).abs() < 1e-5, "upper pair: {} {}", d[2], d[3]);
        assert!((d[4] + d[5]).abs() < 1e-5, "pitch pair: {} {}", d[4], d[5]);
    }

    #[test]
    fn test_roll_breaks_symmetry() {
        let mut executor = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[4] = 1.0;
        executor.compute(&axes);
        let d = executor.duties;
        assert!((d[0] + d[1]).abs() > 1e-3, "roll must split the lower pair");
    }

    #[test]
    fn test_twist_passthrough() {
        let mut executor = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[3] = 1.0;
        executor.compute(&axes);
        assert!((executor.duties[6] - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_duties_always_finite(axes in proptest::array::uniform6(0.0f32..=1.0)) {
            let mut executor = build();
            executor.compute(&axes);
            for duty in executor.duties {
                prop_assert!(duty.is_finite());
            }
        }
    }
}

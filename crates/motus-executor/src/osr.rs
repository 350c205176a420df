//! OSR 拓扑：四通道（行程差动对 + 俯仰 + 扭转）
//!
//! 行程与滚转共用 A/B 两个差动舵机，C 为俯仰，D 为扭转。

use std::sync::Arc;

use motus_actuator::{Actuator, Wait};
use motus_protocol::tcode::AXIS_COUNT;
use tracing::{info, warn};

use crate::runner::Executor;
use crate::settings::ServoSettings;

/// 行程半幅（归一化输出）
const STROKE_RANGE: f32 = 0.35;
/// 滚转半幅
const ROLL_RANGE: f32 = 0.18;
/// 俯仰半幅
const PITCH_RANGE: f32 = 0.35;
/// 扭转半幅
const TWIST_RANGE: f32 = 1.0;

pub struct OsrExecutor {
    servos: [Arc<dyn Actuator>; 4],
    cal: ServoSettings,
    duties: [f32; 4],
}

impl OsrExecutor {
    /// 通道顺序：[A, B, C, D] = [差动左, 差动右, 俯仰, 扭转]
    pub fn new(servos: [Arc<dyn Actuator>; 4], cal: ServoSettings) -> Self {
        let mut executor = Self {
            servos,
            cal,
            duties: [0.0; 4],
        };
        // 上电回中
        executor.compute(&[0.5; AXIS_COUNT]);
        info!("OSR executor ready");
        executor
    }
}

impl Executor for OsrExecutor {
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
        let stroke = self.cal.l0.apply(axes[0], -STROKE_RANGE, STROKE_RANGE);
        let twist = self.cal.r0.apply(axes[3], -TWIST_RANGE, TWIST_RANGE);
        let roll = self.cal.r1.apply(axes[4], -ROLL_RANGE, ROLL_RANGE);
        let pitch = self.cal.r2.apply(axes[5], -PITCH_RANGE, PITCH_RANGE);

        self.duties = [-stroke + roll, stroke + roll, pitch, twist];
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

#[cfg(test)]
mod tests {
    use super::*;
    use motus_actuator::mock::RecordingActuator;

    fn build() -> (OsrExecutor, [Arc<parking_lot::Mutex<Vec<f32>>>; 4]) {
        let servos: [Arc<RecordingActuator>; 4] =
            std::array::from_fn(|_| Arc::new(RecordingActuator::new(0.0)));
        let histories = std::array::from_fn(|i| servos[i].history());
        let servos = servos.map(|s| s as Arc<dyn Actuator>);
        (
            OsrExecutor::new(servos, ServoSettings::default()),
            histories,
        )
    }

    #[test]
    fn test_centered_input_centers_all_channels() {
        let (mut executor, histories) = build();
        executor.compute(&[0.5; AXIS_COUNT]);
        executor.execute();
        for history in &histories {
            assert_eq!(history.lock().as_slice(), &[0.0]);
        }
    }

    #[test]
    fn test_full_stroke_is_differential() {
        let (mut executor, histories) = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[0] = 1.0;
        executor.compute(&axes);
        executor.execute();

        let a = histories[0].lock()[0];
        let b = histories[1].lock()[0];
        assert!((a + STROKE_RANGE).abs() < 1e-6, "a = {a}");
        assert!((b - STROKE_RANGE).abs() < 1e-6, "b = {b}");
    }

    #[test]
    fn test_roll_is_common_mode() {
        let (mut executor, histories) = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[4] = 1.0;
        executor.compute(&axes);
        executor.execute();

        let a = histories[0].lock()[0];
        let b = histories[1].lock()[0];
        assert!((a - ROLL_RANGE).abs() < 1e-6);
        assert!((b - ROLL_RANGE).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_and_twist_channels() {
        let (mut executor, histories) = build();
        let mut axes = [0.5; AXIS_COUNT];
        axes[5] = 0.0;
        axes[3] = 1.0;
        executor.compute(&axes);
        executor.execute();

        assert!((histories[2].lock()[0] + PITCH_RANGE).abs() < 1e-6);
        assert!((histories[3].lock()[0] - TWIST_RANGE).abs() < 1e-6);
    }

    #[test]
    fn test_reverse_calibration_flips_stroke() {
        let mut cal = ServoSettings::default();
        cal.l0.reverse = true;
        let servos: [Arc<dyn Actuator>; 4] =
            std::array::from_fn(|_| Arc::new(RecordingActuator::new(0.0)) as Arc<dyn Actuator>);
        let mut executor = OsrExecutor::new(servos, cal);

        let mut axes = [0.5; AXIS_COUNT];
        axes[0] = 1.0;
        executor.compute(&axes);
        // 反向后满行程输入等价于零行程输入
        assert!((executor.duties[0] - STROKE_RANGE).abs() < 1e-6);
        assert!((executor.duties[1] + STROKE_RANGE).abs() < 1e-6);
    }
}

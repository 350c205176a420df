//! SR6CAN 拓扑：六台 CAN 位置环电机驱动的六连杆平台
//!
//! 几何与 SR6 同族但臂长不同，输出不再是 PWM 占空比而是 CTW
//! 总线上的关节角。上电后经历三个阶段：
//! 等待反馈稳定（100 个采样，±4 rad 窗口外按整圈 ±8 修正）→
//! 回原点（反复下发 0 位，容差 0.01 rad）→ 正常运行。

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use motus_driver::CtwBus;
use motus_geometry::axis7_to_axis6;
use motus_protocol::ctw::{ControllerMode, InputMode};
use motus_protocol::tcode::AXIS_COUNT;
use tracing::{debug, info, warn};

use crate::ExecutorError;
use crate::runner::Executor;
use crate::settings::{MotorSettings, ServoSettings};

/// 电机数
const MOTOR_COUNT: usize = 6;
/// 关节角到电机圈数的传动比
const GEAR_BIAS: f32 = 4.0 / PI;
/// 反馈稳定判定所需的采样数
const STABLE_SAMPLE_COUNT: u32 = 100;
/// 回原点位置容差（rad）
const HOMING_TOLERANCE: f32 = 0.01;
/// 上电后等待反馈的最短时间
const SETTLE_TIME: Duration = Duration::from_secs(1);

/// 主臂支点到平台参考点的水平距离（0.01 mm）
const PIVOT_X: f32 = 22280.0;
/// 主电机连杆的纵向基准
const MAIN_Y_BASE: f32 = 4750.0;
/// 俯仰电机连杆的纵向基准
const PITCH_Y_BASE: f32 = 14250.0;
/// 左右主臂间距
const ARM_SPACING: f32 = 18000.0;
/// 滚转对俯仰连杆侧移的耦合臂长
const PITCH_Z_COUPLING: f32 = 8300.0;

/// 主电机反解：曲柄 105 mm、连杆 270 mm 的余弦定理
fn main_motor_angle(x: f32, y: f32) -> f32 {
    let x = x / 100.0;
    let y = y / 100.0;
    let gamma = x.atan2(y);
    let csq = x * x + y * y;
    let c = csq.sqrt();
    let beta = ((csq + 105.0 * 105.0 - 270.0 * 270.0) / (2.0 * 105.0 * c))
        .clamp(-1.0, 1.0)
        .acos();
    gamma + beta - PI
}

/// 俯仰电机反解：挂点先按俯仰角平移（臂长 83 mm，安装角 0.05 rad），
/// 等效连杆长 bsq 随侧移 z 变化
fn pitch_motor_angle(x: f32, y: f32, z: f32, pitch: f32) -> f32 {
    let pitch = pitch * 0.0001745;
    let x = x + 8300.0 * (0.05 + pitch).sin();
    let y = y - 8300.0 * (0.05 + pitch).cos();
    let x = x / 100.0;
    let y = y / 100.0;
    let z = z / 100.0;
    let bsq = 280.0 * 280.0 - (63.0 + z) * (63.0 + z);
    let gamma = x.atan2(y);
    let csq = x * x + y * y;
    let c = csq.sqrt();
    let beta = ((csq + 105.0 * 105.0 - bsq) / (2.0 * 105.0 * c))
        .clamp(-1.0, 1.0)
        .acos();
    gamma + beta - PI
}

/// 上电初始化阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    WaitingStability,
    Homing,
    Running,
}

pub struct Sr6CanExecutor {
    bus: Arc<CtwBus>,
    cal: ServoSettings,
    motor: MotorSettings,
    loop_frequency: u32,
    state: InitState,
    init_start: Instant,
    /// 解算出的关节角（rad），顺序 [下左, 上左, 俯仰左, 俯仰右, 上右, 下右]
    targets: [f32; MOTOR_COUNT],
    /// 带整圈修正的位置反馈
    feedback: [f32; MOTOR_COUNT],
    /// 整圈修正量（稳定期内确定，之后不变）
    feedback_offset: [f32; MOTOR_COUNT],
    stable: [u32; MOTOR_COUNT],
    last_update_us: [u64; MOTOR_COUNT],
    homing_targets: [f32; MOTOR_COUNT],
}

impl Sr6CanExecutor {
    pub fn new(
        bus: Arc<CtwBus>,
        cal: ServoSettings,
        motor: MotorSettings,
        loop_frequency: u32,
    ) -> Result<Self, ExecutorError> {
        let mut executor = Self {
            bus,
            cal,
            motor,
            loop_frequency,
            state: InitState::WaitingStability,
            init_start: Instant::now(),
            targets: [0.0; MOTOR_COUNT],
            feedback: [0.0; MOTOR_COUNT],
            feedback_offset: [0.0; MOTOR_COUNT],
            stable: [0; MOTOR_COUNT],
            last_update_us: [0; MOTOR_COUNT],
            homing_targets: [0.0; MOTOR_COUNT],
        };
        executor.init_motor_params()?;
        executor.init_motors()?;
        executor.init_start = Instant::now();
        info!("SR6CAN executor ready, waiting for feedback to settle");
        Ok(executor)
    }

    /// 下发位置/速度环增益与惯量
    fn init_motor_params(&self) -> Result<(), ExecutorError> {
        for node in 1..=MOTOR_COUNT as u8 {
            self.bus.set_position_gains(
                node,
                self.motor.position_kp,
                self.motor.position_ki,
                self.motor.position_kd,
            )?;
            self.bus.set_velocity_gains(
                node,
                self.motor.velocity_kp,
                self.motor.velocity_ki,
                self.motor.velocity_kd,
            )?;
            self.bus.set_inertia(node, 0.0)?;
            self.bus.set_position_integrator_limit(node, 1.0)?;
            info!(
                "motor {} gains set: pos {}/{}/{}, vel {}/{}/{}",
                node,
                self.motor.position_kp,
                self.motor.position_ki,
                self.motor.position_kd,
                self.motor.velocity_kp,
                self.motor.velocity_ki,
                self.motor.velocity_kd
            );
        }
        Ok(())
    }

    /// 位置模式 + 位置滤波，滤波带宽取循环频率的一半，然后上电闭环
    fn init_motors(&self) -> Result<(), ExecutorError> {
        for node in 1..=MOTOR_COUNT as u8 {
            self.bus
                .set_controller_mode(node, ControllerMode::Position, InputMode::PosFilter)?;
            self.bus
                .set_filter_bandwidth(node, self.loop_frequency as f32 * 0.5)?;
            self.bus.start_motor(node)?;
            std::thread::sleep(Duration::from_millis(10));
            info!("motor {} in position mode with input filtering", node);
        }
        Ok(())
    }

    /// 从反馈缓存更新位置，稳定期内确定整圈修正量
    fn update_feedback(&mut self) {
        for i in 0..MOTOR_COUNT {
            let Some(fb) = self.bus.get_cached_feedback(i as u8 + 1) else {
                continue;
            };
            if fb.last_update_us == 0 || fb.last_update_us == self.last_update_us[i] {
                continue;
            }
            self.last_update_us[i] = fb.last_update_us;

            if self.stable[i] < STABLE_SAMPLE_COUNT {
                if fb.position < -4.0 {
                    self.feedback_offset[i] = 8.0;
                } else if fb.position > 4.0 {
                    self.feedback_offset[i] = -8.0;
                }
                self.stable[i] += 1;
                if self.stable[i] == STABLE_SAMPLE_COUNT - 1 {
                    info!(
                        "motor {} settled: position {}, wrap offset {}",
                        i + 1,
                        fb.position,
                        self.feedback_offset[i]
                    );
                }
            }

            self.feedback[i] = fb.position + self.feedback_offset[i];
        }
    }

    fn all_motors_stable(&self) -> bool {
        self.stable.iter().all(|s| *s >= STABLE_SAMPLE_COUNT)
    }

    /// 回原点：全部电机回 0 位
    fn begin_homing(&mut self) {
        self.homing_targets = [0.0; MOTOR_COUNT];
        for node in 1..=MOTOR_COUNT as u8 {
            if let Err(e) = self.bus.set_position(node, 0.0) {
                warn!("homing command to motor {} failed: {}", node, e);
            }
        }
    }

    /// 回原点完成判定：每拍重发 0 位并比较反馈
    fn homing_complete(&mut self) -> bool {
        for node in 1..=MOTOR_COUNT as u8 {
            if let Err(e) = self.bus.set_position(node, 0.0) {
                warn!("homing command to motor {} failed: {}", node, e);
            }
        }
        self.feedback
            .iter()
            .zip(self.homing_targets)
            .all(|(current, target)| (current - target).abs() <= HOMING_TOLERANCE)
    }

    /// 电机方向修正：上排对（1、4）反向，右侧三台（>2）再反向
    fn directed_target(&self, i: usize) -> f32 {
        let mut target = self.targets[i];
        if i == 1 || i == 4 {
            target = -target;
        }
        if i > 2 {
            target = -target;
        }
        target
    }

    fn send_targets(&self) {
        for i in 0..MOTOR_COUNT {
            let final_pos = (self.directed_target(i) + self.motor.offsets[i] / 180.0 * PI)
                * GEAR_BIAS
                - self.feedback_offset[i];
            if let Err(e) = self.bus.set_position(i as u8 + 1, final_pos) {
                warn!("position command to motor {} failed: {}", i + 1, e);
            }
        }
    }
}

impl Executor for Sr6CanExecutor {
    fn compute(&mut self, axes: &[f32; AXIS_COUNT]) {
        let y = self.cal.l0.apply(axes[0], -6000.0, 6000.0);
        let x = self.cal.l1.apply(axes[1], -3000.0, 3000.0);
        let z = self.cal.l2.apply(axes[2], -3000.0, 3000.0);
        let roll = self.cal.r1.apply(axes[4], -2500.0, 2500.0);
        let pitch = self.cal.r2.apply(axes[5], -2500.0, 2500.0);

        // 滚转耦合项用延长臂换算前的滚转角
        let roll_sin = (roll / 100.0 / 180.0 * PI).sin();
        let d = ARM_SPACING / 2.0;

        // 第七轴延长臂：把末端位姿换算回平台位姿
        let ext = self.motor.extension_length;
        let (x6, y6, z6, _roll6, pitch6, _) = axis7_to_axis6(
            x as f64,
            (y + ext) as f64,
            z as f64,
            (roll / 100.0) as f64,
            (pitch / 100.0) as f64,
            0.0,
            ext as f64,
        );
        let x = x6 as f32;
        let y = y6 as f32;
        let z = z6 as f32;
        let pitch = pitch6 as f32 * 100.0;

        let lower_left = main_motor_angle(PIVOT_X - x, MAIN_Y_BASE + y + d * roll_sin);
        let lower_right = main_motor_angle(PIVOT_X - x, MAIN_Y_BASE + y - d * roll_sin);
        let upper_left = main_motor_angle(PIVOT_X - x, MAIN_Y_BASE - y - d * roll_sin);
        let upper_right = main_motor_angle(PIVOT_X - x, MAIN_Y_BASE - y + d * roll_sin);
        let pitch_left = pitch_motor_angle(
            PIVOT_X - x,
            PITCH_Y_BASE - y - d * roll_sin,
            z - PITCH_Z_COUPLING * roll_sin,
            -pitch,
        );
        let pitch_right = pitch_motor_angle(
            PIVOT_X - x,
            PITCH_Y_BASE - y + d * roll_sin,
            -(z - PITCH_Z_COUPLING * roll_sin),
            -pitch,
        );

        self.targets = [
            lower_left,
            upper_left,
            pitch_left,
            pitch_right,
            upper_right,
            lower_right,
        ];
    }

    fn execute(&mut self) {
        self.update_feedback();

        match self.state {
            InitState::WaitingStability => {
                if self.init_start.elapsed() < SETTLE_TIME {
                    return;
                }
                if !self.all_motors_stable() {
                    debug!(
                        "waiting for motor feedback: {:?}/{} samples",
                        self.stable, STABLE_SAMPLE_COUNT
                    );
                    return;
                }
                info!("all motors stable, homing");
                self.state = InitState::Homing;
                self.begin_homing();
            },
            InitState::Homing => {
                if self.homing_complete() {
                    info!("homing complete, entering run mode");
                    self.state = InitState::Running;
                }
            },
            InitState::Running => {
                self.send_targets();
            },
        }
    }

    fn on_stop(&mut self) {
        for node in 1..=MOTOR_COUNT as u8 {
            if let Err(e) = self.bus.stop_motor(node) {
                warn!("failed to idle motor {}: {}", node, e);
            }
        }
        info!("SR6CAN motors idled");
    }
}

//! 执行器工厂：按模式号组装拓扑
//!
//! 硬件句柄由组合根构造好后整体注入；工厂只做数量校验和装配，
//! 不接触任何平台相关的初始化。

use std::sync::Arc;

use motus_actuator::Actuator;
use motus_driver::CtwBus;
use tracing::info;

use crate::ExecutorError;
use crate::o6::O6Executor;
use crate::osr::OsrExecutor;
use crate::runner::Executor;
use crate::settings::Settings;
use crate::sr6::Sr6Executor;
use crate::sr6can::Sr6CanExecutor;
use crate::trrmax::TrRMaxExecutor;

/// 组合根注入的硬件句柄
pub struct ExecutorParts {
    /// 按通道顺序排列的舵机执行机构（数量由拓扑决定）
    pub servos: Vec<Arc<dyn Actuator>>,
    /// CTW 总线（仅 SR6CAN 模式需要）
    pub ctw: Option<Arc<CtwBus>>,
}

/// 支持的模式号
pub fn supported_modes() -> &'static [i32] {
    &[0, 3, 6, 8, 9]
}

/// 模式号的可读名称
pub fn mode_name(mode: i32) -> &'static str {
    match mode {
        0 => "OSR (Multi-Axis Motion)",
        3 => "SR6",
        6 => "TrRMax",
        8 => "SR6CAN",
        9 => "O6 (6-Axis Parallel Robot)",
        _ => "Unknown",
    }
}

/// 创建执行器
///
/// 舵机数不足或缺少总线句柄返回 [`ExecutorError::MissingHardware`]，
/// 未知模式返回 [`ExecutorError::UnknownMode`]。
pub fn create_executor(
    settings: &Settings,
    parts: ExecutorParts,
) -> Result<Box<dyn Executor>, ExecutorError> {
    let mode = settings.servo.mode;
    info!("creating executor, mode: {} ({})", mode, mode_name(mode));

    match mode {
        0 => {
            let servos = take_servos::<4>(parts.servos, mode)?;
            Ok(Box::new(OsrExecutor::new(servos, settings.servo)))
        },
        3 => {
            let mut servos = parts.servos;
            if servos.len() < 7 {
                return Err(missing(mode, 7, servos.len()));
            }
            servos.truncate(7);
            let twist = match servos.pop() {
                Some(twist) => twist,
                None => return Err(missing(mode, 7, 0)),
            };
            let mains = take_servos::<6>(servos, mode)?;
            Ok(Box::new(Sr6Executor::new(mains, twist, settings.servo)))
        },
        6 => {
            let servos = take_servos::<3>(parts.servos, mode)?;
            Ok(Box::new(TrRMaxExecutor::new(servos, settings.servo)))
        },
        8 => {
            let bus = parts.ctw.ok_or_else(|| ExecutorError::MissingHardware {
                mode,
                detail: "a CTW CAN bus".to_string(),
            })?;
            Ok(Box::new(Sr6CanExecutor::new(
                bus,
                settings.servo,
                settings.motor,
                settings.servo.pwm_frequency,
            )?))
        },
        9 => {
            let servos = take_servos::<6>(parts.servos, mode)?;
            Ok(Box::new(O6Executor::new(servos, settings.servo)))
        },
        _ => Err(ExecutorError::UnknownMode { mode }),
    }
}

fn missing(mode: i32, required: usize, got: usize) -> ExecutorError {
    ExecutorError::MissingHardware {
        mode,
        detail: format!("{required} servo channels (got {got})"),
    }
}

/// 取前 N 个舵机句柄；不足时报缺
fn take_servos<const N: usize>(
    mut servos: Vec<Arc<dyn Actuator>>,
    mode: i32,
) -> Result<[Arc<dyn Actuator>; N], ExecutorError> {
    let got = servos.len();
    if got < N {
        return Err(missing(mode, N, got));
    }
    servos.truncate(N);
    servos.try_into().map_err(|_| missing(mode, N, got))
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_actuator::mock::RecordingActuator;

    fn recording_servos(n: usize) -> Vec<Arc<dyn Actuator>> {
        (0..n)
            .map(|_| Arc::new(RecordingActuator::new(0.0)) as Arc<dyn Actuator>)
            .collect()
    }

    fn settings_with_mode(mode: i32) -> Settings {
        let mut settings = Settings::default();
        settings.servo.mode = mode;
        settings
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(mode_name(0), "OSR (Multi-Axis Motion)");
        assert_eq!(mode_name(8), "SR6CAN");
        assert_eq!(mode_name(5), "Unknown");
        assert_eq!(supported_modes(), &[0, 3, 6, 8, 9]);
    }

    #[test]
    fn test_create_pwm_topologies() {
        for (mode, servo_count) in [(0, 4usize), (3, 7), (6, 3), (9, 6)] {
            let parts = ExecutorParts {
                servos: recording_servos(servo_count),
                ctw: None,
            };
            let result = create_executor(&settings_with_mode(mode), parts);
            assert!(result.is_ok(), "mode {mode} must build");
        }
    }

    #[test]
    fn test_extra_servos_are_tolerated() {
        let parts = ExecutorParts {
            servos: recording_servos(8),
            ctw: None,
        };
        assert!(create_executor(&settings_with_mode(0), parts).is_ok());
    }

    #[test]
    fn test_missing_servos_rejected() {
        let parts = ExecutorParts {
            servos: recording_servos(2),
            ctw: None,
        };
        let Err(err) = create_executor(&settings_with_mode(0), parts) else {
            panic!("mode 0 with 2 servos must fail");
        };
        assert!(matches!(err, ExecutorError::MissingHardware { mode: 0, .. }));
    }

    #[test]
    fn test_sr6can_requires_bus() {
        let parts = ExecutorParts {
            servos: Vec::new(),
            ctw: None,
        };
        let Err(err) = create_executor(&settings_with_mode(8), parts) else {
            panic!("mode 8 without a bus must fail");
        };
        assert!(matches!(err, ExecutorError::MissingHardware { mode: 8, .. }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let parts = ExecutorParts {
            servos: recording_servos(8),
            ctw: None,
        };
        let Err(err) = create_executor(&settings_with_mode(42), parts) else {
            panic!("mode 42 must be rejected");
        };
        assert!(matches!(err, ExecutorError::UnknownMode { mode: 42 }));
    }
}

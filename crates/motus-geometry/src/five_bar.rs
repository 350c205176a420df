//! 五连杆机构逆解

use nalgebra::Point3;

use crate::{GeometryError, distance};

/// 五连杆逆解：给定两个电机轴位置、摇臂长、连杆长和末端目标点，
/// 求两个摇臂角
///
/// 对每个电机轴做两次余弦定理：一次针对末端点三角形
/// (摇臂 b、电机到末端 c、连杆 a)，一次针对中点三角形
/// (轴距半长 e、电机到末端 c、末端到中点 d)，
/// 摇臂角 = π − θ1 − θ2，取 y>0 一侧的解。
///
/// acos 参数超出 [-1,1]（目标不可达）返回 `None`；
/// 非正的杆长参数返回参数错误。
pub fn five_bar_back_kinematics(
    motor1: &Point3<f64>,
    motor2: &Point3<f64>,
    arm: f64,
    link: f64,
    p: &Point3<f64>,
) -> Result<Option<(f64, f64)>, GeometryError> {
    if arm <= 0.0 || link <= 0.0 {
        return Err(GeometryError::InvalidParameter(
            "rocker arm and connecting rod lengths must be greater than 0".to_string(),
        ));
    }

    let mid = nalgebra::center(motor1, motor2);

    let Some(theta1) = solve_angle(arm, link, motor1, &mid, p) else {
        return Ok(None);
    };
    let Some(theta2) = solve_angle(arm, link, motor2, &mid, p) else {
        return Ok(None);
    };

    Ok(Some((theta1, theta2)))
}

/// 单侧摇臂角：两次余弦定理，任一 acos 超域即无解
fn solve_angle(
    arm: f64,
    link: f64,
    motor: &Point3<f64>,
    mid: &Point3<f64>,
    p: &Point3<f64>,
) -> Option<f64> {
    let a = link;
    let b = arm;
    let c = distance(p, motor);
    let d = distance(p, mid);
    let e = distance(mid, motor);

    let theta1 = checked_acos((b * b + c * c - a * a) / (2.0 * b * c))?;
    let theta2 = checked_acos((e * e + c * c - d * d) / (2.0 * e * c))?;

    Some(std::f64::consts::PI - theta1 - theta2)
}

/// acos 的显式域检查版本：参数出域或非有限返回 None
fn checked_acos(arg: f64) -> Option<f64> {
    if !arg.is_finite() || !(-1.0..=1.0).contains(&arg) {
        return None;
    }
    Some(arg.acos())
}

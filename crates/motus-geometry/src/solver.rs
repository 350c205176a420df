//! O6 六轴并联平台复合求解器与七轴位姿换算

use nalgebra::{Matrix4, Point3, Vector3};

use crate::line::Line;
use crate::transform::{
    euler_degrees_to_radians, pose_to_homogeneous_matrix, transform_point,
};
use crate::{angle_between, five_bar_back_kinematics};

/// O6 机构几何参数
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicsParams {
    /// 平台连接点分布半径
    pub r: f64,
    /// 摇臂长
    pub arm: f64,
    /// 连杆长
    pub link: f64,
    /// 第一组电机轴位置（0° 腿）
    pub a: Point3<f64>,
    /// 第二组电机轴位置（0° 腿）
    pub b: Point3<f64>,
    /// 平台安装偏置（非零时对目标位置做前置位姿变换）
    pub offset: f64,
}

impl Default for KinematicsParams {
    fn default() -> Self {
        Self {
            r: 4.9,
            arm: 9.0,
            link: 21.0,
            a: Point3::new(7.8, -1.25, 0.0),
            b: Point3::new(7.8, 1.25, 0.0),
            offset: 0.0,
        }
    }
}

/// O6 逆运动学：位姿 (x,y,z,roll,pitch,yaw 度) → 6 个摇臂角（弧度）
///
/// 三个平台连接点按 120° 分布，经位姿矩阵变换后逐腿求解：
/// 电机轴线 ab → 平台点向轴线作垂线求垂足 → 平台点相对垂足
/// 与竖直方向的夹角 → 将平台点绕轴线旋回摇臂平面 → 五连杆逆解。
/// 任一腿几何退化或不可达即整体无解（`None`），调用方保持上一组输出。
pub fn solve_robot_kinematics(
    x: f64,
    y: f64,
    z: f64,
    roll_deg: f64,
    pitch_deg: f64,
    yaw_deg: f64,
    params: &KinematicsParams,
) -> Option<[f64; 6]> {
    let (roll, pitch, yaw) = euler_degrees_to_radians(roll_deg, pitch_deg, yaw_deg);

    // 安装偏置：目标位置先经带偏置的位姿矩阵变换
    let (x, y, z) = if params.offset != 0.0 {
        let t0 = pose_to_homogeneous_matrix(0.0, 0.0, params.offset, roll, pitch, yaw);
        let p = transform_point(&t0, &Point3::new(x, y, z));
        (p.x, p.y, p.z)
    } else {
        (x, y, z)
    };

    let t1 = pose_to_homogeneous_matrix(x, y, z, roll, pitch, yaw);

    let mut thetas = [0.0f64; 6];
    let up = Vector3::new(0.0, 0.0, 1.0);

    for i in 0..3 {
        let t = i as f64 * 2.0 * std::f64::consts::PI / 3.0;
        let local = Point3::new(params.r * t.cos(), params.r * t.sin(), 0.0);
        let p = transform_point(&t1, &local);

        // 该腿的电机轴对：0°/120°/240° 旋转副本
        let ta = pose_to_homogeneous_matrix(0.0, 0.0, 0.0, 0.0, 0.0, t);
        let a = transform_point(&ta, &params.a);
        let b = transform_point(&ta, &params.b);

        let l_ab = Line::from_points(&a, &b).ok()?;
        let vel = l_ab.vertical_line(&p).ok()?;
        let intersection = l_ab.intersection_with(&vel)?;

        let m = p - intersection;
        let angle = angle_between(&m, &up);

        let p1 = l_ab.rotate_point_around_line(&p, angle);

        let (theta1, theta2) =
            five_bar_back_kinematics(&a, &b, params.arm, params.link, &p1).ok()??;
        thetas[i * 2] = theta1;
        thetas[i * 2 + 1] = theta2;
    }

    Some(thetas)
}

/// 七轴末端位姿换算到第六轴末端位姿
///
/// 第七轴是沿第六轴 y 方向长度 `extension_length` 的延长臂。
/// 输入/输出角度均为度，旋转顺序 roll(x) → twist(y) → pitch(z)。
/// 返回 (x6, y6, z6, roll6, pitch6, twist6)。
pub fn axis7_to_axis6(
    x7: f64,
    y7: f64,
    z7: f64,
    roll7_deg: f64,
    pitch7_deg: f64,
    twist7_deg: f64,
    extension_length: f64,
) -> (f64, f64, f64, f64, f64, f64) {
    let deg = std::f64::consts::PI / 180.0;
    let roll = roll7_deg * deg;
    let pitch = pitch7_deg * deg;
    let twist = twist7_deg * deg;

    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (st, ct) = twist.sin_cos();

    // 第七轴末端旋转矩阵，旋转顺序 roll(x) → twist(y) → pitch(z)
    #[rustfmt::skip]
    let t7 = Matrix4::new(
        cp * ct + sp * sr * st, -sp * cr, cp * st - sp * sr * ct, x7,
        sp * ct - cp * sr * st,  cp * cr, sp * st + cp * sr * ct, y7,
        -cr * st,                sr,      cr * ct,                z7,
        0.0,                     0.0,     0.0,                    1.0,
    );

    // T6 = T7 · inv(T_6_to_7)，延长臂是纯 y 平移，逆为负平移
    #[rustfmt::skip]
    let t6to7_inv = Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, -extension_length,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );

    let t6 = t7 * t6to7_inv;

    let x6 = t6[(0, 3)];
    let y6 = t6[(1, 3)];
    let z6 = t6[(2, 3)];

    // 旋转矩阵 → 欧拉角，处理万向节锁奇异
    let sy = (t6[(0, 0)] * t6[(0, 0)] + t6[(1, 0)] * t6[(1, 0)]).sqrt();

    let (roll6, twist6, pitch6) = if sy > 1e-6 {
        (
            t6[(2, 1)].atan2(t6[(2, 2)]),
            (-t6[(2, 0)]).atan2(sy),
            t6[(1, 0)].atan2(t6[(0, 0)]),
        )
    } else {
        (
            (-t6[(1, 2)]).atan2(t6[(1, 1)]),
            (-t6[(2, 0)]).atan2(sy),
            0.0,
        )
    };

    (
        x6,
        y6,
        z6,
        roll6 / deg,
        pitch6 / deg,
        twist6 / deg,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_pose_solvable() {
        // 标定姿态（仅 z 抬升）必须有解，且三条腿对称
        let params = KinematicsParams::default();
        let thetas = solve_robot_kinematics(0.0, 0.0, 19.3, 0.0, 0.0, 0.0, &params)
            .expect("home pose must be reachable");

        for theta in thetas {
            assert!(theta.is_finite());
        }
        // 三条腿同构，零位姿下各腿角度一致
        assert!((thetas[0] - thetas[2]).abs() < 1e-6);
        assert!((thetas[0] - thetas[4]).abs() < 1e-6);
        assert!((thetas[1] - thetas[3]).abs() < 1e-6);
    }

    #[test]
    fn test_small_perturbations_solvable() {
        let params = KinematicsParams::default();
        for (x, y, roll) in [(0.5, 0.0, 2.0), (-0.5, 0.5, -3.0), (0.0, -1.0, 0.0)] {
            let thetas =
                solve_robot_kinematics(x, y, 19.3, roll, roll / 2.0, -roll, &params)
                    .expect("near-home poses must be reachable");
            for theta in thetas {
                assert!(theta.is_finite());
            }
        }
    }

    #[test]
    fn test_unreachable_pose_returns_none() {
        let params = KinematicsParams::default();
        // 远超 arm + link 的 z 高度
        assert!(solve_robot_kinematics(0.0, 0.0, 500.0, 0.0, 0.0, 0.0, &params).is_none());
    }

    #[test]
    fn test_no_nan_over_extreme_inputs() {
        let params = KinematicsParams::default();
        for z in [-100.0, 0.0, 19.3, 100.0] {
            for roll in [-180.0, -45.0, 0.0, 45.0, 180.0] {
                if let Some(thetas) =
                    solve_robot_kinematics(3.0, -3.0, z, roll, roll, roll, &params)
                {
                    for theta in thetas {
                        assert!(theta.is_finite(), "solver must never return NaN");
                    }
                }
            }
        }
    }

    #[test]
    fn test_axis7_identity() {
        // 零延长臂、零姿态：位姿原样通过
        let (x, y, z, r, p, t) = axis7_to_axis6(1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0);
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 2.0).abs() < 1e-9);
        assert!((z - 3.0).abs() < 1e-9);
        assert!(r.abs() < 1e-9 && p.abs() < 1e-9 && t.abs() < 1e-9);
    }

    #[test]
    fn test_axis7_extension_translates_y() {
        // 零姿态下延长臂只沿 y 回退
        let (x, y, z, r, p, t) = axis7_to_axis6(0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 4.0);
        assert!((x - 0.0).abs() < 1e-9);
        assert!((y - 6.0).abs() < 1e-9);
        assert!((z - 0.0).abs() < 1e-9);
        assert!(r.abs() < 1e-9 && p.abs() < 1e-9 && t.abs() < 1e-9);
    }

    #[test]
    fn test_axis7_angles_preserved_at_zero_twist() {
        // 角度提取按 roll→twist→pitch 的构造顺序展开，
        // 只有零扭转时欧拉角精确往返
        let (_, _, _, r, p, t) = axis7_to_axis6(0.0, 0.0, 0.0, 10.0, -5.0, 0.0, 0.0);
        assert!((r - 10.0).abs() < 1e-6);
        assert!((p + 5.0).abs() < 1e-6);
        assert!(t.abs() < 1e-6);
    }

    #[test]
    fn test_axis7_nonzero_twist_stays_finite() {
        let (x, y, z, r, p, t) = axis7_to_axis6(1.0, 2.0, 3.0, 10.0, -5.0, 3.0, 4.0);
        for v in [x, y, z, r, p, t] {
            assert!(v.is_finite());
        }
    }
}

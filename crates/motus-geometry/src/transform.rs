//! 2D/3D 齐次变换

use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3, Vector4};

/// 角度转弧度
pub fn degree_to_radian(theta_deg: f64) -> f64 {
    theta_deg * std::f64::consts::PI / 180.0
}

/// 欧拉角（度）批量转弧度
pub fn euler_degrees_to_radians(
    roll_deg: f64,
    pitch_deg: f64,
    yaw_deg: f64,
) -> (f64, f64, f64) {
    (
        degree_to_radian(roll_deg),
        degree_to_radian(pitch_deg),
        degree_to_radian(yaw_deg),
    )
}

/// 2D 位姿转 3x3 齐次变换矩阵（绕 z 轴旋转 theta 弧度）
pub fn pose_to_homogeneous_matrix_2d(x: f64, y: f64, theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(
        c, -s, x, //
        s, c, y, //
        0.0, 0.0, 1.0,
    )
}

/// 用 3x3 齐次矩阵变换 2D 点
pub fn transform_point_2d(t: &Matrix3<f64>, point: &Point2<f64>) -> Point2<f64> {
    let v = t * nalgebra::Vector3::new(point.x, point.y, 1.0);
    Point2::new(v.x, v.y)
}

/// 6 轴位姿转 4x4 齐次变换矩阵
///
/// 旋转按 ZYX 欧拉角顺序：R = Rz(yaw) · Ry(pitch) · Rx(roll)，
/// roll/pitch/yaw 均为弧度。
pub fn pose_to_homogeneous_matrix(
    x: f64,
    y: f64,
    z: f64,
    roll: f64,
    pitch: f64,
    yaw: f64,
) -> Matrix4<f64> {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();

    Matrix4::new(
        cy * cp,
        cy * sp * sr - sy * cr,
        cy * sp * cr + sy * sr,
        x,
        sy * cp,
        sy * sp * sr + cy * cr,
        sy * sp * cr - cy * sr,
        y,
        -sp,
        cp * sr,
        cp * cr,
        z,
        0.0,
        0.0,
        0.0,
        1.0,
    )
}

/// 用 4x4 齐次矩阵变换 3D 点
pub fn transform_point(t: &Matrix4<f64>, point: &Point3<f64>) -> Point3<f64> {
    let v = t * Vector4::new(point.x, point.y, point.z, 1.0);
    Point3::new(v.x, v.y, v.z)
}

/// 用 4x4 齐次矩阵变换方向向量（忽略平移）
pub fn transform_direction(t: &Matrix4<f64>, dir: &Vector3<f64>) -> Vector3<f64> {
    let v = t * Vector4::new(dir.x, dir.y, dir.z, 0.0);
    Vector3::new(v.x, v.y, v.z)
}

//! # Motus Geometry
//!
//! 运动学求解用的纯几何库：齐次变换、三维直线、五连杆逆解、
//! O6 六轴并联平台复合求解器。
//!
//! ## 失败语义
//!
//! 几何上不可行（无交点、acos 超域、点共线退化）一律以
//! `Option::None` 或 `GeometryError` 显式返回，绝不 panic、
//! 绝不产出 NaN；所有 acos/asin 的参数在求值前钳制到 [-1,1]。

pub mod five_bar;
pub mod line;
pub mod solver;
pub mod transform;

pub use five_bar::five_bar_back_kinematics;
pub use line::Line;
pub use solver::{KinematicsParams, axis7_to_axis6, solve_robot_kinematics};

use nalgebra::{Point3, Vector3};
use thiserror::Error;

/// 几何构造错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Points coincide, cannot define a line")]
    CoincidentPoints,

    #[error("Direction vector has zero length")]
    ZeroDirection,

    #[error("Point lies on the line, perpendicular is undefined")]
    PointOnLine,

    #[error("Invalid linkage parameter: {0}")]
    InvalidParameter(String),
}

/// 两个三维方向向量的夹角（弧度）
///
/// 余弦值钳制到 [-1,1]，任何输入都不会产出 NaN。
pub fn angle_between(v1: &Vector3<f64>, v2: &Vector3<f64>) -> f64 {
    let n1 = v1.norm();
    let n2 = v2.norm();
    if n1 < f64::EPSILON || n2 < f64::EPSILON {
        return 0.0;
    }
    (v1.dot(v2) / (n1 * n2)).clamp(-1.0, 1.0).acos()
}

/// 两点间距离
pub fn distance(p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    (p2 - p1).norm()
}

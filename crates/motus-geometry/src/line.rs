//! 三维直线：交点、垂线、绕线旋转

use nalgebra::{Point3, Vector3};

use crate::GeometryError;

/// 空间直线（参考点 + 单位方向向量）
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    point: Point3<f64>,
    direction: Vector3<f64>,
}

impl Line {
    /// 两点式构造；两点重合（机器 epsilon 容差）视为退化
    pub fn from_points(p1: &Point3<f64>, p2: &Point3<f64>) -> Result<Line, GeometryError> {
        let dir = p2 - p1;
        if dir.norm() < f64::EPSILON {
            return Err(GeometryError::CoincidentPoints);
        }
        Ok(Line {
            point: *p1,
            direction: dir.normalize(),
        })
    }

    /// 点向式构造；零长方向向量视为退化
    pub fn from_point_direction(
        point: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<Line, GeometryError> {
        if direction.norm() < f64::EPSILON {
            return Err(GeometryError::ZeroDirection);
        }
        Ok(Line {
            point: *point,
            direction: direction.normalize(),
        })
    }

    /// 直线上的参考点
    pub fn point(&self) -> &Point3<f64> {
        &self.point
    }

    /// 单位方向向量
    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    /// 参数 t 处的点
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.point + self.direction * t
    }

    /// 直线上距给定点最近的点（垂足）
    pub fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let t = (point - self.point).dot(&self.direction);
        self.point_at(t)
    }

    /// 点到直线的距离（叉积模长法，方向向量为单位向量）
    pub fn distance_to_point(&self, point: &Point3<f64>) -> f64 {
        (point - self.point).cross(&self.direction).norm()
    }

    /// 过线外一点作本线的垂线
    ///
    /// 点在线上时垂线方向未定义，返回错误。
    pub fn vertical_line(&self, point: &Point3<f64>) -> Result<Line, GeometryError> {
        let foot = self.closest_point(point);
        let perpendicular = foot - point;
        if perpendicular.norm() < f64::EPSILON {
            return Err(GeometryError::PointOnLine);
        }
        Line::from_point_direction(point, &perpendicular)
    }

    /// 两直线交点
    ///
    /// 平行且不共线返回 `None`；共线返回本线参考点。
    /// 斜交情况下从 xy/xz/yz 三个投影中选行列式绝对值最大的
    /// 二元子方程组求解，避免病态投影。
    pub fn intersection_with(&self, other: &Line) -> Option<Point3<f64>> {
        const TOLERANCE: f64 = 1e-6;

        let cross = self.direction.cross(&other.direction);
        if cross.norm() < TOLERANCE {
            if self.distance_to_point(&other.point) < TOLERANCE {
                return Some(self.point);
            }
            return None;
        }

        // P1 + t1*d1 = P2 + t2*d2 → [d1, -d2] [t1 t2]^T = P2 - P1
        let a11 = self.direction.x;
        let a12 = -other.direction.x;
        let a21 = self.direction.y;
        let a22 = -other.direction.y;
        let a31 = self.direction.z;
        let a32 = -other.direction.z;

        let b = other.point - self.point;

        let det1 = a11 * a22 - a12 * a21;
        let det2 = a11 * a32 - a12 * a31;
        let det3 = a21 * a32 - a22 * a31;

        let t1 = if det1.abs() >= det2.abs() && det1.abs() >= det3.abs() {
            if det1.abs() < TOLERANCE {
                return None;
            }
            (b.x * a22 - a12 * b.y) / det1
        } else if det2.abs() >= det3.abs() {
            if det2.abs() < TOLERANCE {
                return None;
            }
            (b.x * a32 - a12 * b.z) / det2
        } else {
            if det3.abs() < TOLERANCE {
                return None;
            }
            (b.y * a32 - a22 * b.z) / det3
        };

        Some(self.point_at(t1))
    }

    /// 将点绕本直线旋转 angle 弧度（Rodrigues 公式，正角为逆时针）
    pub fn rotate_point_around_line(&self, point: &Point3<f64>, angle: f64) -> Point3<f64> {
        let k = &self.direction;
        let r = point - self.point;
        let (s, c) = angle.sin_cos();

        let rotated = r * c + k.cross(&r) * s + k * (k.dot(&r)) * (1.0 - c);
        self.point + rotated
    }
}

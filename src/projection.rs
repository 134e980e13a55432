//! # 3d 到 2d 的投影
//!
//! `pixel_homogeneous = intrinsic · (rotation · point + translation)`，再做透视除法。
//! depth（齐次坐标的第三个分量）不大于 0 的点在相机后方，不参与任何 2d 框的计算。

use geo::{
    intersects::Intersects,
    polygon,
    prelude::{Area, BoundingRect, ConvexHull},
    LineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use geo_clipper::Clipper;
use itertools::{Itertools, MinMaxResult};
use nalgebra as na;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::data::{BBox2D, BBox3D::CornerPoints};
use crate::error::{ConvertError, Result};

/// geo-clipper 在整数坐标上裁剪，像素坐标先乘以这个系数
const CLIPPER_FACTOR: f64 = 1e4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}
impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 是否落在 [0, width) x [0, height) 内
    pub fn contains(&self, u: f32, v: f32) -> bool {
        (0f32..self.width as f32).contains(&u) && (0f32..self.height as f32).contains(&v)
    }
}

/// 一个相机的内参与外参
///
/// 外参把参考坐标系（激光雷达或相机矫正坐标系）下的点变换到该相机坐标系
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPair {
    pub intrinsic: na::Matrix3<f32>,
    pub rotation: na::Matrix3<f32>,
    pub translation: na::Vector3<f32>,
}

fn split_3x4(m: &na::Matrix3x4<f32>) -> (na::Matrix3<f32>, na::Vector3<f32>) {
    (
        na::Matrix3::from_fn(|r, c| m[(r, c)]),
        na::Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]),
    )
}

impl CalibrationPair {
    pub fn new(intrinsic: na::Matrix3<f32>, rotation: na::Matrix3<f32>, translation: na::Vector3<f32>) -> Self {
        Self { intrinsic, rotation, translation }
    }

    /// 内参 3x3 加外参 [R|t] 3x4
    pub fn from_extrinsic_3x4(intrinsic: na::Matrix3<f32>, extrinsic: &na::Matrix3x4<f32>) -> Self {
        let (rotation, translation) = split_3x4(extrinsic);
        Self::new(intrinsic, rotation, translation)
    }

    /// KITTI 的投影矩阵 P = [K | K·b]，作用在矫正后的相机坐标系上
    pub fn from_projection_3x4(projection: &na::Matrix3x4<f32>) -> Result<Self> {
        let (intrinsic, offset) = split_3x4(projection);
        let baseline = intrinsic.try_inverse().ok_or(ConvertError::SingularCalib)? * offset;
        Ok(Self::new(intrinsic, na::Matrix3::identity(), baseline))
    }

    /// 激光雷达 -> Tr_velo_to_cam -> R0_rect -> P，合成为一组内外参
    pub fn from_kitti(
        projection: &na::Matrix3x4<f32>,
        r0_rect: &na::Matrix3<f32>,
        velo_to_cam: &na::Matrix3x4<f32>,
    ) -> Result<Self> {
        let camera = Self::from_projection_3x4(projection)?;
        let (velo_rot, velo_trans) = split_3x4(velo_to_cam);
        Ok(Self::new(
            camera.intrinsic,
            r0_rect * velo_rot,
            r0_rect * velo_trans + camera.translation,
        ))
    }

    /// 只做外参变换，得到相机坐标系下的点
    pub fn to_camera(&self, point: &na::Point3<f32>) -> na::Point3<f32> {
        na::Point3::from(self.rotation * point.coords + self.translation)
    }

    /// 外参变换的逆，相机坐标系 -> 参考坐标系
    pub fn from_camera(&self, point: &na::Point3<f32>) -> Option<na::Point3<f32>> {
        let inv = self.rotation.try_inverse()?;
        Some(na::Point3::from(inv * (point.coords - self.translation)))
    }

    pub fn project_point(&self, point: &na::Point3<f32>) -> ProjectedPoint {
        let q = self.intrinsic * self.to_camera(point).coords;
        ProjectedPoint {
            u: q.x / q.z,
            v: q.y / q.z,
            depth: q.z,
        }
    }

    pub fn project_points(&self, points: &[na::Point3<f32>]) -> Vec<ProjectedPoint> {
        points.iter().map(|p| self.project_point(p)).collect()
    }

    /// 参考坐标系下绕竖直轴 (z) 的朝向 -> 相机坐标系下绕 y 轴的 rotation_y
    pub fn heading_to_camera(&self, yaw: f32) -> f32 {
        let dir = self.rotation * na::Vector3::new(yaw.cos(), yaw.sin(), 0f32);
        (-dir.z).atan2(dir.x)
    }

    pub fn intrinsic_rows(&self) -> [[f32; 3]; 3] {
        let k = &self.intrinsic;
        [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ]
    }
}

/// 投影后的像素坐标，depth 为齐次坐标的第三个分量
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectedPoint {
    pub u: f32,
    pub v: f32,
    pub depth: f32,
}
impl ProjectedPoint {
    /// 在相机前方；depth <= 0 的 (u, v) 没有意义
    pub fn in_front(&self) -> bool {
        self.depth > 0f32
    }
}

/// 由投影后的边角点得到 2d 框的方式，同一调用处只用一种
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReductionPolicy {
    /// 直接取相机前方边角点的外接矩形
    BoundingRect,
    /// 先把每个坐标截断到画布内，再取外接矩形
    CanvasClip,
    /// 相机前方边角点的凸包与画布求交，取交集的外接矩形；不相交则没有框
    HullCanvasIntersection,
}

fn bounding_rect(points: impl Iterator<Item = (f64, f64)>) -> Option<BBox2D> {
    let (xs, ys): (Vec<_>, Vec<_>) = points.map(|(x, y)| (OrderedFloat(x), OrderedFloat(y))).unzip();
    let range = |values: Vec<OrderedFloat<f64>>| match values.into_iter().minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v.0, v.0)),
        MinMaxResult::MinMax(min, max) => Some((min.0, max.0)),
    };
    let ((x1, x2), (y1, y2)) = (range(xs)?, range(ys)?);
    Some(BBox2D {
        x1: x1 as f32,
        y1: y1 as f32,
        x2: x2 as f32,
        y2: y2 as f32,
    })
}

fn canvas_polygon(canvas: ImageSize) -> Polygon<f64> {
    let (w, h) = (canvas.width as f64, canvas.height as f64);
    polygon![
        (x: 0f64, y: 0f64),
        (x: w, y: 0f64),
        (x: w, y: h),
        (x: 0f64, y: h),
    ]
}

fn clamp_to_canvas(points: &[(f64, f64)], canvas: ImageSize) -> impl Iterator<Item = (f64, f64)> + '_ {
    let (w, h) = (canvas.width as f64, canvas.height as f64);
    points.iter().map(move |(u, v)| (u.clamp(0f64, w), v.clamp(0f64, h)))
}

/// 凸包退化为点或线段（相机前方只剩 1、2 个边角点或它们共线）时，
/// 与画布有交则取截断到画布后的外接矩形
fn degenerate_hull_rect(points: &[(f64, f64)], canvas: ImageSize) -> Option<BBox2D> {
    let canvas_polygon = canvas_polygon(canvas);
    let distinct: Vec<(f64, f64)> = points.iter().copied().dedup().collect();
    let touches = match distinct.as_slice() {
        [p] => Point::from(*p).intersects(&canvas_polygon),
        _ => LineString::from(distinct.clone()).intersects(&canvas_polygon),
    };
    if !touches {
        return None;
    }
    bounding_rect(clamp_to_canvas(points, canvas))
}

fn hull_canvas_intersection(points: &[(f64, f64)], canvas: ImageSize) -> Option<BBox2D> {
    let hull = MultiPoint::from(points.to_vec()).convex_hull();
    if hull.unsigned_area() == 0f64 {
        return degenerate_hull_rect(points, canvas);
    }
    let canvas_polygon = canvas_polygon(canvas);
    if !hull.intersects(&canvas_polygon) {
        return None;
    }
    // 只在边界上接触时交集为空
    let visible: MultiPolygon<f64> = hull.intersection(&canvas_polygon, CLIPPER_FACTOR);
    let rect = visible.bounding_rect()?;
    Some(BBox2D {
        x1: rect.min().x as f32,
        y1: rect.min().y as f32,
        x2: rect.max().x as f32,
        y2: rect.max().y as f32,
    })
}

/// 把投影后的点归约为一个 2d 框；没有任何点在相机前方时返回 None
pub fn reduce(projected: &[ProjectedPoint], policy: ReductionPolicy, canvas: ImageSize) -> Option<BBox2D> {
    let front: Vec<(f64, f64)> = projected
        .iter()
        .filter(|p| p.in_front())
        .map(|p| (p.u as f64, p.v as f64))
        .collect();
    if front.is_empty() {
        return None;
    }
    match policy {
        ReductionPolicy::BoundingRect => bounding_rect(front.into_iter()),
        ReductionPolicy::CanvasClip => bounding_rect(clamp_to_canvas(&front, canvas)),
        ReductionPolicy::HullCanvasIntersection => hull_canvas_intersection(&front, canvas),
    }
}

pub fn project_box(
    corners: &CornerPoints,
    calib: &CalibrationPair,
    policy: ReductionPolicy,
    canvas: ImageSize,
) -> Option<BBox2D> {
    reduce(&calib.project_points(&corners.0), policy, canvas)
}

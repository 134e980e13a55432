//! # 3d bbox 几何
//!
//! 由 (center, size, yaw) 生成 8 个边角点，模板与坐标系约定见 `data` 模块中的示意图

use core::f32::consts::FRAC_PI_2;

use itertools::{Itertools, MinMaxResult};
use nalgebra as na;
use ordered_float::OrderedFloat;

use crate::data::BBox3D::{CenterSizeYaw, CoordFrame, CornerPoints, Size3};

/// 标注的朝向以另一条轴为起点时使用的固定偏移
///
/// 只由 `LabelConvention` 施加，同一种标注约定下处处一致
pub const HEADING_OFFSET: f32 = FRAC_PI_2;

/// 底面足迹在 (长, 宽) 方向上的符号，(i) 与 (i+4) 共用
const FOOTPRINT: [(f32, f32); 4] = [(1f32, 1f32), (1f32, -1f32), (-1f32, -1f32), (-1f32, 1f32)];

/// 只绕竖直轴旋转 yaw 再平移到 center 的刚体变换
pub fn box_isometry(center: &na::Point3<f32>, yaw: f32, frame: CoordFrame) -> na::Isometry3<f32> {
    na::Isometry3::new(center.coords, frame.vertical_axis().into_inner() * yaw)
}

pub fn corners(center: &na::Point3<f32>, size: &Size3, yaw: f32, frame: CoordFrame) -> CornerPoints {
    let iso = box_isometry(center, yaw, frame);
    let (half_l, half_w, half_h) = (size.length / 2f32, size.width / 2f32, size.height / 2f32);

    let mut points = [na::Point3::origin(); 8];
    for (idx, (sign_l, sign_w)) in FOOTPRINT.iter().enumerate() {
        points[idx] = iso * frame.local_point(sign_l * half_l, sign_w * half_w, -half_h);
        points[idx + 4] = iso * frame.local_point(sign_l * half_l, sign_w * half_w, half_h);
    }
    CornerPoints(points)
}

/// 逐个计算，输出顺序与输入一致
pub fn corners_batch(boxes: &[CenterSizeYaw]) -> Vec<CornerPoints> {
    boxes.iter().map(|b| b.to_corner_points()).collect()
}

impl CenterSizeYaw {
    pub fn to_corner_points(&self) -> CornerPoints {
        corners(&self.center, &self.size, self.yaw, self.frame)
    }

    /// 把 center 从底面中心（KITTI 的标注原点）挪到几何中心
    pub fn lift_bottom_center(mut self) -> Self {
        let up = match self.frame {
            CoordFrame::Lidar => na::Vector3::z() * (self.size.height / 2f32),
            // 相机坐标系 y 轴向下
            CoordFrame::Camera => -na::Vector3::y() * (self.size.height / 2f32),
        };
        self.center += up;
        self
    }
}

impl CornerPoints {
    pub fn iter(&self) -> impl Iterator<Item = &na::Point3<f32>> {
        self.0.iter()
    }

    /// 8 个点在各轴上的 (min, max)，即轴对齐包络
    pub fn axis_aligned_extent(&self) -> (na::Point3<f32>, na::Point3<f32>) {
        let mut lower = na::Point3::origin();
        let mut upper = na::Point3::origin();
        for axis in 0..3 {
            match self.iter().map(|p| OrderedFloat(p[axis])).minmax() {
                MinMaxResult::MinMax(min, max) => {
                    lower[axis] = min.0;
                    upper[axis] = max.0;
                }
                // 8 个点，不会为空
                MinMaxResult::OneElement(_) | MinMaxResult::NoElements => {}
            }
        }
        (lower, upper)
    }

    /// 从 (0) 出发的三条棱：沿宽 (0)->(1)，沿长 (0)->(3)，沿高 (0)->(4)
    pub fn edges(&self) -> [na::Vector3<f32>; 3] {
        let c = &self.0;
        [c[1] - c[0], c[3] - c[0], c[4] - c[0]]
    }

    /// 任意一条棱长度为 0 即为零体积
    pub fn is_degenerate(&self) -> bool {
        self.edges().iter().any(|e| e.norm_squared() == 0f32)
    }

    pub fn center(&self) -> na::Point3<f32> {
        let sum = self.iter().fold(na::Vector3::zeros(), |acc, p| acc + p.coords);
        na::Point3::from(sum / 8f32)
    }
}

//! # 点是否在 3d bbox 内
//!
//! 两种判定：
//! 1. `AxisAligned`：取 8 个边角点在各轴上的 min/max 做区间判断。
//!    对 yaw 不与坐标轴对齐的框，判断的是框的轴对齐包络，点数会偏多，
//!    只为与旧的转换结果保持一致而保留。
//! 2. `Oriented`：把点变换到框自身的坐标系后再做区间判断，即真正的有向框判定，默认使用。
//!
//! 两种判定都包含边界，零体积的框不包含任何点。

use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::data::BBox3D::CornerPoints;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContainmentMode {
    AxisAligned,
    Oriented,
}
impl Default for ContainmentMode {
    fn default() -> Self {
        ContainmentMode::Oriented
    }
}

/// 针对一个框预先算好的判定条件，对大量点重复使用
#[derive(Clone, Copy, Debug)]
pub enum BoxContainment {
    /// 零体积
    Empty,
    AxisAligned {
        lower: na::Point3<f32>,
        upper: na::Point3<f32>,
    },
    Oriented {
        origin: na::Point3<f32>,
        edges: [na::Vector3<f32>; 3],
        lengths_sq: [f32; 3],
    },
}
impl BoxContainment {
    pub fn new(corners: &CornerPoints, mode: ContainmentMode) -> Self {
        if corners.is_degenerate() {
            return BoxContainment::Empty;
        }
        match mode {
            ContainmentMode::AxisAligned => {
                let (lower, upper) = corners.axis_aligned_extent();
                BoxContainment::AxisAligned { lower, upper }
            }
            ContainmentMode::Oriented => {
                let edges = corners.edges();
                BoxContainment::Oriented {
                    origin: corners.0[0],
                    edges,
                    lengths_sq: [edges[0].norm_squared(), edges[1].norm_squared(), edges[2].norm_squared()],
                }
            }
        }
    }

    pub fn contains(&self, point: &na::Point3<f32>) -> bool {
        match self {
            BoxContainment::Empty => false,
            BoxContainment::AxisAligned { lower, upper } => (0..3).all(|axis| {
                lower[axis] <= point[axis] && point[axis] <= upper[axis]
            }),
            BoxContainment::Oriented { origin, edges, lengths_sq } => {
                let offset = point - origin;
                edges.iter().zip(lengths_sq.iter()).all(|(edge, len_sq)| {
                    let t = offset.dot(edge);
                    0f32 <= t && t <= *len_sq
                })
            }
        }
    }
}

/// 与输入点一一对应的掩码
pub fn points_in_box_mask(points: &[na::Point3<f32>], corners: &CornerPoints, mode: ContainmentMode) -> Vec<bool> {
    let containment = BoxContainment::new(corners, mode);
    points.iter().map(|p| containment.contains(p)).collect()
}

pub fn count_points_in_box(points: &[na::Point3<f32>], corners: &CornerPoints, mode: ContainmentMode) -> usize {
    let containment = BoxContainment::new(corners, mode);
    points.iter().filter(|p| containment.contains(p)).count()
}

/// 每个框内的点数，框之间相互独立，输出顺序与 boxes 一致
pub fn points_in_boxes(points: &[na::Point3<f32>], boxes: &[CornerPoints], mode: ContainmentMode) -> Vec<usize> {
    boxes
        .par_iter()
        .map(|corners| count_points_in_box(points, corners, mode))
        .collect()
}

/// 每个框一条掩码
pub fn points_in_boxes_mask(
    points: &[na::Point3<f32>],
    boxes: &[CornerPoints],
    mode: ContainmentMode,
) -> Vec<Vec<bool>> {
    boxes
        .par_iter()
        .map(|corners| points_in_box_mask(points, corners, mode))
        .collect()
}

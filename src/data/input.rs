//! # 数据输入接口

use std::convert::TryFrom;
use std::path::PathBuf;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use super::BBox3D::Size3;
use super::{BBox2D, Occlusion};

/// 标注文件中的一行，即一个被标注的物体
///
/// 文件中的尺寸按 h, w, l 排列，解析时即转成具名字段，之后不再按下标取值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelObject {
    /// 原始类别名，映射到数据集类别由 `DatasetSchema` 负责
    pub name: String,
    pub track_id: String,
    pub truncated: f32,
    /// 原始遮挡值，DontCare 为 -1
    pub occluded: i32,
    pub alpha: f32,
    pub bbox: BBox2D,
    pub size: Size3,
    /// 标注坐标系下的位置，含义取决于 `LabelConvention`
    pub location: na::Point3<f32>,
    pub rotation_y: f32,
    pub score: Option<f32>,
}
impl LabelObject {
    pub fn occlusion(&self) -> Option<Occlusion> {
        u8::try_from(self.occluded)
            .ok()
            .and_then(|x| Occlusion::try_from(x).ok())
    }
}

/// 一帧中一个相机对应的文件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSource {
    pub name: String,
    pub image_path: PathBuf,
    pub label_path: Option<PathBuf>,
}

/// 一帧的输入：点云、标定以及各个相机的图片和标注
///
/// 所有路径都由调用方给出，这里不关心数据集目录的组织方式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameSource {
    pub token: String,
    pub lidar_path: PathBuf,
    pub calib_path: PathBuf,
    /// 顺序与标定文件中的相机顺序一致
    pub cameras: Vec<CameraSource>,
}

//! # 数据输出接口
//!
//! 输出记录只负责被序列化，交给后续训练框架使用

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::BBox3D::CenterSizeYaw;
use crate::error::{ConvertError, Result};
use crate::projection::CalibrationPair;

/// 一帧中一个相机的信息
#[derive(Clone, Debug, Serialize)]
pub struct CameraInfo {
    pub name: String,
    pub data_path: PathBuf,
    /// 从激光雷达坐标系到该相机像素坐标的标定
    pub calib: CalibrationPair,
}

/// 每帧输出的 info 记录
///
/// gt_boxes、gt_names、num_lidar_pts、valid_flag、cam_mask 按下标一一对应
#[derive(Clone, Debug, Serialize)]
pub struct FrameInfo {
    pub token: String,
    pub lidar_path: PathBuf,
    pub cams: Vec<CameraInfo>,
    /// 激光雷达坐标系下的 gt bbox，忽略类别或尺寸非法的物体为 None
    pub gt_boxes: Vec<Option<CenterSizeYaw>>,
    pub gt_names: Vec<String>,
    /// 框内点数，没有 bbox 的物体记为 -1
    pub num_lidar_pts: Vec<i32>,
    /// 框内至少有一个点
    pub valid_flag: Vec<bool>,
    /// 物体来自哪个相机的标注文件
    pub cam_mask: Vec<usize>,
}

/// COCO 格式接口模块
#[allow(non_snake_case)]
pub mod Coco {
    /// 一条 2d 标注
    pub type Annotation = super::inner::_Annotation;
    /// 单目 3d 附加字段
    pub type Mono3D = super::inner::_Mono3D;
    pub type Image = super::inner::_Image;
    pub type Category = super::inner::_Category;
    /// 完整的 COCO json
    pub type Dataset = super::inner::_Dataset;
}

mod inner {
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct _Mono3D {
        /// 相机坐标系下的 [x, y, z, l, h, w, rotation_y]
        pub bbox_cam3d: [f32; 7],
        /// 中心点投影 [u, v, depth]，depth 一定大于 0
        pub center2d: [f32; 3],
        /// 没有属性时为 None
        pub attribute_name: Option<String>,
        /// 没有属性时为 -1
        pub attribute_id: i64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct _Annotation {
        pub file_name: String,
        pub image_id: String,
        pub area: f32,
        pub category_name: String,
        pub category_id: usize,
        /// [左上 x, 左上 y, 宽, 高]
        pub bbox: [f32; 4],
        pub iscrowd: u8,
        pub segmentation: Vec<Vec<f32>>,
        /// 整个数据集中的标注序号，导出时才确定
        pub id: usize,
        pub num_lidar_pts: i32,
        #[serde(flatten)]
        pub mono3d: Option<_Mono3D>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct _Image {
        pub file_name: String,
        pub id: String,
        pub token: String,
        pub width: u32,
        pub height: u32,
        pub cam_intrinsic: [[f32; 3]; 3],
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct _Category {
        pub id: usize,
        pub name: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize)]
    pub struct _Dataset {
        pub annotations: Vec<_Annotation>,
        pub images: Vec<_Image>,
        pub categories: Vec<_Category>,
    }
}

impl Coco::Dataset {
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

/// 将任意可序列化的输出写成 json 文件
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| ConvertError::io(path, e))?;
    serde_json::to_writer(std::io::BufWriter::new(file), value)?;
    Ok(())
}

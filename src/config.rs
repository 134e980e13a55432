//! # 数据集配置
//!
//! 类别、属性、标注约定、标定排布和 2d 归约方式都显式地放在 `DatasetSchema` 中传给转换器，
//! 同一套几何代码服务于不同的数据集。

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::data::{
    input::LabelObject,
    BBox3D::{CenterSizeYaw, CoordFrame},
    Occlusion,
};
use crate::error::{ConvertError, Result};
use crate::geometry::HEADING_OFFSET;
use crate::io::{CalibLayout, RectCalib};
use crate::membership::ContainmentMode;
use crate::projection::{ImageSize, ReductionPolicy};

/// 标注中 location / rotation_y 的含义
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelConvention {
    /// location 为激光雷达坐标系下的几何中心，yaw = rotation_y + HEADING_OFFSET
    LidarHeading,
    /// location 为相机坐标系下的底面中心，按 (x, y, z)_lidar = (z, -x, -y)_cam 换轴，
    /// yaw = -rotation_y + HEADING_OFFSET
    CameraAxisSwap,
    /// location 为相机矫正坐标系下的底面中心，经 R0_rect 与 Tr_velo_to_cam 的逆变换到激光雷达坐标系，
    /// yaw = -rotation_y - HEADING_OFFSET
    CameraRect,
}

impl LabelConvention {
    /// 是否需要 R0_rect 与 Tr_velo_to_cam
    pub fn needs_rect(&self) -> bool {
        matches!(self, LabelConvention::CameraRect)
    }

    /// 激光雷达坐标系下的 bbox，用于统计框内点数
    ///
    /// 尺寸非法或缺少所需标定时返回 None
    pub fn to_lidar(&self, label: &LabelObject, rect: Option<&RectCalib>) -> Option<CenterSizeYaw> {
        let loc = &label.location;
        match self {
            LabelConvention::LidarHeading => CenterSizeYaw::new(
                *loc,
                label.size,
                label.rotation_y + HEADING_OFFSET,
                CoordFrame::Lidar,
            ),
            LabelConvention::CameraAxisSwap => CenterSizeYaw::new(
                na::Point3::new(loc.z, -loc.x, -loc.y),
                label.size,
                -label.rotation_y + HEADING_OFFSET,
                CoordFrame::Lidar,
            )
            .map(CenterSizeYaw::lift_bottom_center),
            LabelConvention::CameraRect => CenterSizeYaw::new(
                rect?.rect_to_lidar(loc)?,
                label.size,
                -label.rotation_y - HEADING_OFFSET,
                CoordFrame::Lidar,
            )
            .map(CenterSizeYaw::lift_bottom_center),
        }
    }

    /// 写入 info 记录的 bbox：激光雷达标注记原始的 rotation_y，偏移只在生成边角点时施加；
    /// 相机标注记换算后的激光雷达 yaw
    pub fn to_record(&self, lidar_box: CenterSizeYaw) -> CenterSizeYaw {
        match self {
            LabelConvention::LidarHeading => CenterSizeYaw {
                yaw: lidar_box.yaw - HEADING_OFFSET,
                ..lidar_box
            },
            LabelConvention::CameraAxisSwap | LabelConvention::CameraRect => lidar_box,
        }
    }

    /// 用于投影到图像的 bbox：激光雷达标注沿用 `to_lidar`，相机标注留在相机坐标系
    pub fn to_projection_frame(&self, label: &LabelObject) -> Option<CenterSizeYaw> {
        match self {
            LabelConvention::LidarHeading => self.to_lidar(label, None),
            LabelConvention::CameraAxisSwap | LabelConvention::CameraRect => CenterSizeYaw::new(
                label.location,
                label.size,
                label.rotation_y,
                CoordFrame::Camera,
            )
            .map(CenterSizeYaw::lift_bottom_center),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub name: String,
    /// 下标即类别 id
    pub categories: Vec<String>,
    /// 标注中的原始名字 -> 类别名，不在表中的名字原样使用
    #[serde(default)]
    pub name_map: BTreeMap<String, String>,
    /// 下标即属性 id
    #[serde(default)]
    pub attributes: Vec<String>,
    /// 类别 -> 默认属性
    #[serde(default)]
    pub default_attributes: BTreeMap<String, String>,
    /// 不参与统计的类别，如 DontCare
    #[serde(default)]
    pub ignore_name: Option<String>,
    /// 每个点的 f32 个数
    pub num_features: usize,
    pub label_convention: LabelConvention,
    pub calib_layout: CalibLayout,
    pub reduction: ReductionPolicy,
    pub canvas: ImageSize,
    /// 参与 2d 导出的遮挡状态，None 表示不过滤
    #[serde(default)]
    pub occluded: Option<Vec<Occlusion>>,
    /// 统计点数前先去掉投影不在参考相机图像内的点
    #[serde(default)]
    pub remove_outside: bool,
    #[serde(default)]
    pub reference_camera: usize,
    /// 多个相机的标注中 track_id 相同的物体只保留第一个
    #[serde(default)]
    pub dedup_track_ids: bool,
    #[serde(default)]
    pub containment: ContainmentMode,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_map(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn kitti_calib_layout() -> CalibLayout {
    CalibLayout::ProjectionTags {
        cameras: strings(&["P0", "P1", "P2", "P3", "P4"]),
        rect_tag: "R0_rect".to_string(),
        velo_to_cam_tag: "Tr_velo_to_cam".to_string(),
    }
}

impl DatasetSchema {
    /// KITTI 格式的 spa_mvx：相机坐标系标注，凸包与画布求交
    pub fn spa_mvx() -> Self {
        Self {
            name: "spa_mvx".to_string(),
            categories: strings(&["Pedestrian", "Cyclist", "Car", "Motorcyclist"]),
            name_map: BTreeMap::new(),
            attributes: Vec::new(),
            default_attributes: BTreeMap::new(),
            ignore_name: Some("DontCare".to_string()),
            num_features: 4,
            label_convention: LabelConvention::CameraAxisSwap,
            calib_layout: kitti_calib_layout(),
            reduction: ReductionPolicy::HullCanvasIntersection,
            canvas: ImageSize::new(1600, 900),
            occluded: Some(vec![
                Occlusion::FullyVisible,
                Occlusion::PartlyOccluded,
                Occlusion::LargelyOccluded,
                Occlusion::Unknown,
            ]),
            remove_outside: true,
            reference_camera: 0,
            dedup_track_ids: false,
            containment: ContainmentMode::Oriented,
        }
    }

    /// KITTI 格式的 Waymo：6 维点，不去除图像外的点
    pub fn waymo() -> Self {
        Self {
            name: "waymo".to_string(),
            categories: strings(&["Car", "Pedestrian", "Cyclist"]),
            label_convention: LabelConvention::CameraRect,
            num_features: 6,
            canvas: ImageSize::new(1920, 1280),
            remove_outside: false,
            ..Self::spa_mvx()
        }
    }

    /// nuScenes 风格的 spa_nus：激光雷达坐标系标注，5 个相机，坐标截断到画布
    pub fn spa_nus() -> Self {
        Self {
            name: "spa_nus".to_string(),
            categories: strings(&["car", "bicycle", "motorcycle", "pedestrian"]),
            name_map: string_map(&[
                ("car", "car"),
                ("motocycle", "motorcycle"),
                ("pedestrian", "pedestrian"),
                ("cyclist", "bicycle"),
            ]),
            attributes: strings(&[
                "cycle.with_rider",
                "cycle.without_rider",
                "pedestrian.moving",
                "pedestrian.standing",
                "pedestrian.sitting_lying_down",
                "vehicle.moving",
                "vehicle.parked",
                "vehicle.stopped",
                "None",
                "vehicle.bicycle",
            ]),
            default_attributes: string_map(&[
                ("car", "vehicle.parked"),
                ("pedestrian", "pedestrian.moving"),
                ("motorcycle", "cycle.without_rider"),
                ("bicycle", "vehicle.moving"),
            ]),
            ignore_name: None,
            num_features: 4,
            label_convention: LabelConvention::LidarHeading,
            calib_layout: CalibLayout::IntrinsicExtrinsicLines { num_cameras: 5 },
            reduction: ReductionPolicy::CanvasClip,
            canvas: ImageSize::new(1920, 1200),
            occluded: None,
            remove_outside: false,
            reference_camera: 0,
            dedup_track_ids: true,
            containment: ContainmentMode::AxisAligned,
        }
    }

    /// 原始名字经 name_map 映射后的名字
    pub fn map_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.name_map.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn is_ignored(&self, raw: &str) -> bool {
        self.ignore_name.as_deref() == Some(raw)
    }

    pub fn category_id(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == name)
    }

    /// 类别的默认属性名及其 id
    pub fn default_attribute(&self, category: &str) -> Option<(&str, usize)> {
        let attribute = self.default_attributes.get(category)?;
        let id = self.attributes.iter().position(|a| a == attribute)?;
        Some((attribute.as_str(), id))
    }

    pub fn accepts_occlusion(&self, label: &LabelObject) -> bool {
        match &self.occluded {
            None => true,
            Some(accepted) => label.occlusion().map_or(false, |o| accepted.contains(&o)),
        }
    }
}

/// 内置的数据集配置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum SchemaKind {
    #[strum(serialize = "spa_mvx")]
    SpaMvx,
    #[strum(serialize = "spa_nus")]
    SpaNus,
    #[strum(serialize = "waymo")]
    Waymo,
}
impl SchemaKind {
    pub fn schema(&self) -> DatasetSchema {
        match self {
            SchemaKind::SpaMvx => DatasetSchema::spa_mvx(),
            SchemaKind::SpaNus => DatasetSchema::spa_nus(),
            SchemaKind::Waymo => DatasetSchema::waymo(),
        }
    }
}

fn default_num_workers() -> usize {
    8
}

fn default_mono3d() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub schema: DatasetSchema,
    /// 并行处理帧的线程数
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// 导出 2d 标注时附带单目 3d 字段
    #[serde(default = "default_mono3d")]
    pub mono3d: bool,
}

impl ConverterConfig {
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            num_workers: default_num_workers(),
            mono3d: default_mono3d(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

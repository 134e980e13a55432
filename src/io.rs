//! # 标定与标注文件的读取
//!
//! 标定文件：每行一个标签，后跟 9 个（3x3）或 12 个（3x4）以空格分隔的数。
//! 标注文件：每行一个物体，字段为
//! `name track_id truncated occluded alpha bbox(4) h w l x y z rotation_y [score]`。
//! 任意一行格式不对，整个文件即视为无法解析。

use std::path::{Path, PathBuf};

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::data::{input::LabelObject, BBox2D, BBox3D::Size3};
use crate::error::{ConvertError, Result};
use crate::projection::CalibrationPair;

#[derive(Clone, Debug, PartialEq)]
pub struct CalibEntry {
    /// 去掉结尾冒号的标签，如 `P2`、`R0_rect`
    pub tag: String,
    /// 按行优先排列的 9 或 12 个数
    pub values: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibFile {
    path: PathBuf,
    entries: Vec<CalibEntry>,
}

impl CalibFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        Self::parse(path, &content)
    }

    /// path 只用于报错
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (line_idx, line) in content.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let tag = match fields.next() {
                Some(tag) => tag.trim_end_matches(':').to_string(),
                None => continue,
            };
            let malformed = |reason: String| ConvertError::MalformedCalib {
                path: path.to_path_buf(),
                line: line_idx + 1,
                reason,
            };
            let values = fields
                .map(|f| f.parse::<f32>().map_err(|e| malformed(format!("`{f}`: {e}"))))
                .collect::<Result<Vec<_>>>()?;
            if values.len() != 9 && values.len() != 12 {
                return Err(malformed(format!(
                    "`{tag}` holds {} values, expected 9 or 12",
                    values.len()
                )));
            }
            entries.push(CalibEntry { tag, values });
        }
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn missing(&self, tag: impl Into<String>) -> ConvertError {
        ConvertError::MissingCalib {
            path: self.path.clone(),
            tag: tag.into(),
        }
    }

    pub fn entry(&self, tag: &str) -> Result<&CalibEntry> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .ok_or_else(|| self.missing(tag))
    }

    /// 按行号（从 0 开始，不计空行）取条目
    pub fn line(&self, idx: usize) -> Result<&CalibEntry> {
        self.entries
            .get(idx)
            .ok_or_else(|| self.missing(format!("line {idx}")))
    }

    pub fn matrix3(&self, tag: &str) -> Result<na::Matrix3<f32>> {
        self.entry(tag)?.matrix3().ok_or_else(|| self.missing(format!("{tag} (3x3)")))
    }

    pub fn matrix3x4(&self, tag: &str) -> Result<na::Matrix3x4<f32>> {
        self.entry(tag)?.matrix3x4().ok_or_else(|| self.missing(format!("{tag} (3x4)")))
    }
}

impl CalibEntry {
    pub fn matrix3(&self) -> Option<na::Matrix3<f32>> {
        if self.values.len() != 9 {
            return None;
        }
        Some(na::Matrix3::from_row_slice(&self.values))
    }

    pub fn matrix3x4(&self) -> Option<na::Matrix3x4<f32>> {
        if self.values.len() != 12 {
            return None;
        }
        Some(na::Matrix3x4::from_row_slice(&self.values))
    }
}

/// 激光雷达到相机矫正坐标系的变换，用于把相机坐标系下的标注转到激光雷达坐标系
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectCalib {
    pub r0_rect: na::Matrix3<f32>,
    pub velo_to_cam: na::Matrix3x4<f32>,
}
impl RectCalib {
    /// 相机矫正坐标系 -> 激光雷达坐标系
    pub fn rect_to_lidar(&self, point: &na::Point3<f32>) -> Option<na::Point3<f32>> {
        let velo = CalibrationPair::from_extrinsic_3x4(na::Matrix3::identity(), &self.velo_to_cam);
        let unrect = self.r0_rect.try_inverse()? * point.coords;
        velo.from_camera(&na::Point3::from(unrect))
    }
}

/// 标定文件的排布方式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibLayout {
    /// 前 num_cameras 行为各相机的 3x3 内参，后 num_cameras 行为 3x4 外参 [R|t]，
    /// 外参直接作用于激光雷达坐标系
    IntrinsicExtrinsicLines { num_cameras: usize },
    /// KITTI 风格：每个相机一个 3x4 投影矩阵，另有 R0_rect 与 Tr_velo_to_cam
    ProjectionTags {
        cameras: Vec<String>,
        rect_tag: String,
        velo_to_cam_tag: String,
    },
}

impl CalibLayout {
    pub fn num_cameras(&self) -> usize {
        match self {
            CalibLayout::IntrinsicExtrinsicLines { num_cameras } => *num_cameras,
            CalibLayout::ProjectionTags { cameras, .. } => cameras.len(),
        }
    }

    /// 激光雷达坐标系 -> 各相机像素坐标
    pub fn lidar_calibs(&self, calib: &CalibFile) -> Result<Vec<CalibrationPair>> {
        match self {
            CalibLayout::IntrinsicExtrinsicLines { num_cameras } => (0..*num_cameras)
                .map(|cam| {
                    let intrinsic = calib.line(cam)?;
                    let extrinsic = calib.line(cam + num_cameras)?;
                    let k = intrinsic
                        .matrix3()
                        .ok_or_else(|| calib.missing(format!("{} (3x3)", intrinsic.tag)))?;
                    let rt = extrinsic
                        .matrix3x4()
                        .ok_or_else(|| calib.missing(format!("{} (3x4)", extrinsic.tag)))?;
                    Ok(CalibrationPair::from_extrinsic_3x4(k, &rt))
                })
                .collect(),
            CalibLayout::ProjectionTags { cameras, .. } => {
                let rect = self
                    .rect_calib(calib)?
                    .ok_or_else(|| calib.missing("R0_rect"))?;
                cameras
                    .iter()
                    .map(|tag| CalibrationPair::from_kitti(&calib.matrix3x4(tag)?, &rect.r0_rect, &rect.velo_to_cam))
                    .collect()
            }
        }
    }

    /// 相机矫正坐标系 -> 各相机像素坐标，只有 KITTI 风格的标定才有
    pub fn rect_calibs(&self, calib: &CalibFile) -> Result<Option<Vec<CalibrationPair>>> {
        match self {
            CalibLayout::IntrinsicExtrinsicLines { .. } => Ok(None),
            CalibLayout::ProjectionTags { cameras, .. } => cameras
                .iter()
                .map(|tag| CalibrationPair::from_projection_3x4(&calib.matrix3x4(tag)?))
                .collect::<Result<Vec<_>>>()
                .map(Some),
        }
    }

    pub fn rect_calib(&self, calib: &CalibFile) -> Result<Option<RectCalib>> {
        match self {
            CalibLayout::IntrinsicExtrinsicLines { .. } => Ok(None),
            CalibLayout::ProjectionTags {
                rect_tag,
                velo_to_cam_tag,
                ..
            } => Ok(Some(RectCalib {
                r0_rect: calib.matrix3(rect_tag)?,
                velo_to_cam: calib.matrix3x4(velo_to_cam_tag)?,
            })),
        }
    }
}

/// 不带 score 的字段数
const LABEL_FIELDS: usize = 16;

pub fn parse_label_line(path: &Path, line_no: usize, line: &str) -> Result<LabelObject> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let malformed = |reason: String| ConvertError::MalformedLabel {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };
    if fields.len() != LABEL_FIELDS && fields.len() != LABEL_FIELDS + 1 {
        return Err(malformed(format!(
            "{} fields, expected {} or {}",
            fields.len(),
            LABEL_FIELDS,
            LABEL_FIELDS + 1
        )));
    }
    let float = |idx: usize| {
        fields[idx]
            .parse::<f32>()
            .map_err(|e| malformed(format!("field {idx} `{}`: {e}", fields[idx])))
    };
    let occluded = fields[3]
        .parse::<i32>()
        .map_err(|e| malformed(format!("field 3 `{}`: {e}", fields[3])))?;

    Ok(LabelObject {
        name: fields[0].to_string(),
        track_id: fields[1].to_string(),
        truncated: float(2)?,
        occluded,
        alpha: float(4)?,
        bbox: BBox2D {
            x1: float(5)?,
            y1: float(6)?,
            x2: float(7)?,
            y2: float(8)?,
        },
        // 文件中为 h, w, l
        size: Size3 {
            height: float(9)?,
            width: float(10)?,
            length: float(11)?,
        },
        location: na::Point3::new(float(12)?, float(13)?, float(14)?),
        rotation_y: float(15)?,
        score: if fields.len() > LABEL_FIELDS {
            Some(float(LABEL_FIELDS)?)
        } else {
            None
        },
    })
}

pub fn parse_label_file(path: &Path, content: &str) -> Result<Vec<LabelObject>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_label_line(path, idx + 1, line))
        .collect()
}

pub fn read_label_file(path: &Path) -> Result<Vec<LabelObject>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
    parse_label_file(path, &content)
}

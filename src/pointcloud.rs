use std::io::Write;
use std::path::Path;

use nalgebra as na;

use crate::error::{ConvertError, Result};
use crate::projection::{CalibrationPair, ImageSize};

/// 按行排列的点云，每个点 num_features 个 f32，前 3 个为 x, y, z
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud {
    num_features: usize,
    data: Vec<f32>,
}

impl PointCloud {
    /// data 的长度必须是 num_features 的整数倍，且 num_features 不小于 3
    pub fn new(data: Vec<f32>, num_features: usize) -> Option<Self> {
        if num_features < 3 || data.len() % num_features != 0 {
            return None;
        }
        Some(Self { num_features, data })
    }

    pub fn from_points(points: &[na::Point3<f32>]) -> Self {
        Self {
            num_features: 3,
            data: points.iter().flat_map(|p| [p.x, p.y, p.z]).collect(),
        }
    }

    /// 读取小端 f32 的 .bin 点云文件
    pub fn from_bin_file(path: &Path, num_features: usize) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        let layout_error = |len| ConvertError::PointCloudLayout {
            path: path.to_path_buf(),
            len,
            num_features,
        };
        if bytes.len() % 4 != 0 {
            return Err(layout_error(bytes.len() / 4));
        }
        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let len = data.len();
        Self::new(data, num_features).ok_or_else(|| layout_error(len))
    }

    pub fn to_bin_file(&self, path: &Path) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|e| ConvertError::io(path, e))?);
        for v in &self.data {
            file.write_all(&v.to_le_bytes()).map_err(|e| ConvertError::io(path, e))?;
        }
        file.flush().map_err(|e| ConvertError::io(path, e))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.num_features
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// 第 idx 个点的全部特征
    pub fn features(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.num_features..(idx + 1) * self.num_features]
    }

    pub fn point(&self, idx: usize) -> na::Point3<f32> {
        let f = self.features(idx);
        na::Point3::new(f[0], f[1], f[2])
    }

    pub fn xyz(&self) -> Vec<na::Point3<f32>> {
        self.data
            .chunks_exact(self.num_features)
            .map(|f| na::Point3::new(f[0], f[1], f[2]))
            .collect()
    }

    /// 只保留满足条件的点，其余特征一并保留
    pub fn retain(&self, mut keep: impl FnMut(&na::Point3<f32>) -> bool) -> Self {
        let data = self
            .data
            .chunks_exact(self.num_features)
            .filter(|f| keep(&na::Point3::new(f[0], f[1], f[2])))
            .flatten()
            .copied()
            .collect();
        Self {
            num_features: self.num_features,
            data,
        }
    }

    /// x 取反，用于生成车后方向的点云
    pub fn flip_x(&self) -> Self {
        let mut data = self.data.clone();
        for f in data.chunks_exact_mut(self.num_features) {
            f[0] = -f[0];
        }
        Self {
            num_features: self.num_features,
            data,
        }
    }
}

/// 去掉投影不落在图像内或位于相机后方的点
pub fn remove_outside_points(cloud: &PointCloud, calib: &CalibrationPair, canvas: ImageSize) -> PointCloud {
    cloud.retain(|p| {
        let projected = calib.project_point(p);
        projected.in_front() && canvas.contains(projected.u, projected.v)
    })
}

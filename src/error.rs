//! # 错误类型
//!
//! 文件来源的错误都带上文件路径，方便定位是哪一帧出了问题。
//! 几何上的退化（零体积、完全在相机后方、投影与画布不相交）不是错误，用 `None` 表示。

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// 文件不存在或读取失败
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 标注行字段数不对或字段无法解析
    #[error("malformed label row in {path:?} at line {line}: {reason}")]
    MalformedLabel {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// 标定行字段数不对或字段无法解析
    #[error("malformed calibration row in {path:?} at line {line}: {reason}")]
    MalformedCalib {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// 标定文件中缺少所需的条目
    #[error("calibration entry `{tag}` missing in {path:?}")]
    MissingCalib { path: PathBuf, tag: String },

    /// 点云长度不是特征数的整数倍
    #[error("point cloud {path:?} holds {len} floats, not a multiple of {num_features}")]
    PointCloudLayout {
        path: PathBuf,
        len: usize,
        num_features: usize,
    },

    /// 内参（或 R0_rect）不可逆
    #[error("calibration matrix is singular")]
    SingularCalib,

    #[error("camera index {0} not present in calibration")]
    UnknownCamera(usize),

    #[error("json (de)serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }
}

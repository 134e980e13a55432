use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

/// 标注中的遮挡状态，-1（DontCare）不在其中
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash,
    num_enum::TryFromPrimitive, StrumDisplay, EnumString, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Occlusion {
    #[strum(ascii_case_insensitive)]
    FullyVisible = 0,
    #[strum(ascii_case_insensitive)]
    PartlyOccluded = 1,
    #[strum(ascii_case_insensitive)]
    LargelyOccluded = 2,
    #[strum(ascii_case_insensitive)]
    Unknown = 3,
}

/// 像素坐标下的轴对齐 2d 框，(x1, y1) 为左上角，(x2, y2) 为右下角
#[derive(Clone, Copy, Debug, PartialEq, Display, Serialize, Deserialize)]
#[display(fmt = "x1: {}, y1: {}, x2: {}, y2: {}", x1, y1, x2, y2)]
pub struct BBox2D {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}
impl BBox2D {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// COCO 格式：[左上 x, 左上 y, 宽, 高]
    pub fn to_xywh(&self) -> [f32; 4] {
        [self.x1, self.y1, self.width(), self.height()]
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2f32, (self.y1 + self.y2) / 2f32)
    }
}


/*
  激光雷达坐标系 (CoordFrame::Lidar)，竖直轴为 z:

                 z
                 |   y
                 |  /
                 | /
                 |/______ x (车头方向)
                 O

  yaw = 0 时 8 个边角点的顺序:

                 (7)__________(4)
                 /|           /|
                / |          / |           ___
             (6)__|_______(5)  |            |
              |   |        |   |            h
              |  (3)_______|__(0)           |    /
              |  /    O'   |  /             |   w
              | /          | /             _|_ /
             (2)__________(1)

              |<-----l----->|

    (0)~(3) 在竖直轴的 -h/2 处，(4)~(7) 在 +h/2 处，且 i 与 i+4 只有高度分量不同。
    底面足迹按 (长, 宽) 方向的符号排列为 (+,+) (+,-) (-,-) (-,+)。

  相机坐标系 (CoordFrame::Camera)，KITTI 约定：x 向右，y 竖直向下，z 向前。
    长沿 x，宽沿 z，高沿 y，yaw 为绕 y 轴的 rotation_y，
    同样的模板下 (0)~(3) 在 y = -h/2 处。

    O' 为 bbox 的几何中心，center 是 O' 在对应坐标系下的坐标
*/

#[allow(non_snake_case)]
pub mod BBox3D {
    use nalgebra as na;

    use derive_more::Display;
    use serde::{Deserialize, Serialize};
    use strum_macros::{Display as StrumDisplay, EnumString};

    /// bbox 所在的坐标系，两者不能直接互换
    #[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
    #[strum(serialize_all = "snake_case")]
    #[serde(rename_all = "snake_case")]
    pub enum CoordFrame {
        Lidar,
        Camera,
    }
    impl CoordFrame {
        /// yaw 所绕的竖直轴
        pub fn vertical_axis(&self) -> na::Unit<na::Vector3<f32>> {
            match self {
                CoordFrame::Lidar => na::Vector3::z_axis(),
                CoordFrame::Camera => na::Vector3::y_axis(),
            }
        }

        /// 由 (长, 宽, 高) 方向上的分量组成该坐标系下的局部坐标
        pub fn local_point(&self, along_length: f32, along_width: f32, along_height: f32) -> na::Point3<f32> {
            match self {
                CoordFrame::Lidar => na::Point3::new(along_length, along_width, along_height),
                CoordFrame::Camera => na::Point3::new(along_length, along_height, along_width),
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Display, Serialize, Deserialize)]
    #[display(fmt = "l: {}, w: {}, h: {}", length, width, height)]
    pub struct Size3 {
        pub length: f32,
        pub width: f32,
        pub height: f32,
    }
    impl Size3 {
        pub fn new(length: f32, width: f32, height: f32) -> Self {
            Self { length, width, height }
        }

        pub fn volume(&self) -> f32 {
            self.length * self.width * self.height
        }

        pub fn is_valid(&self) -> bool {
            [self.length, self.width, self.height]
                .iter()
                .all(|v| v.is_finite() && *v >= 0f32)
        }
    }

    /// 以几何中心、尺寸和 yaw（弧度）表示的 3d bbox
    #[derive(Clone, Copy, Debug, PartialEq, Display, Serialize, Deserialize)]
    #[display(
        fmt = "x: {}, y: {}, z: {}, {}, yaw: {}, frame: {}",
        "center.x", "center.y", "center.z", size, yaw, frame
    )]
    pub struct CenterSizeYaw {
        pub center: na::Point3<f32>,
        pub size: Size3,
        pub yaw: f32,
        pub frame: CoordFrame,
    }
    impl CenterSizeYaw {
        /// 尺寸为负或不是有限数时返回 None
        pub fn new(center: na::Point3<f32>, size: Size3, yaw: f32, frame: CoordFrame) -> Option<Self> {
            if !size.is_valid() || !yaw.is_finite() || !center.coords.iter().all(|v| v.is_finite()) {
                return None;
            }
            Some(Self { center, size, yaw, frame })
        }

        /// 输出为 [x, y, z, l, w, h, yaw]
        pub fn to_array(&self) -> [f32; 7] {
            [
                self.center.x,
                self.center.y,
                self.center.z,
                self.size.length,
                self.size.width,
                self.size.height,
                self.yaw,
            ]
        }
    }

    /// 按固定模板排列的 8 个边角点，顺序见上方示意图
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct CornerPoints(pub [na::Point3<f32>; 8]);
}

pub mod input;

pub mod output;

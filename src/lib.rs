pub mod config;
pub mod data;
pub mod error;
pub mod geometry;
pub mod io;
pub mod membership;
pub mod pointcloud;
pub mod projection;

use std::collections::HashSet;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, warn};
use rayon::prelude::*;

use crate::config::{ConverterConfig, DatasetSchema};
use crate::data::{
    input::{FrameSource, LabelObject},
    output::{CameraInfo, Coco, FrameInfo},
    BBox3D::{CenterSizeYaw, CoordFrame},
};
use crate::error::{ConvertError, Result};
use crate::io::{CalibFile, RectCalib};
use crate::membership::points_in_boxes;
use crate::pointcloud::{remove_outside_points, PointCloud};
use crate::projection::{project_box, CalibrationPair};

/// 一帧读出的全部标定
struct FrameCalib {
    /// 激光雷达坐标系 -> 各相机像素
    lidar: Vec<CalibrationPair>,
    /// 相机矫正坐标系 -> 各相机像素，只有 KITTI 风格的标定才有
    rect_cams: Option<Vec<CalibrationPair>>,
    rect: Option<RectCalib>,
}
impl FrameCalib {
    /// 投影 bbox 时使用的标定，取决于 bbox 所在的坐标系
    fn projection(&self, cam_idx: usize, frame: CoordFrame) -> Result<&CalibrationPair> {
        let calibs = match (frame, &self.rect_cams) {
            (CoordFrame::Camera, Some(rect_cams)) => rect_cams,
            _ => &self.lidar,
        };
        calibs.get(cam_idx).ok_or(ConvertError::UnknownCamera(cam_idx))
    }
}

/// 标注物体及其来源相机的下标
type TaggedLabel = (usize, LabelObject);

/// 多个相机中 track_id 相同的物体只保留最先出现的那个
fn dedup_by_track_id(labels: Vec<TaggedLabel>) -> Vec<TaggedLabel> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|(_, label)| seen.insert(label.track_id.clone()))
        .collect()
}

/// 并行处理中失败的一帧
#[derive(Debug)]
pub struct FrameFailure {
    /// 在输入中的下标
    pub index: usize,
    pub token: String,
    pub error: ConvertError,
}

/// 并行处理的结果，records 按输入顺序排列，失败的帧单独统计
#[derive(Debug)]
pub struct ConversionReport<T> {
    pub records: Vec<(usize, T)>,
    pub failures: Vec<FrameFailure>,
}
impl<T> ConversionReport<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn num_succeeded(&self) -> usize {
        self.records.len()
    }

    pub fn num_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records.into_iter().map(|(_, r)| r).collect()
    }
}
impl<T> Default for ConversionReport<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 一帧导出的 COCO 图片与标注，标注 id 在汇总时才分配
#[derive(Clone, Debug, Default)]
pub struct FrameAnnotations {
    pub images: Vec<Coco::Image>,
    pub annotations: Vec<Coco::Annotation>,
}

/// 将每帧的原始数据转成 info 记录与 2d 标注
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.config.schema
    }

    fn read_calib(&self, frame: &FrameSource) -> Result<FrameCalib> {
        let layout = &self.schema().calib_layout;
        let calib = CalibFile::read(&frame.calib_path)?;
        let frame_calib = FrameCalib {
            lidar: layout.lidar_calibs(&calib)?,
            rect_cams: layout.rect_calibs(&calib)?,
            rect: layout.rect_calib(&calib)?,
        };
        if frame.cameras.len() > layout.num_cameras() {
            return Err(ConvertError::UnknownCamera(frame.cameras.len() - 1));
        }
        if self.schema().label_convention.needs_rect() && frame_calib.rect.is_none() {
            return Err(ConvertError::MissingCalib {
                path: frame.calib_path.clone(),
                tag: "R0_rect".to_string(),
            });
        }
        Ok(frame_calib)
    }

    /// 读点云，按配置去掉参考相机图像外的点
    fn read_points(&self, frame: &FrameSource, calib: &FrameCalib) -> Result<PointCloud> {
        let schema = self.schema();
        let cloud = PointCloud::from_bin_file(&frame.lidar_path, schema.num_features)?;
        if !schema.remove_outside {
            return Ok(cloud);
        }
        let reference = calib
            .lidar
            .get(schema.reference_camera)
            .ok_or(ConvertError::UnknownCamera(schema.reference_camera))?;
        Ok(remove_outside_points(&cloud, reference, schema.canvas))
    }

    /// 所有相机的标注，dedup 时按配置去掉重复的 track_id
    fn read_labels(&self, frame: &FrameSource, dedup: bool) -> Result<Vec<TaggedLabel>> {
        let mut labels = Vec::new();
        for (cam_idx, camera) in frame.cameras.iter().enumerate() {
            if let Some(label_path) = &camera.label_path {
                labels.extend(
                    io::read_label_file(label_path)?
                        .into_iter()
                        .map(|label| (cam_idx, label)),
                );
            }
        }
        if dedup && self.schema().dedup_track_ids {
            labels = dedup_by_track_id(labels);
        }
        Ok(labels)
    }

    /// 激光雷达坐标系下的 bbox，忽略类别与尺寸非法的物体为 None
    fn lidar_box(&self, label: &LabelObject, calib: &FrameCalib) -> Option<CenterSizeYaw> {
        let schema = self.schema();
        if schema.is_ignored(&label.name) {
            return None;
        }
        let lidar_box = schema.label_convention.to_lidar(label, calib.rect.as_ref());
        if lidar_box.is_none() {
            warn!("label `{}` ({}) has no valid 3d box", label.name, label.track_id);
        }
        lidar_box
    }

    /// 每个 bbox 内的点数，没有 bbox 的物体记为 -1
    fn count_points(&self, points: &PointCloud, boxes: &[Option<CenterSizeYaw>]) -> Vec<i32> {
        let (indices, corners): (Vec<_>, Vec<_>) = boxes
            .iter()
            .enumerate()
            .filter_map(|(idx, b)| b.map(|b| (idx, b.to_corner_points())))
            .unzip();
        let counts = points_in_boxes(&points.xyz(), &corners, self.schema().containment);

        let mut num_points = vec![-1i32; boxes.len()];
        for (idx, count) in indices.into_iter().zip(counts) {
            num_points[idx] = count as i32;
        }
        num_points
    }

    /// 生成一帧的 info 记录；标定、点云或标注文件读不出来时整帧失败
    pub fn convert_frame(&self, frame: &FrameSource) -> Result<FrameInfo> {
        let calib = self.read_calib(frame)?;
        let points = self.read_points(frame, &calib)?;
        let labels = self.read_labels(frame, true)?;

        let lidar_boxes: Vec<_> = labels.iter().map(|(_, l)| self.lidar_box(l, &calib)).collect();
        let num_lidar_pts = self.count_points(&points, &lidar_boxes);
        let convention = self.schema().label_convention;
        let gt_boxes = lidar_boxes
            .into_iter()
            .map(|b| b.map(|b| convention.to_record(b)))
            .collect();
        debug!(
            "frame {}: {} points, {} objects",
            frame.token,
            points.len(),
            labels.len()
        );

        Ok(FrameInfo {
            token: frame.token.clone(),
            lidar_path: frame.lidar_path.clone(),
            cams: frame
                .cameras
                .iter()
                .zip(calib.lidar.iter())
                .map(|(camera, c)| CameraInfo {
                    name: camera.name.clone(),
                    data_path: camera.image_path.clone(),
                    calib: *c,
                })
                .collect(),
            gt_boxes,
            gt_names: labels
                .iter()
                .map(|(_, l)| self.schema().map_name(&l.name).to_string())
                .collect(),
            valid_flag: num_lidar_pts.iter().map(|n| *n > 0).collect(),
            num_lidar_pts,
            cam_mask: labels.iter().map(|(cam_idx, _)| *cam_idx).collect(),
        })
    }

    /// 一个物体在其所属相机中的 2d 标注；投影不出框或中心在相机后方时返回 None
    fn annotation_2d(
        &self,
        label: &LabelObject,
        num_lidar_pts: i32,
        image_path: &Path,
        calib: &FrameCalib,
        cam_idx: usize,
    ) -> Result<Option<Coco::Annotation>> {
        let schema = self.schema();
        if schema.is_ignored(&label.name) || !schema.accepts_occlusion(label) {
            return Ok(None);
        }
        let category_name = schema.map_name(&label.name);
        let category_id = match schema.category_id(category_name) {
            Some(id) => id,
            None => return Ok(None),
        };
        let proj_box = match schema.label_convention.to_projection_frame(label) {
            Some(b) => b,
            None => return Ok(None),
        };
        let cam_calib = calib.projection(cam_idx, proj_box.frame)?;
        let bbox = match project_box(&proj_box.to_corner_points(), cam_calib, schema.reduction, schema.canvas) {
            Some(bbox) => bbox,
            None => {
                debug!("`{}` ({}) not visible in {:?}", label.name, label.track_id, image_path);
                return Ok(None);
            }
        };

        let mono3d = if self.config.mono3d {
            let center2d = cam_calib.project_point(&proj_box.center);
            if !center2d.in_front() {
                return Ok(None);
            }
            let (center_cam, yaw_cam) = match proj_box.frame {
                CoordFrame::Camera => (proj_box.center, proj_box.yaw),
                CoordFrame::Lidar => (
                    cam_calib.to_camera(&proj_box.center),
                    cam_calib.heading_to_camera(proj_box.yaw),
                ),
            };
            let (attribute_name, attribute_id) = match schema.default_attribute(category_name) {
                Some((name, id)) => (Some(name.to_string()), id as i64),
                None => (None, -1),
            };
            Some(Coco::Mono3D {
                bbox_cam3d: [
                    center_cam.x,
                    center_cam.y,
                    center_cam.z,
                    label.size.length,
                    label.size.height,
                    label.size.width,
                    yaw_cam,
                ],
                center2d: [center2d.u, center2d.v, center2d.depth],
                attribute_name,
                attribute_id,
            })
        } else {
            None
        };

        let file_name = image_path.to_string_lossy().into_owned();
        Ok(Some(Coco::Annotation {
            image_id: file_name.clone(),
            file_name,
            area: bbox.area(),
            category_name: category_name.to_string(),
            category_id,
            bbox: bbox.to_xywh(),
            iscrowd: 0,
            segmentation: Vec::new(),
            id: 0,
            num_lidar_pts,
            mono3d,
        }))
    }

    /// 一帧的 COCO 图片与 2d 标注，每个相机只投影它自己的标注文件中的物体，
    /// 同一物体出现在多个相机的标注中时在每个相机里各出一条
    pub fn annotations_2d(&self, frame: &FrameSource) -> Result<FrameAnnotations> {
        let calib = self.read_calib(frame)?;
        let points = self.read_points(frame, &calib)?;
        let labels = self.read_labels(frame, false)?;
        let gt_boxes: Vec<_> = labels.iter().map(|(_, l)| self.lidar_box(l, &calib)).collect();
        let num_lidar_pts = self.count_points(&points, &gt_boxes);

        let mut out = FrameAnnotations::default();
        for (cam_idx, camera) in frame.cameras.iter().enumerate() {
            let image_calib = calib.projection(cam_idx, CoordFrame::Lidar)?;
            let file_name = camera.image_path.to_string_lossy().into_owned();
            out.images.push(Coco::Image {
                id: file_name.clone(),
                file_name,
                token: frame.token.clone(),
                width: self.schema().canvas.width,
                height: self.schema().canvas.height,
                cam_intrinsic: image_calib.intrinsic_rows(),
            });

            for ((label_cam, label), n_pts) in labels.iter().zip(num_lidar_pts.iter()) {
                if *label_cam != cam_idx {
                    continue;
                }
                if let Some(ann) = self.annotation_2d(label, *n_pts, &camera.image_path, &calib, cam_idx)? {
                    out.annotations.push(ann);
                }
            }
        }
        Ok(out)
    }

    /// 点云按配置翻转并去掉参考相机图像外的点后写出，返回保留的点数
    pub fn reduce_point_cloud(&self, frame: &FrameSource, dst: &Path, back: bool) -> Result<usize> {
        let schema = self.schema();
        let calib = self.read_calib(frame)?;
        let reference = calib
            .lidar
            .get(schema.reference_camera)
            .ok_or(ConvertError::UnknownCamera(schema.reference_camera))?;
        let mut cloud = PointCloud::from_bin_file(&frame.lidar_path, schema.num_features)?;
        if back {
            cloud = cloud.flip_x();
        }
        let reduced = remove_outside_points(&cloud, reference, schema.canvas);
        reduced.to_bin_file(dst)?;
        Ok(reduced.len())
    }

    /// 在 num_workers 个线程上逐帧执行 job，结果按输入下标重新排序
    fn run_parallel<T, F>(&self, frames: &[FrameSource], job: F) -> ConversionReport<T>
    where
        T: Send,
        F: Fn(&FrameSource) -> Result<T> + Sync,
    {
        let bar = ProgressBar::new(frames.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta})")
        {
            bar.set_style(style.progress_chars("##>-"));
        }
        let run = || {
            frames
                .par_iter()
                .enumerate()
                .map(|(index, frame)| {
                    let result = job(frame);
                    bar.inc(1);
                    (index, result)
                })
                .collect::<Vec<_>>()
        };
        let mut tagged = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_workers)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!("cannot build a pool of {} workers ({e}), using the global pool", self.config.num_workers);
                run()
            }
        };
        bar.finish();
        tagged.par_sort_unstable_by_key(|(index, _)| *index);

        let mut report = ConversionReport::new();
        for (index, result) in tagged {
            match result {
                Ok(record) => report.records.push((index, record)),
                Err(e) => {
                    error!("frame {} ({}) failed: {e}", index, frames[index].token);
                    report.failures.push(FrameFailure {
                        index,
                        token: frames[index].token.clone(),
                        error: e,
                    });
                }
            }
        }
        report
    }

    pub fn convert_all(&self, frames: &[FrameSource]) -> ConversionReport<FrameInfo> {
        self.run_parallel(frames, |frame| self.convert_frame(frame))
    }

    /// 汇总所有帧的 2d 标注，标注 id 按输入顺序连续分配
    pub fn export_coco(&self, frames: &[FrameSource]) -> (Coco::Dataset, Vec<FrameFailure>) {
        let report = self.run_parallel(frames, |frame| self.annotations_2d(frame));
        let mut dataset = Coco::Dataset {
            categories: self
                .schema()
                .categories
                .iter()
                .enumerate()
                .map(|(id, name)| Coco::Category { id, name: name.clone() })
                .collect(),
            ..Default::default()
        };
        for (_, frame_anns) in report.records {
            dataset.images.extend(frame_anns.images);
            for mut ann in frame_anns.annotations {
                ann.id = dataset.annotations.len();
                dataset.annotations.push(ann);
            }
        }
        (dataset, report.failures)
    }
}

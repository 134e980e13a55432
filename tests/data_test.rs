use std::convert::TryFrom;
use std::path::Path;
use std::str::FromStr;

use approx::assert_relative_eq;
use nalgebra as na;

use spa_converter::{
    config::{ConverterConfig, DatasetSchema, SchemaKind},
    data::Occlusion,
    error::ConvertError,
    io::{parse_label_file, parse_label_line, CalibFile, CalibLayout},
    pointcloud::{remove_outside_points, PointCloud},
    projection::ImageSize,
};

use super::{cube_calib, write_bin, KITTI_CALIB, NUS_CALIB};

const CAR_ROW: &str = "Car 3 0.00 0 -1.57 100.0 120.0 200.0 220.0 1.5 1.6 3.9 1.0 1.7 10.0 0.1";

#[test]
fn label_row_fields() {
    let label = parse_label_line(Path::new("label.txt"), 1, CAR_ROW).unwrap();
    assert_eq!(label.name, "Car");
    assert_eq!(label.track_id, "3");
    assert_eq!(label.occlusion(), Some(Occlusion::FullyVisible));
    assert_relative_eq!(label.bbox.x2, 200f32);
    // 文件中为 h, w, l
    assert_relative_eq!(label.size.height, 1.5f32);
    assert_relative_eq!(label.size.width, 1.6f32);
    assert_relative_eq!(label.size.length, 3.9f32);
    assert_relative_eq!(label.location.coords, na::Vector3::new(1f32, 1.7f32, 10f32));
    assert_relative_eq!(label.rotation_y, 0.1f32);
    assert_eq!(label.score, None);

    let scored = parse_label_line(Path::new("label.txt"), 1, &format!("{CAR_ROW} 0.87")).unwrap();
    assert_eq!(scored.score, Some(0.87f32));
}

#[test]
fn dont_care_has_no_occlusion_state() {
    let row = "DontCare -1 -1 -1 -10 0 0 0 0 -1 -1 -1 -1000 -1000 -1000 -10";
    let label = parse_label_line(Path::new("label.txt"), 1, row).unwrap();
    assert_eq!(label.occluded, -1);
    assert_eq!(label.occlusion(), None);
    assert!(!label.size.is_valid());
}

#[test]
fn short_or_garbled_rows_fail() {
    let short = "Car 3 0.00 0 -1.57 100.0 120.0 200.0 220.0 1.5 1.6 3.9 1.0 1.7 10.0";
    assert!(matches!(
        parse_label_line(Path::new("label.txt"), 4, short),
        Err(ConvertError::MalformedLabel { line: 4, .. })
    ));
    let garbled = CAR_ROW.replace("1.6", "wide");
    assert!(matches!(
        parse_label_line(Path::new("label.txt"), 1, &garbled),
        Err(ConvertError::MalformedLabel { .. })
    ));
}

#[test]
fn label_file_skips_blank_lines_and_reports_line_numbers() {
    let content = format!("{CAR_ROW}\n\n{CAR_ROW}\n");
    assert_eq!(parse_label_file(Path::new("label.txt"), &content).unwrap().len(), 2);

    let broken = format!("{CAR_ROW}\n\nCar 1 2\n");
    match parse_label_file(Path::new("label.txt"), &broken) {
        Err(ConvertError::MalformedLabel { line, .. }) => assert_eq!(line, 3),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn kitti_calib_entries() {
    let calib = CalibFile::parse(Path::new("calib.txt"), KITTI_CALIB).unwrap();
    assert_eq!(calib.len(), 3);
    assert_eq!(calib.entry("R0_rect").unwrap().values.len(), 9);
    assert_relative_eq!(calib.matrix3x4("P0").unwrap()[(0, 2)], 960f32);
    assert_relative_eq!(calib.matrix3("R0_rect").unwrap(), na::Matrix3::identity());
    assert!(matches!(calib.matrix3x4("P2"), Err(ConvertError::MissingCalib { .. })));
    // R0_rect 只有 9 个数
    assert!(calib.matrix3x4("R0_rect").is_err());
}

#[test]
fn calib_rows_with_wrong_arity_fail() {
    let content = "P0: 1 2 3 4 5 6 7 8 9 10\n";
    assert!(matches!(
        CalibFile::parse(Path::new("calib.txt"), content),
        Err(ConvertError::MalformedCalib { line: 1, .. })
    ));
    assert!(matches!(
        CalibFile::parse(Path::new("calib.txt"), "P0: 1 2 x 4 5 6 7 8 9\n"),
        Err(ConvertError::MalformedCalib { .. })
    ));
}

#[test]
fn calib_layouts() {
    let nus = CalibFile::parse(Path::new("calib.txt"), NUS_CALIB).unwrap();
    let layout = CalibLayout::IntrinsicExtrinsicLines { num_cameras: 1 };
    let calibs = layout.lidar_calibs(&nus).unwrap();
    assert_eq!(calibs.len(), 1);
    let p = calibs[0].project_point(&na::Point3::new(10f32, 0f32, 0f32));
    assert_relative_eq!(p.u, 960f32);
    assert!(layout.rect_calibs(&nus).unwrap().is_none());
    assert!(matches!(
        CalibLayout::IntrinsicExtrinsicLines { num_cameras: 2 }.lidar_calibs(&nus),
        Err(ConvertError::MissingCalib { .. })
    ));

    let kitti = CalibFile::parse(Path::new("calib.txt"), KITTI_CALIB).unwrap();
    let layout = CalibLayout::ProjectionTags {
        cameras: vec!["P0".to_string()],
        rect_tag: "R0_rect".to_string(),
        velo_to_cam_tag: "Tr_velo_to_cam".to_string(),
    };
    let p = layout.lidar_calibs(&kitti).unwrap()[0].project_point(&na::Point3::new(10f32, 0f32, 0f32));
    assert_relative_eq!(p.u, 960f32);
    assert_relative_eq!(p.v, 540f32);
    let rect = layout.rect_calib(&kitti).unwrap().unwrap();
    let lidar = rect.rect_to_lidar(&na::Point3::new(0f32, 0f32, 10f32)).unwrap();
    assert_relative_eq!(lidar.coords, na::Vector3::new(10f32, 0f32, 0f32), epsilon = 1e-5);
    // 默认的 P0..P4 在这个文件中不全
    assert!(DatasetSchema::spa_mvx().calib_layout.lidar_calibs(&kitti).is_err());
}

#[test]
fn point_cloud_from_bin() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("points.bin");
    write_bin(&path, &[[1f32, 2f32, 3f32, 0.5f32], [4f32, 5f32, 6f32, 0.25f32]]);

    let cloud = PointCloud::from_bin_file(&path, 4).unwrap();
    assert_eq!(cloud.len(), 2);
    assert_eq!(cloud.features(1), &[4f32, 5f32, 6f32, 0.25f32]);
    assert_eq!(cloud.point(0), na::Point3::new(1f32, 2f32, 3f32));

    assert!(matches!(
        PointCloud::from_bin_file(&path, 3),
        Err(ConvertError::PointCloudLayout { len: 8, num_features: 3, .. })
    ));
    assert!(matches!(
        PointCloud::from_bin_file(&dir.path().join("missing.bin"), 4),
        Err(ConvertError::Io { .. })
    ));
}

#[test]
fn flip_and_retain_keep_all_features() {
    let cloud = PointCloud::new(vec![1f32, 0f32, 0f32, 7f32, -2f32, 1f32, 1f32, 8f32], 4).unwrap();
    let flipped = cloud.flip_x();
    assert_eq!(flipped.features(0), &[-1f32, 0f32, 0f32, 7f32]);
    let kept = flipped.retain(|p| p.x > 0f32);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept.features(0), &[2f32, 1f32, 1f32, 8f32]);
    assert!(PointCloud::new(vec![1f32, 2f32], 2).is_none());
}

#[test]
fn points_outside_image_are_removed() {
    let cloud = PointCloud::from_points(&[
        na::Point3::new(0f32, 0f32, 0f32),
        // u = 960 + 1000 * 30 / 10
        na::Point3::new(30f32, 0f32, 0f32),
        // 相机后方
        na::Point3::new(0f32, 0f32, -20f32),
    ]);
    let kept = remove_outside_points(&cloud, &cube_calib(), ImageSize::new(1920, 1080));
    assert_eq!(kept.xyz(), vec![na::Point3::new(0f32, 0f32, 0f32)]);
}

#[test]
fn occlusion_codes() {
    assert_eq!(Occlusion::try_from(2u8).unwrap(), Occlusion::LargelyOccluded);
    assert!(Occlusion::try_from(4u8).is_err());
    assert_eq!(Occlusion::from_str("unknown").unwrap(), Occlusion::Unknown);
}

#[test]
fn schema_lookups() {
    let nus = DatasetSchema::spa_nus();
    assert_eq!(nus.map_name("cyclist"), "bicycle");
    assert_eq!(nus.map_name("truck"), "truck");
    assert_eq!(nus.category_id("pedestrian"), Some(3));
    assert_eq!(nus.default_attribute("car"), Some(("vehicle.parked", 6)));
    assert_eq!(nus.default_attribute("truck"), None);

    let mvx = DatasetSchema::spa_mvx();
    assert!(mvx.is_ignored("DontCare"));
    assert!(!nus.is_ignored("DontCare"));
    assert_eq!(SchemaKind::from_str("waymo").unwrap().schema().num_features, 6);
    assert_eq!(SchemaKind::SpaNus.to_string(), "spa_nus");
}

#[test]
fn config_json_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let schema = serde_json::to_value(DatasetSchema::waymo()).unwrap();
    std::fs::write(&path, serde_json::json!({ "schema": schema }).to_string()).unwrap();

    let config = ConverterConfig::from_json_file(&path).unwrap();
    assert_eq!(config, ConverterConfig::new(DatasetSchema::waymo()));
    assert_eq!(config.num_workers, 8);
    assert!(config.mono3d);

    std::fs::write(&path, "{ \"schema\": 3 }").unwrap();
    assert!(matches!(ConverterConfig::from_json_file(&path), Err(ConvertError::Json(_))));
}

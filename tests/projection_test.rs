use approx::assert_relative_eq;
use nalgebra as na;

use spa_converter::{
    data::BBox3D::{CoordFrame, Size3},
    geometry::corners,
    projection::{project_box, reduce, CalibrationPair, ImageSize, ProjectedPoint, ReductionPolicy},
};

use super::{cube_calib, intrinsic, lidar_to_cam_rotation};

const POLICIES: [ReductionPolicy; 3] = [
    ReductionPolicy::BoundingRect,
    ReductionPolicy::CanvasClip,
    ReductionPolicy::HullCanvasIntersection,
];

fn canvas() -> ImageSize {
    ImageSize::new(1920, 1080)
}

fn unit_cube(center: na::Point3<f32>) -> spa_converter::data::BBox3D::CornerPoints {
    corners(&center, &Size3::new(2f32, 2f32, 2f32), 0f32, CoordFrame::Lidar)
}

#[test]
fn optical_axis_hits_principal_point() {
    let calib = CalibrationPair::new(intrinsic(), na::Matrix3::identity(), na::Vector3::zeros());
    for depth in [0.5f32, 3f32, 80f32].iter() {
        let p = calib.project_point(&na::Point3::new(0f32, 0f32, *depth));
        assert_relative_eq!(p.u, 960f32);
        assert_relative_eq!(p.v, 540f32);
        assert_relative_eq!(p.depth, *depth);
        assert!(p.in_front());
    }
}

#[test]
fn cube_end_to_end() {
    let calib = cube_calib();
    let center = calib.project_point(&na::Point3::origin());
    assert_relative_eq!(center.u, 960f32);
    assert_relative_eq!(center.v, 540f32);
    assert_relative_eq!(center.depth, 10f32);

    let cube = unit_cube(na::Point3::origin());
    let rect = project_box(&cube, &calib, ReductionPolicy::BoundingRect, canvas()).unwrap();
    let (cx, cy) = rect.center();
    assert_relative_eq!(cx, 960f32, epsilon = 1e-3);
    assert_relative_eq!(cy, 540f32, epsilon = 1e-3);
    // 最近的面在 z = 9 处
    assert_relative_eq!(rect.width(), 2000f32 / 9f32, max_relative = 1e-4);
    assert_relative_eq!(rect.height(), 2000f32 / 9f32, max_relative = 1e-4);

    // 完全在画布内时三种方式一致
    for policy in POLICIES.iter() {
        let other = project_box(&cube, &calib, *policy, canvas()).unwrap();
        assert_relative_eq!(other.x1, rect.x1, epsilon = 1e-2);
        assert_relative_eq!(other.y1, rect.y1, epsilon = 1e-2);
        assert_relative_eq!(other.x2, rect.x2, epsilon = 1e-2);
        assert_relative_eq!(other.y2, rect.y2, epsilon = 1e-2);
    }
}

#[test]
fn corners_behind_camera_are_dropped() {
    let calib = CalibrationPair::new(intrinsic(), na::Matrix3::identity(), na::Vector3::zeros());
    // z 在 [-0.5, 1.5]，只有 z = 1.5 的四个点在相机前方
    let cube = unit_cube(na::Point3::new(0f32, 0f32, 0.5f32));
    let rect = project_box(&cube, &calib, ReductionPolicy::BoundingRect, canvas()).unwrap();
    assert_relative_eq!(rect.x1, 960f32 - 1000f32 / 1.5f32, epsilon = 1e-2);
    assert_relative_eq!(rect.x2, 960f32 + 1000f32 / 1.5f32, epsilon = 1e-2);
    assert_relative_eq!(rect.y1, 540f32 - 1000f32 / 1.5f32, epsilon = 1e-2);
}

#[test]
fn box_behind_camera_has_no_rect() {
    let calib = CalibrationPair::new(intrinsic(), na::Matrix3::identity(), na::Vector3::zeros());
    let cube = unit_cube(na::Point3::new(0f32, 0f32, -10f32));
    for policy in POLICIES.iter() {
        assert!(project_box(&cube, &calib, *policy, canvas()).is_none(), "{policy}");
    }
    assert!(reduce(&[], ReductionPolicy::BoundingRect, canvas()).is_none());
}

#[test]
fn hull_outside_canvas_has_no_rect() {
    let calib = cube_calib();
    // u 约为 960 + 1000 * 50 / 10
    let cube = unit_cube(na::Point3::new(50f32, 0f32, 0f32));
    assert!(project_box(&cube, &calib, ReductionPolicy::HullCanvasIntersection, canvas()).is_none());

    let raw = project_box(&cube, &calib, ReductionPolicy::BoundingRect, canvas()).unwrap();
    assert!(raw.x1 > 1920f32);
    let clipped = project_box(&cube, &calib, ReductionPolicy::CanvasClip, canvas()).unwrap();
    assert_relative_eq!(clipped.x1, 1920f32);
    assert_relative_eq!(clipped.width(), 0f32);
}

#[test]
fn hull_partially_outside_is_clipped() {
    let calib = cube_calib();
    // 右半部分超出画布
    let cube = unit_cube(na::Point3::new(9.6f32, 0f32, 0f32));
    let raw = project_box(&cube, &calib, ReductionPolicy::BoundingRect, canvas()).unwrap();
    let hull = project_box(&cube, &calib, ReductionPolicy::HullCanvasIntersection, canvas()).unwrap();
    assert!(raw.x2 > 1920f32);
    assert_relative_eq!(hull.x2, 1920f32, epsilon = 1e-2);
    assert_relative_eq!(hull.x1, raw.x1, epsilon = 1e-2);
    assert_relative_eq!(hull.y1, raw.y1, epsilon = 1e-2);
    assert_relative_eq!(hull.y2, raw.y2, epsilon = 1e-2);
}

#[test]
fn canvas_clip_clamps_each_coordinate() {
    let projected = [
        ProjectedPoint { u: -100f32, v: 50f32, depth: 1f32 },
        ProjectedPoint { u: 300f32, v: 2000f32, depth: 1f32 },
        ProjectedPoint { u: 5000f32, v: 5000f32, depth: -1f32 },
    ];
    let rect = reduce(&projected, ReductionPolicy::CanvasClip, canvas()).unwrap();
    assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (0f32, 50f32, 300f32, 1080f32));
}

#[test]
fn projection_matrix_baseline() {
    let baseline = na::Vector3::new(-0.54f32, 0f32, 0f32);
    let offset = intrinsic() * baseline;
    let p = na::Matrix3x4::from_fn(|r, c| if c < 3 { intrinsic()[(r, c)] } else { offset[r] });
    let calib = CalibrationPair::from_projection_3x4(&p).unwrap();
    assert_relative_eq!(calib.intrinsic, intrinsic());
    assert_relative_eq!(calib.translation, baseline, epsilon = 1e-5);

    let singular = na::Matrix3x4::zeros();
    assert!(CalibrationPair::from_projection_3x4(&singular).is_err());
}

#[test]
fn kitti_chain_maps_lidar_forward_to_principal_point() {
    let p = na::Matrix3x4::from_fn(|r, c| if c < 3 { intrinsic()[(r, c)] } else { 0f32 });
    let velo_to_cam = na::Matrix3x4::from_fn(|r, c| if c < 3 { lidar_to_cam_rotation()[(r, c)] } else { 0f32 });
    let calib = CalibrationPair::from_kitti(&p, &na::Matrix3::identity(), &velo_to_cam).unwrap();

    let forward = calib.project_point(&na::Point3::new(10f32, 0f32, 0f32));
    assert_relative_eq!(forward.u, 960f32);
    assert_relative_eq!(forward.v, 540f32);
    assert_relative_eq!(forward.depth, 10f32);
    // 左侧的点在图像左半边
    assert!(calib.project_point(&na::Point3::new(10f32, 2f32, 0f32)).u < 960f32);
    assert!(!calib.project_point(&na::Point3::new(-10f32, 0f32, 0f32)).in_front());

    let back = calib.from_camera(&calib.to_camera(&na::Point3::new(1f32, 2f32, 3f32))).unwrap();
    assert_relative_eq!(back.coords, na::Vector3::new(1f32, 2f32, 3f32), epsilon = 1e-5);
}

#[test]
fn image_contains_is_half_open() {
    let canvas = canvas();
    assert!(canvas.contains(0f32, 0f32));
    assert!(canvas.contains(1919.5f32, 1079.5f32));
    assert!(!canvas.contains(1920f32, 0f32));
    assert!(!canvas.contains(0f32, 1080f32));
    assert!(!canvas.contains(-0.1f32, 10f32));
}

#[test]
fn policy_names() {
    assert_eq!(
        "hull_canvas_intersection".parse::<ReductionPolicy>().unwrap(),
        ReductionPolicy::HullCanvasIntersection
    );
    assert_eq!(ReductionPolicy::CanvasClip.to_string(), "canvas_clip");
}

fn front(u: f32, v: f32) -> ProjectedPoint {
    ProjectedPoint { u, v, depth: 1f32 }
}

#[test]
fn hull_of_two_front_corners_is_a_segment() {
    let projected = [front(100f32, 100f32), front(400f32, 300f32), ProjectedPoint { u: 0f32, v: 0f32, depth: -1f32 }];
    let rect = reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).unwrap();
    assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (100f32, 100f32, 400f32, 300f32));

    // 右端超出画布的部分被截掉
    let projected = [front(1800f32, 100f32), front(2500f32, 300f32)];
    let rect = reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).unwrap();
    assert_eq!((rect.x1, rect.x2), (1800f32, 1920f32));

    let projected = [front(2000f32, 100f32), front(2500f32, 300f32)];
    assert!(reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).is_none());
}

#[test]
fn hull_of_one_front_corner_is_a_point() {
    let mut projected = [ProjectedPoint { u: 0f32, v: 0f32, depth: -1f32 }; 8];
    projected[3] = front(100f32, 200f32);
    let rect = reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).unwrap();
    assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (100f32, 200f32, 100f32, 200f32));

    projected[3] = front(-5f32, 200f32);
    assert!(reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).is_none());
}

#[test]
fn collinear_front_corners_reduce_like_a_segment() {
    let projected = [front(100f32, 500f32), front(300f32, 500f32), front(200f32, 500f32), front(300f32, 500f32)];
    let rect = reduce(&projected, ReductionPolicy::HullCanvasIntersection, canvas()).unwrap();
    assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (100f32, 500f32, 300f32, 500f32));
}

#[test]
fn heading_turns_into_camera_rotation_y() {
    let calib = CalibrationPair::new(intrinsic(), lidar_to_cam_rotation(), na::Vector3::zeros());
    // 激光雷达 +x 即相机 +z
    assert_relative_eq!(calib.heading_to_camera(0f32), -std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
    assert_relative_eq!(calib.heading_to_camera(0.3), -std::f32::consts::FRAC_PI_2 - 0.3, epsilon = 1e-6);
    // 相机坐标系本身不变
    let cam = CalibrationPair::new(intrinsic(), na::Matrix3::identity(), na::Vector3::zeros());
    assert_relative_eq!(cam.heading_to_camera(0.3), 0f32, epsilon = 1e-6);
}

#[test]
fn heading_in_camera_keeps_the_box_corners() {
    let calib = CalibrationPair::new(intrinsic(), lidar_to_cam_rotation(), na::Vector3::new(0.2f32, -0.5f32, 1f32));
    let size = Size3::new(1.5f32, 1.6f32, 3.9f32);
    let center = na::Point3::new(12f32, 3f32, -0.4f32);
    for yaw in [0.3f32, 1.2f32, -2.5f32].iter() {
        let lidar: Vec<_> = corners(&center, &size, *yaw, CoordFrame::Lidar)
            .0
            .iter()
            .map(|p| calib.to_camera(p))
            .collect();
        let cam = corners(&calib.to_camera(&center), &size, calib.heading_to_camera(*yaw), CoordFrame::Camera);
        for p in cam.0.iter() {
            assert!(lidar.iter().any(|q| (p - q).norm() < 1e-4), "{} yaw {}", p, yaw);
        }
    }
}

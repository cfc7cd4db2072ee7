use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Point2, Vector3};
use ndarray::Array3;
use tempfile::tempdir;
use vxp_core::background::BackgroundOutcome;
use vxp_core::{CameraModel, PatternGeometry, PatternKind, PinholeCamera, PipelineConfig, ViewPose, VxpError};
use vxp_io::{CalibrationStatus, DetectionSidecar, Stage, process_cameras, read_frame, read_report, write_png};

const FRAMES: usize = 12;

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new(root);
    config.background.seed = Some(5);
    config.capture.square_size = 30.0;
    config.capture.sample_every = 2;
    config.capture.target_views = 5;
    config
}

fn write_background_video(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..FRAMES {
        // one bright outlier frame; the median ignores it
        let value = if i == 3 { 250 } else { 40 + (i % 3) as u8 };
        let frame = Array3::from_elem((6, 8, 3), value);
        write_png(dir.join(format!("{i:03}.png")), &frame).unwrap();
    }
}

fn write_calibration_video(camera_dir: &Path, config: &PipelineConfig) {
    let video = camera_dir.join(&config.calibration_video);
    fs::create_dir_all(&video).unwrap();
    for i in 0..FRAMES {
        write_png(video.join(format!("{i:03}.png")), &Array3::zeros((6, 8, 3))).unwrap();
    }

    let kmtx = Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
    let camera = PinholeCamera::from_parts(&kmtx, &[-0.05, 0.0, 0.0, 0.0]).unwrap();
    let grid = PatternGeometry::new(PatternKind::Chessboard, 8, 6, 30.0)
        .unwrap()
        .object_points();
    let poses = [
        ((0.2, -0.1, 0.05), (-100.0, -75.0, 600.0)),
        ((-0.25, 0.2, 0.0), (-110.0, -70.0, 650.0)),
        ((0.1, 0.3, -0.1), (-95.0, -80.0, 700.0)),
        ((-0.2, -0.3, 0.1), (-105.0, -60.0, 620.0)),
        ((0.35, 0.05, 0.0), (-100.0, -90.0, 680.0)),
    ];

    let mut sidecar = DetectionSidecar::default();
    for (k, &((rx, ry, rz), (tx, ty, tz))) in poses.iter().enumerate() {
        let pose = ViewPose::new(Vector3::new(rx, ry, rz), Vector3::new(tx, ty, tz));
        let points: Vec<Point2<f64>> = grid
            .iter()
            .map(|p| {
                let (u, v) = camera.project(&pose.transform_point(p)).unwrap();
                Point2::new(u, v)
            })
            .collect();
        sidecar.insert(2 * k, &points);
    }
    sidecar
        .write_json(camera_dir.join(&config.detections_file))
        .unwrap();
}

#[test]
fn cameras_are_processed_independently_and_cached() {
    let root = tempdir().unwrap();
    let config = config(root.path());

    let good = root.path().join("cam0");
    write_background_video(&good.join(&config.background_video));
    write_calibration_video(&good, &config);
    // no videos at all
    fs::create_dir_all(root.path().join("cam1")).unwrap();

    let summary = process_cameras(&config, Stage::All, None).unwrap();
    assert_eq!(summary.cameras.len(), 2);
    assert!(!summary.all_succeeded());

    let cam0 = &summary.cameras[0];
    assert_eq!(cam0.name, "cam0");
    assert!(cam0.error.is_none(), "{:?}", cam0.error);
    assert_eq!(
        cam0.background,
        Some(BackgroundOutcome::Created { samples_used: 10 })
    );
    match &cam0.calibration {
        Some(CalibrationStatus::Created { views, avg_error, .. }) => {
            assert!(*views >= 4);
            assert!(*avg_error < 1e-2);
        }
        other => panic!("unexpected calibration status {other:?}"),
    }

    let cam1 = &summary.cameras[1];
    assert!(matches!(cam1.error, Some(VxpError::SourceUnavailable(_))));

    let background = read_frame(good.join(&config.background_image)).unwrap();
    assert_eq!(background.dim(), (6, 8, 3));
    assert!(background.iter().all(|&v| (40..=42).contains(&v)));

    let report = read_report(good.join(&config.calibration_output)).unwrap();
    assert_relative_eq!(report.camera_matrix[0][0], 800.0, max_relative = 1e-3);
    assert_relative_eq!(report.camera_matrix[1][2], 240.0, max_relative = 1e-3);
    assert_eq!(report.image_width, 8);
    assert_eq!(report.flags, vec!["fix_k3"]);
    assert!(report.grid_points.is_some());

    let background_bytes = fs::read(good.join(&config.background_image)).unwrap();
    let report_bytes = fs::read(good.join(&config.calibration_output)).unwrap();

    let again = process_cameras(&config, Stage::All, Some("cam0")).unwrap();
    assert_eq!(again.cameras.len(), 1);
    assert_eq!(again.cameras[0].background, Some(BackgroundOutcome::Cached));
    assert_eq!(again.cameras[0].calibration, Some(CalibrationStatus::Cached));
    assert_eq!(fs::read(good.join(&config.background_image)).unwrap(), background_bytes);
    assert_eq!(fs::read(good.join(&config.calibration_output)).unwrap(), report_bytes);
}

#[test]
fn too_few_detections_write_no_report() {
    let root = tempdir().unwrap();
    let mut config = config(root.path());
    config.capture.target_views = 8;

    let cam = root.path().join("cam0");
    write_calibration_video(&cam, &config);

    let summary = process_cameras(&config, Stage::Calibrate, None).unwrap();
    assert!(matches!(
        summary.cameras[0].error,
        Some(VxpError::InsufficientData(_))
    ));
    assert!(!cam.join(&config.calibration_output).exists());
}

#[test]
fn invalid_config_fails_before_any_camera() {
    let root = tempdir().unwrap();
    let mut config = config(root.path());
    config.capture.square_size = 0.0;

    let res = process_cameras(&config, Stage::All, None);
    assert!(matches!(res, Err(VxpError::InvalidConfig(_))));
}

#[test]
fn unknown_camera_is_reported() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("cam0")).unwrap();
    let res = process_cameras(&config(root.path()), Stage::Background, Some("cam9"));
    assert!(matches!(res, Err(VxpError::SourceUnavailable(_))));
}

use kornia_colmap::{
    config::ConversionConfig,
    converter::{plan_modes, run_conversion, ConversionMode},
    database::{ColmapDatabase, MissingPosePolicy},
    pose::{quaternion_to_rotation, Pose},
    source::{DeviceIntrinsics, PoseFrame, PoseLog, PoseSource},
    text::{self, TextModel, CAMERAS_TXT, IMAGES_TXT, POINTS3D_TXT},
    CameraModel, ColmapError,
};

fn device_intrinsics() -> DeviceIntrinsics {
    DeviceIntrinsics {
        focal_length: 1050.5,
        principal_point_x: 1104.25,
        principal_point_y: 621.75,
        radial_distortion_k1: -0.042,
        radial_distortion_k2: 0.0125,
        image_width: 2208,
        image_height: 1242,
    }
}

fn recorded_log(num_frames: u64) -> PoseLog {
    PoseLog::new(
        device_intrinsics(),
        (0..num_frames).map(|index| {
            let half = 0.1 * index as f64;
            PoseFrame {
                index,
                pose: Pose {
                    rotation: quaternion_to_rotation(&[half.cos(), half.sin(), 0.0, 0.0]),
                    translation: [0.25 * index as f64, -0.1, 1.5],
                },
            }
        }),
    )
}

#[test]
fn full_conversion_then_export() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("poses.json");
    recorded_log(6).to_json_file(&log_path)?;

    let config = ConversionConfig::default()
        .with_database_path(dir.path().join("database.db"))
        .with_output_dir(dir.path().join("model"));

    let mut source = PoseLog::from_json_file(&log_path)?;
    let mut reports = Vec::new();
    for mode in plan_modes(true, true, false) {
        reports.push(run_conversion(&config, mode, Some(&mut source))?);
    }
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].images_created, 5);
    assert_eq!(reports[1].files_written.len(), 3);

    let model = TextModel::read_from_dir(&config.output_dir)?;
    assert_eq!(model.cameras.len(), 1);
    assert_eq!(model.cameras[0].model, CameraModel::Radial);
    assert_eq!(model.cameras[0].width, 2208);
    assert_eq!(model.images.len(), 5);
    assert_eq!(model.images[0].name, "left_0001.jpg");
    assert!(model
        .images
        .iter()
        .all(|image| image.camera_id == model.cameras[0].camera_id && image.points2d.is_empty()));
    assert!(text::read_points3d_txt(config.output_dir.join(POINTS3D_TXT))?.is_empty());

    // the text model matches the database exactly
    let db = ColmapDatabase::open(&config.database_path)?;
    assert_eq!(db.list_cameras()?, model.cameras);
    assert_eq!(db.list_images()?, model.images);
    Ok(())
}

#[test]
fn export_is_byte_identical_after_reimport() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = ConversionConfig::default()
        .with_database_path(dir.path().join("database.db"))
        .with_output_dir(dir.path().join("first"));

    let mut source = recorded_log(4);
    run_conversion(&config, ConversionMode::Full, Some(&mut source))?;
    run_conversion(&config, ConversionMode::ExportText, None)?;

    let second = dir.path().join("second");
    std::fs::create_dir(&second)?;
    TextModel::read_from_dir(&config.output_dir)?.write_to_dir(&second, None)?;

    for name in [CAMERAS_TXT, IMAGES_TXT, POINTS3D_TXT] {
        assert_eq!(
            std::fs::read(config.output_dir.join(name))?,
            std::fs::read(second.join(name))?
        );
    }
    Ok(())
}

#[test]
fn intrinsics_then_extrinsics_refresh() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = ConversionConfig::default().with_database_path(dir.path().join("database.db"));

    // a project made by another tool with two cameras
    {
        let mut db = ColmapDatabase::open(&config.database_path)?;
        let a = db.add_camera(CameraModel::SimpleRadial, 2208, 1242, &[1000.0, 1104.0, 621.0, 0.0], false)?;
        let b = db.add_camera(CameraModel::SimpleRadial, 2208, 1242, &[1010.0, 1104.0, 621.0, 0.0], false)?;
        db.add_image("left_0001.jpg", a, &[1.0, 0.0, 0.0, 0.0], &[0.0; 3])?;
        db.add_image("left_0002.jpg", b, &[1.0, 0.0, 0.0, 0.0], &[0.0; 3])?;
        db.commit()?;
        db.close()?;
    }

    let mut source = recorded_log(3);
    let report = run_conversion(&config, ConversionMode::IntrinsicsOnly, Some(&mut source))?;
    let camera_id = report.camera_id.ok_or("no camera created")?;

    let mut source = recorded_log(3);
    let report = run_conversion(&config, ConversionMode::ExtrinsicsOnly, Some(&mut source))?;
    assert_eq!(report.images_updated, 2);

    let db = ColmapDatabase::open(&config.database_path)?;
    let cameras = db.list_cameras()?;
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].params, device_intrinsics().to_camera_params().to_vec());
    for image in db.list_images()? {
        assert_eq!(image.camera_id, camera_id);
        assert_ne!(image.tvec, [0.0; 3]);
    }
    Ok(())
}

#[test]
fn failed_run_leaves_store_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = ConversionConfig::default().with_database_path(dir.path().join("database.db"));

    // a reflection is not a valid camera rotation
    let mut source = recorded_log(3);
    source.frames.push_back(PoseFrame {
        index: 3,
        pose: Pose {
            rotation: [[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        },
    });

    let result = run_conversion(&config, ConversionMode::Full, Some(&mut source));
    assert!(matches!(result, Err(ColmapError::DegeneratePose(_))));

    let db = ColmapDatabase::open(&config.database_path)?;
    assert_eq!(db.num_cameras()?, 0);
    assert_eq!(db.num_images()?, 0);
    Ok(())
}

#[test]
fn export_with_missing_pose_values() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("database.db");
    {
        let mut db = ColmapDatabase::open(&db_path)?;
        let camera_id = db.add_camera(CameraModel::Radial, 640, 480, &[500.0, 320.0, 240.0, 0.0, 0.0], true)?;
        db.add_image("left_0001.jpg", camera_id, &[1.0, 0.0, 0.0, 0.0], &[1.0, 2.0, 3.0])?;
        db.commit()?;
    }
    {
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute("UPDATE images SET prior_tz = NULL", [])?;
    }

    let config = ConversionConfig::default()
        .with_database_path(&db_path)
        .with_output_dir(dir.path().join("model"));
    assert!(matches!(
        run_conversion(&config, ConversionMode::ExportText, None),
        Err(ColmapError::MissingField { field: "prior_tz", .. })
    ));

    let config = config.with_missing_pose_policy(MissingPosePolicy::FillZero);
    run_conversion(&config, ConversionMode::ExportText, None)?;
    let model = TextModel::read_from_dir(&config.output_dir)?;
    assert_eq!(model.images[0].tvec, [1.0, 2.0, 0.0]);
    Ok(())
}

#[test]
fn pose_source_trait_object() -> Result<(), Box<dyn std::error::Error>> {
    let mut log = recorded_log(2);
    let source: &mut dyn PoseSource = &mut log;
    assert_eq!(source.intrinsics()?.image_height, 1242);
    assert_eq!(source.next_frame()?.map(|frame| frame.index), Some(0));
    Ok(())
}

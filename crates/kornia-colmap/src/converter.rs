use std::fmt;
use std::path::PathBuf;

use crate::config::ConversionConfig;
use crate::database::ColmapDatabase;
use crate::error::{ColmapError, Result};
use crate::source::{DeviceIntrinsics, FrameSink, NoFrameSink, PoseSource};
use crate::text::TextModel;

/// What a conversion run writes into the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Create the camera from the device calibration and one image per frame.
    Full,
    /// Replace all the cameras by the device calibration and point every image to it.
    IntrinsicsOnly,
    /// Update the pose of the images already in the project.
    ExtrinsicsOnly,
    /// Export the database to the text model.
    ExportText,
}

impl ConversionMode {
    /// Whether the mode reads from a pose source.
    pub fn requires_source(self) -> bool {
        !matches!(self, ConversionMode::ExportText)
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionMode::Full => "intrinsics and extrinsics",
            ConversionMode::IntrinsicsOnly => "intrinsics",
            ConversionMode::ExtrinsicsOnly => "extrinsics",
            ConversionMode::ExportText => "text model export",
        };
        f.write_str(name)
    }
}

/// Select the modes to run from the command line flags, in order.
///
/// Initializing both intrinsics and extrinsics also exports the text model.
/// An empty plan means there is nothing to do.
pub fn plan_modes(intrinsics: bool, extrinsics: bool, text_model: bool) -> Vec<ConversionMode> {
    let mut modes = match (intrinsics, extrinsics) {
        (true, true) => vec![ConversionMode::Full, ConversionMode::ExportText],
        (false, true) => vec![ConversionMode::ExtrinsicsOnly],
        (true, false) => vec![ConversionMode::IntrinsicsOnly],
        (false, false) => vec![],
    };
    if text_model && !modes.contains(&ConversionMode::ExportText) {
        modes.push(ConversionMode::ExportText);
    }
    modes
}

/// The state of a [`Converter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterState {
    /// Nothing has been read yet.
    Idle,
    /// Frames are being pulled from the source.
    Streaming,
    /// The run is over, committed or aborted.
    Finalized,
}

/// Summary of a conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// The mode that ran
    pub mode: ConversionMode,
    /// The camera created, if any
    pub camera_id: Option<u32>,
    /// Number of frames pulled from the source
    pub frames_seen: usize,
    /// Number of frames ignored by the start frame, stride or missing image
    pub frames_skipped: usize,
    /// Number of images created
    pub images_created: usize,
    /// Number of images whose pose was updated
    pub images_updated: usize,
    /// Text model files written
    pub files_written: Vec<PathBuf>,
}

impl ConversionReport {
    fn new(mode: ConversionMode) -> Self {
        Self {
            mode,
            camera_id: None,
            frames_seen: 0,
            frames_skipped: 0,
            images_created: 0,
            images_updated: 0,
            files_written: Vec::new(),
        }
    }
}

/// Drives one conversion run over a project store.
///
/// The store is committed once when the run succeeds. Any error rolls back
/// every mutation of the run.
pub struct Converter<'a> {
    config: &'a ConversionConfig,
    db: &'a mut ColmapDatabase,
    sink: Box<dyn FrameSink + 'a>,
    state: ConverterState,
}

impl<'a> Converter<'a> {
    /// Create a converter in the [`ConverterState::Idle`] state.
    pub fn new(config: &'a ConversionConfig, db: &'a mut ColmapDatabase) -> Self {
        Self {
            config,
            db,
            sink: Box::new(NoFrameSink),
            state: ConverterState::Idle,
        }
    }

    /// Set the collaborator notified of every persisted frame.
    pub fn with_frame_sink(mut self, sink: impl FrameSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The current state.
    pub fn state(&self) -> ConverterState {
        self.state
    }

    /// Run a conversion.
    ///
    /// # Arguments
    ///
    /// * `mode` - What to write into the project.
    /// * `source` - The pose source. Required by every mode but [`ConversionMode::ExportText`].
    pub fn run(
        &mut self,
        mode: ConversionMode,
        source: Option<&mut dyn PoseSource>,
    ) -> Result<ConversionReport> {
        if self.state != ConverterState::Idle {
            return Err(ColmapError::InvalidConfig(
                "a converter can only run once".to_string(),
            ));
        }
        self.config.validate()?;
        log::info!("Running COLMAP conversion: {mode}");

        let result = match (mode, source) {
            (ConversionMode::ExportText, _) => self.export_text(),
            (mode, Some(source)) => self.stream(mode, source),
            (mode, None) => Err(ColmapError::InvalidConfig(format!(
                "{mode} requires a pose source"
            ))),
        };

        self.state = ConverterState::Finalized;
        match result {
            Ok(report) => {
                if mode.requires_source() {
                    self.db.commit()?;
                }
                log::info!("Finished {mode}: {report:?}");
                Ok(report)
            }
            Err(err) => {
                log::error!("Aborting {mode}: {err}");
                if let Err(rollback_err) = self.db.rollback() {
                    log::error!("Failed to roll back the project store: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    fn stream(
        &mut self,
        mode: ConversionMode,
        source: &mut dyn PoseSource,
    ) -> Result<ConversionReport> {
        let mut report = ConversionReport::new(mode);

        // Idle -> Streaming
        if matches!(mode, ConversionMode::Full | ConversionMode::IntrinsicsOnly) {
            let intrinsics = source.intrinsics()?;
            report.camera_id = Some(self.write_camera(mode, &intrinsics)?);
        }
        self.state = ConverterState::Streaming;

        if mode == ConversionMode::IntrinsicsOnly {
            return Ok(report);
        }

        let camera_id = report.camera_id;
        let mut last_index = None;
        while let Some(frame) = source.next_frame()? {
            if let Some(last) = last_index {
                if frame.index <= last {
                    return Err(ColmapError::PoseSource(format!(
                        "frame index {} received after {}",
                        frame.index, last
                    )));
                }
            }
            last_index = Some(frame.index);
            report.frames_seen += 1;

            let keep = if mode == ConversionMode::ExtrinsicsOnly {
                self.config.keeps_refresh_frame(frame.index)
            } else {
                self.config.keeps_frame(frame.index)
            };
            if !keep {
                report.frames_skipped += 1;
                continue;
            }

            let store_pose = frame.pose.to_store_pose()?;
            let name = self.config.frame_naming.frame_name(frame.index);

            match camera_id {
                Some(camera_id) => {
                    self.db
                        .add_image(&name, camera_id, &store_pose.qvec, &store_pose.tvec)?;
                    report.images_created += 1;
                }
                None => {
                    if !self.db.has_image(&name)? {
                        log::debug!("No image named {name} in the project, skipping frame");
                        report.frames_skipped += 1;
                        continue;
                    }
                    self.db
                        .update_image_pose(&name, &store_pose.qvec, &store_pose.tvec)?;
                    report.images_updated += 1;
                }
            }

            if self.config.verbose_poses {
                log::info!(
                    "{name}: q = {:?}, t = {:?}",
                    store_pose.qvec,
                    store_pose.tvec
                );
            } else {
                log::debug!("Persisted frame {} as {name}", frame.index);
            }

            self.sink.write_frame(&name, frame.index)?;
        }

        Ok(report)
    }

    fn write_camera(&mut self, mode: ConversionMode, intrinsics: &DeviceIntrinsics) -> Result<u32> {
        let params = intrinsics.to_camera_params();
        let (width, height) = (intrinsics.image_width, intrinsics.image_height);
        if mode == ConversionMode::IntrinsicsOnly {
            self.db
                .replace_cameras(DeviceIntrinsics::MODEL, width, height, &params, true)
        } else {
            self.db
                .add_camera(DeviceIntrinsics::MODEL, width, height, &params, true)
        }
    }

    fn export_text(&mut self) -> Result<ConversionReport> {
        let mut report = ConversionReport::new(ConversionMode::ExportText);

        let model = TextModel {
            cameras: self.db.list_cameras()?,
            images: self.db.list_images_with(self.config.missing_pose_policy)?,
        };

        std::fs::create_dir_all(&self.config.output_dir)?;
        report.files_written = model.write_to_dir(
            &self.config.output_dir,
            self.config.points_template.as_deref(),
        )?;
        log::info!(
            "Exported {} camera(s) and {} image(s) to {}",
            model.cameras.len(),
            model.images.len(),
            self.config.output_dir.display()
        );

        Ok(report)
    }
}

/// Open the project store, run one conversion and close the store.
///
/// The store is committed only when the run succeeds and is always closed,
/// including on error.
pub fn run_conversion(
    config: &ConversionConfig,
    mode: ConversionMode,
    source: Option<&mut dyn PoseSource>,
) -> Result<ConversionReport> {
    config.validate()?;
    let mut db = ColmapDatabase::open(&config.database_path)?;
    let result = Converter::new(config, &mut db).run(mode, source);
    let closed = db.close();
    let report = result?;
    closed?;
    Ok(report)
}

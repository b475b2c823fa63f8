use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera_model::CameraModel;
use crate::error::{ColmapError, Result};
use crate::pose::Pose;

/// Calibration of the device camera, read once from the pose source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceIntrinsics {
    /// Focal length in pixels
    pub focal_length: f64,
    /// Principal point x in pixels
    pub principal_point_x: f64,
    /// Principal point y in pixels
    pub principal_point_y: f64,
    /// First radial distortion coefficient
    pub radial_distortion_k1: f64,
    /// Second radial distortion coefficient
    pub radial_distortion_k2: f64,
    /// Image width in pixels
    pub image_width: u32,
    /// Image height in pixels
    pub image_height: u32,
}

impl DeviceIntrinsics {
    /// The camera model matching the device calibration.
    pub const MODEL: CameraModel = CameraModel::Radial;

    /// The parameters of the [`CameraModel::Radial`] model: f, cx, cy, k1, k2.
    pub fn to_camera_params(&self) -> [f64; 5] {
        [
            self.focal_length,
            self.principal_point_x,
            self.principal_point_y,
            self.radial_distortion_k1,
            self.radial_distortion_k2,
        ]
    }
}

/// A pose pulled from the source together with its frame index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Frame index in the stream
    pub index: u64,
    /// Camera pose in the world frame
    #[serde(flatten)]
    pub pose: Pose,
}

/// A pull based stream of camera poses.
pub trait PoseSource {
    /// The device calibration.
    fn intrinsics(&mut self) -> Result<DeviceIntrinsics>;

    /// Pull the next frame.
    ///
    /// Returns `Ok(None)` at the end of the stream. Any error is fatal to the
    /// conversion.
    fn next_frame(&mut self) -> Result<Option<PoseFrame>>;
}

/// A recorded pose stream that can be replayed as a [`PoseSource`].
///
/// The JSON layout is:
///
/// ```json
/// {
///   "intrinsics": { "focal_length": 700.0, "principal_point_x": 640.0, ... },
///   "frames": [ { "index": 0, "rotation": [[1, 0, 0], [0, 1, 0], [0, 0, 1]], "translation": [0, 0, 0] } ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseLog {
    /// Device calibration
    pub intrinsics: DeviceIntrinsics,
    /// Recorded frames
    pub frames: VecDeque<PoseFrame>,
}

impl PoseLog {
    /// Create a pose log from intrinsics and frames.
    pub fn new(intrinsics: DeviceIntrinsics, frames: impl IntoIterator<Item = PoseFrame>) -> Self {
        Self {
            intrinsics,
            frames: frames.into_iter().collect(),
        }
    }

    /// Load a pose log from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ColmapError::PoseSource(format!(
                "pose log {} does not exist",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)?;
        let log: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        log::debug!(
            "Loaded pose log {} with {} frames",
            path.display(),
            log.frames.len()
        );
        Ok(log)
    }

    /// Save the pose log as JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

impl PoseSource for PoseLog {
    fn intrinsics(&mut self) -> Result<DeviceIntrinsics> {
        Ok(self.intrinsics)
    }

    fn next_frame(&mut self) -> Result<Option<PoseFrame>> {
        Ok(self.frames.pop_front())
    }
}

/// Naming of the frame images written next to the project.
///
/// The name joins an image record to its file, e.g. `left_0001.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameNaming {
    /// Name prefix
    pub prefix: String,
    /// Minimum number of digits of the zero padded index
    pub digits: usize,
    /// File extension without the dot
    pub extension: String,
}

impl Default for FrameNaming {
    fn default() -> Self {
        Self {
            prefix: "left".to_string(),
            digits: 4,
            extension: "jpg".to_string(),
        }
    }
}

impl FrameNaming {
    /// The image name of a frame.
    ///
    /// Example:
    ///
    /// ```
    /// use kornia_colmap::source::FrameNaming;
    ///
    /// assert_eq!(FrameNaming::default().frame_name(1), "left_0001.jpg");
    /// ```
    pub fn frame_name(&self, index: u64) -> String {
        format!(
            "{}_{:0width$}.{}",
            self.prefix,
            index,
            self.extension,
            width = self.digits
        )
    }
}

/// Receives the frames persisted by a conversion, e.g. to write their images.
pub trait FrameSink {
    /// Called once per persisted frame with the image name of the record.
    fn write_frame(&mut self, name: &str, index: u64) -> Result<()>;
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn write_frame(&mut self, name: &str, index: u64) -> Result<()> {
        (**self).write_frame(name, index)
    }
}

/// A [`FrameSink`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFrameSink;

impl FrameSink for NoFrameSink {
    fn write_frame(&mut self, _name: &str, _index: u64) -> Result<()> {
        Ok(())
    }
}

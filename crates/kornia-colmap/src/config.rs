use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::database::MissingPosePolicy;
use crate::error::{ColmapError, Result};
use crate::source::FrameNaming;

/// Settings of a conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Path of the COLMAP database file
    pub database_path: PathBuf,
    /// Directory receiving the text model files
    pub output_dir: PathBuf,
    /// Points file copied into the text model, if any
    pub points_template: Option<PathBuf>,
    /// Naming of the frame images
    pub frame_naming: FrameNaming,
    /// Frames with a lower index are skipped
    pub start_frame: u64,
    /// Frames with a lower index are skipped when refreshing poses
    pub refresh_start_frame: u64,
    /// Only frames whose index is a multiple of the stride are kept
    pub frame_stride: u64,
    /// What to do with stored images missing a pose value on export
    pub missing_pose_policy: MissingPosePolicy,
    /// Log every converted pose
    pub verbose_poses: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database.db"),
            output_dir: PathBuf::from("."),
            points_template: None,
            frame_naming: FrameNaming::default(),
            // the first frame is only the tracking origin
            start_frame: 1,
            refresh_start_frame: 0,
            frame_stride: 1,
            missing_pose_policy: MissingPosePolicy::Fail,
            verbose_poses: false,
        }
    }
}

impl ConversionConfig {
    /// Load a configuration from a JSON file. Missing fields take their default.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.frame_stride == 0 {
            return Err(ColmapError::InvalidConfig(
                "frame_stride must be at least 1".to_string(),
            ));
        }
        if self.frame_naming.prefix.chars().any(char::is_whitespace)
            || self.frame_naming.extension.chars().any(char::is_whitespace)
        {
            return Err(ColmapError::InvalidConfig(
                "frame names cannot contain whitespace".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the database path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the output directory of the text model.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the points file copied into the text model.
    pub fn with_points_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.points_template = Some(path.into());
        self
    }

    /// Set the frame naming.
    pub fn with_frame_naming(mut self, naming: FrameNaming) -> Self {
        self.frame_naming = naming;
        self
    }

    /// Set the first frame kept.
    pub fn with_start_frame(mut self, start_frame: u64) -> Self {
        self.start_frame = start_frame;
        self
    }

    /// Set the first frame kept when refreshing poses.
    pub fn with_refresh_start_frame(mut self, start_frame: u64) -> Self {
        self.refresh_start_frame = start_frame;
        self
    }

    /// Set the frame stride.
    pub fn with_frame_stride(mut self, frame_stride: u64) -> Self {
        self.frame_stride = frame_stride;
        self
    }

    /// Set the policy for missing pose values on export.
    pub fn with_missing_pose_policy(mut self, policy: MissingPosePolicy) -> Self {
        self.missing_pose_policy = policy;
        self
    }

    /// Log every converted pose.
    pub fn with_verbose_poses(mut self, verbose: bool) -> Self {
        self.verbose_poses = verbose;
        self
    }

    /// Whether a frame index is kept by the start frame and stride.
    pub fn keeps_frame(&self, index: u64) -> bool {
        index >= self.start_frame && self.on_stride(index)
    }

    /// Whether a frame index is kept when refreshing the poses of existing images.
    pub fn keeps_refresh_frame(&self, index: u64) -> bool {
        index >= self.refresh_start_frame && self.on_stride(index)
    }

    fn on_stride(&self, index: u64) -> bool {
        index % self.frame_stride.max(1) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.database_path, PathBuf::from("database.db"));
        assert!(!config.keeps_frame(0));
        assert!(config.keeps_frame(1));
        assert!(config.keeps_refresh_frame(0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stride() {
        let config = ConversionConfig::default()
            .with_start_frame(0)
            .with_frame_stride(3);
        let kept = (0..10).filter(|&i| config.keeps_frame(i)).collect::<Vec<_>>();
        assert_eq!(kept, vec![0, 3, 6, 9]);
        assert!(config.with_frame_stride(0).validate().is_err());
    }

    #[test]
    fn test_from_json_partial() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "output_dir": "model", "missing_pose_policy": "fill_zero", "frame_naming": { "prefix": "right" } }"#,
        )?;
        let config = ConversionConfig::from_json_file(&path)?;
        assert_eq!(config.output_dir, PathBuf::from("model"));
        assert_eq!(config.missing_pose_policy, MissingPosePolicy::FillZero);
        assert_eq!(config.frame_naming.frame_name(3), "right_0003.jpg");
        assert_eq!(config.start_frame, 1);
        Ok(())
    }

    #[test]
    fn test_from_json_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "frame_stride": 0 }"#)?;
        assert!(matches!(
            ConversionConfig::from_json_file(&path),
            Err(ColmapError::InvalidConfig(_))
        ));
        Ok(())
    }
}

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Packed binary blobs for numeric parameter vectors.
pub mod blob;

/// The closed set of COLMAP camera models.
pub mod camera_model;

/// Conversion settings.
pub mod config;

/// Orchestration of the conversion modes.
///
/// See [`converter::Converter`] and [`converter::run_conversion`].
pub mod converter;

/// SQLite project store with COLMAP's schema.
pub mod database;

/// Error types for the crate.
pub mod error;

/// Rotation and rigid pose conversions between conventions.
pub mod pose;

/// Pose sources and frame naming.
pub mod source;

/// COLMAP text model reader and writer.
pub mod text;

mod types;

pub use camera_model::{CameraModel, CameraModelDescriptor};
pub use error::{ColmapError, Result};
pub use types::{ColmapCamera, ColmapImage, ColmapPoint3d};

use std::fmt;
use std::str::FromStr;

use crate::error::{ColmapError, Result};

/// Static description of a camera model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraModelDescriptor {
    /// Model id as stored in the database
    pub id: i32,
    /// Model name as written in the text model
    pub name: &'static str,
    /// Number of intrinsic parameters
    pub parameter_count: usize,
}

/// Represents a Colmap camera model.
///
/// The discriminants are the model ids used by COLMAP's database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CameraModel {
    /// Simple pinhole camera model: f, cx, cy
    SimplePinhole = 0,
    /// Pinhole camera model: fx, fy, cx, cy
    Pinhole = 1,
    /// Simple radial camera model: f, cx, cy, k
    SimpleRadial = 2,
    /// Radial camera model: f, cx, cy, k1, k2
    Radial = 3,
    /// OpenCV camera model: fx, fy, cx, cy, k1, k2, p1, p2
    OpenCV = 4,
    /// OpenCV fisheye camera model: fx, fy, cx, cy, k1, k2, k3, k4
    OpenCVFisheye = 5,
    /// Full OpenCV camera model: fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6
    FullOpenCV = 6,
    /// Field of view camera model: fx, fy, cx, cy, omega
    Fov = 7,
    /// Simple radial fisheye camera model: f, cx, cy, k
    SimpleRadialFisheye = 8,
    /// Radial fisheye camera model: f, cx, cy, k1, k2
    RadialFisheye = 9,
    /// Thin prism fisheye camera model: fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, sx1, sy1
    ThinPrismFisheye = 10,
}

impl CameraModel {
    /// All the supported models in id order.
    pub const ALL: [CameraModel; 11] = [
        CameraModel::SimplePinhole,
        CameraModel::Pinhole,
        CameraModel::SimpleRadial,
        CameraModel::Radial,
        CameraModel::OpenCV,
        CameraModel::OpenCVFisheye,
        CameraModel::FullOpenCV,
        CameraModel::Fov,
        CameraModel::SimpleRadialFisheye,
        CameraModel::RadialFisheye,
        CameraModel::ThinPrismFisheye,
    ];

    /// The model id stored in the database.
    pub const fn id(self) -> i32 {
        self as i32
    }

    /// The model name used in the text model.
    pub const fn name(self) -> &'static str {
        match self {
            CameraModel::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModel::Pinhole => "PINHOLE",
            CameraModel::SimpleRadial => "SIMPLE_RADIAL",
            CameraModel::Radial => "RADIAL",
            CameraModel::OpenCV => "OPENCV",
            CameraModel::OpenCVFisheye => "OPENCV_FISHEYE",
            CameraModel::FullOpenCV => "FULL_OPENCV",
            CameraModel::Fov => "FOV",
            CameraModel::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            CameraModel::RadialFisheye => "RADIAL_FISHEYE",
            CameraModel::ThinPrismFisheye => "THIN_PRISM_FISHEYE",
        }
    }

    /// The names of the intrinsic parameters, in storage order.
    pub const fn param_names(self) -> &'static [&'static str] {
        match self {
            CameraModel::SimplePinhole => &["f", "cx", "cy"],
            CameraModel::Pinhole => &["fx", "fy", "cx", "cy"],
            CameraModel::SimpleRadial | CameraModel::SimpleRadialFisheye => {
                &["f", "cx", "cy", "k"]
            }
            CameraModel::Radial | CameraModel::RadialFisheye => &["f", "cx", "cy", "k1", "k2"],
            CameraModel::OpenCV => &["fx", "fy", "cx", "cy", "k1", "k2", "p1", "p2"],
            CameraModel::OpenCVFisheye => &["fx", "fy", "cx", "cy", "k1", "k2", "k3", "k4"],
            CameraModel::FullOpenCV => &[
                "fx", "fy", "cx", "cy", "k1", "k2", "p1", "p2", "k3", "k4", "k5", "k6",
            ],
            CameraModel::Fov => &["fx", "fy", "cx", "cy", "omega"],
            CameraModel::ThinPrismFisheye => &[
                "fx", "fy", "cx", "cy", "k1", "k2", "p1", "p2", "k3", "k4", "sx1", "sy1",
            ],
        }
    }

    /// The number of intrinsic parameters of the model.
    pub const fn num_params(self) -> usize {
        self.param_names().len()
    }

    /// The static descriptor of the model.
    pub const fn descriptor(self) -> CameraModelDescriptor {
        CameraModelDescriptor {
            id: self.id(),
            name: self.name(),
            parameter_count: self.num_params(),
        }
    }

    /// Look up a model by its database id.
    pub fn from_id(id: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|model| i64::from(model.id()) == id)
            .ok_or_else(|| ColmapError::UnknownModel(format!("id {id}")))
    }

    /// Look up a model by its text model name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.name() == name)
            .ok_or_else(|| ColmapError::UnknownModel(name.to_string()))
    }

    /// Check that `params` has exactly the number of parameters of the model.
    pub fn validate_params(self, params: &[f64]) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(ColmapError::InvalidParameterCount {
                model: self.name(),
                expected: self.num_params(),
                got: params.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraModel {
    type Err = ColmapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

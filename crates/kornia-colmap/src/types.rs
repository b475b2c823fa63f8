use crate::camera_model::CameraModel;

/// Represents a camera in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapCamera {
    /// Camera id
    pub camera_id: u32,
    /// Camera model
    pub model: CameraModel,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// Camera parameters, as many as the model declares
    pub params: Vec<f64>,
}

/// Represents an image in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapImage {
    /// Image id
    pub image_id: u32,
    /// Image name
    pub name: String,
    /// Camera id
    pub camera_id: u32,
    /// Rotation
    pub qvec: [f64; 4], // qw, qx, qy, qz
    /// Translation
    pub tvec: [f64; 3], // x, y, z
    /// Points2d
    pub points2d: Vec<(f64, f64, i64)>,
}

/// Represents a 3D point in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapPoint3d {
    /// Point3d id
    pub point3d_id: u64,
    /// x, y, z coordinates
    pub xyz: [f64; 3],
    /// rgb color
    pub rgb: [u8; 3],
    /// Error
    pub error: f64,
    /// Track
    pub track: Vec<(u32, u32)>,
}

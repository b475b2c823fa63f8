use serde::{Deserialize, Serialize};

use crate::error::{ColmapError, Result};

// tolerance to accept a matrix as a rotation
const ROTATION_TOLERANCE: f64 = 1e-6;

/// A rigid pose of the camera in the world frame (world-from-camera).
///
/// This is the convention produced by tracking devices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation matrix, row major
    pub rotation: [[f64; 3]; 3],
    /// Translation vector
    pub translation: [f64; 3],
}

/// A rigid pose in the convention stored by COLMAP (camera-from-world).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorePose {
    /// Unit quaternion as qw, qx, qy, qz
    pub qvec: [f64; 4],
    /// Translation vector
    pub tvec: [f64; 3],
}

impl Pose {
    /// The identity pose.
    pub const IDENTITY: Self = Self {
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
    };

    /// Convert the device pose into the pose stored by COLMAP.
    ///
    /// The rigid transform is inverted and the rotation expressed as a quaternion.
    pub fn to_store_pose(&self) -> Result<StorePose> {
        let (cam_r_world, cam_t_world) =
            world_pose_to_store_pose(&self.rotation, &self.translation);
        Ok(StorePose {
            qvec: rotation_to_quaternion(&cam_r_world)?,
            tvec: cam_t_world,
        })
    }
}

impl StorePose {
    /// Convert the stored pose back into a device pose.
    pub fn to_pose(&self) -> Pose {
        let cam_r_world = quaternion_to_rotation(&self.qvec);
        let (rotation, translation) = store_pose_to_world_pose(&cam_r_world, &self.tvec);
        Pose {
            rotation,
            translation,
        }
    }
}

/// Check that a matrix is a proper rotation: finite, orthonormal and with positive determinant.
pub fn check_rotation(rotation: &[[f64; 3]; 3]) -> Result<()> {
    if rotation.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ColmapError::DegeneratePose(
            "rotation has non finite entries".to_string(),
        ));
    }

    // R^T * R must be the identity
    for i in 0..3 {
        for j in 0..3 {
            let dot = (0..3).map(|k| rotation[k][i] * rotation[k][j]).sum::<f64>();
            let expected = if i == j { 1.0 } else { 0.0 };
            if (dot - expected).abs() > ROTATION_TOLERANCE {
                return Err(ColmapError::DegeneratePose(format!(
                    "rotation columns are not orthonormal: <c{i}, c{j}> = {dot}"
                )));
            }
        }
    }

    let det = determinant(rotation);
    if det <= 0.0 {
        return Err(ColmapError::DegeneratePose(format!(
            "rotation is a reflection, det = {det}"
        )));
    }

    Ok(())
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Convert a rotation matrix into a unit quaternion.
///
/// # Arguments
///
/// * `rotation` - A proper rotation matrix, row major.
///
/// # Returns
///
/// The quaternion as `[qw, qx, qy, qz]`, normalized and with `qw >= 0`.
///
/// The largest of the trace and the diagonal elements selects the branch, so
/// rotations of 180 degrees are handled without dividing by a vanishing `qw`.
///
/// Example:
///
/// ```
/// use kornia_colmap::pose::rotation_to_quaternion;
///
/// let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// assert_eq!(rotation_to_quaternion(&identity).unwrap(), [1.0, 0.0, 0.0, 0.0]);
/// ```
pub fn rotation_to_quaternion(rotation: &[[f64; 3]; 3]) -> Result<[f64; 4]> {
    check_rotation(rotation)?;

    let m = rotation;
    let trace = m[0][0] + m[1][1] + m[2][2];

    let q = if trace > 0.0 {
        let w = 0.5 * (1.0 + trace).sqrt();
        let s = 4.0 * w;
        [
            w,
            (m[2][1] - m[1][2]) / s,
            (m[0][2] - m[2][0]) / s,
            (m[1][0] - m[0][1]) / s,
        ]
    } else if m[0][0] >= m[1][1] && m[0][0] >= m[2][2] {
        let x = 0.5 * (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt();
        let s = 4.0 * x;
        [
            (m[2][1] - m[1][2]) / s,
            x,
            (m[0][1] + m[1][0]) / s,
            (m[0][2] + m[2][0]) / s,
        ]
    } else if m[1][1] >= m[2][2] {
        let y = 0.5 * (1.0 - m[0][0] + m[1][1] - m[2][2]).sqrt();
        let s = 4.0 * y;
        [
            (m[0][2] - m[2][0]) / s,
            (m[0][1] + m[1][0]) / s,
            y,
            (m[1][2] + m[2][1]) / s,
        ]
    } else {
        let z = 0.5 * (1.0 - m[0][0] - m[1][1] + m[2][2]).sqrt();
        let s = 4.0 * z;
        [
            (m[1][0] - m[0][1]) / s,
            (m[0][2] + m[2][0]) / s,
            (m[1][2] + m[2][1]) / s,
            z,
        ]
    };

    Ok(canonicalize_quaternion(&q))
}

/// Normalize a quaternion and flip its sign so that `qw >= 0`.
pub fn canonicalize_quaternion(q: &[f64; 4]) -> [f64; 4] {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    let sign = if q[0] < 0.0 { -1.0 } else { 1.0 };
    q.map(|v| sign * v / norm)
}

/// Convert a quaternion `[qw, qx, qy, qz]` into a rotation matrix.
///
/// The quaternion is normalized first.
pub fn quaternion_to_rotation(qvec: &[f64; 4]) -> [[f64; 3]; 3] {
    let norm = qvec.iter().map(|v| v * v).sum::<f64>().sqrt();
    let [w, x, y, z] = qvec.map(|v| v / norm);

    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ]
}

/// Invert a rigid transform.
///
/// # Arguments
///
/// * `dst_r_src` - The rotation of the transform.
/// * `dst_t_src` - The translation of the transform.
///
/// # Returns
///
/// The inverse transform `(R^T, -R^T * t)`.
pub fn invert_rigid_transform(
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
) -> ([[f64; 3]; 3], [f64; 3]) {
    let dst_r_src_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| dst_r_src[i][j]);
    let dst_t_src_col = faer::col![dst_t_src[0], dst_t_src[1], dst_t_src[2]];

    // R' = R^T
    let src_r_dst = dst_r_src_mat.transpose();
    // t' = -R^T * t
    let src_t_dst = -src_r_dst * dst_t_src_col;

    let mut rotation_inv = [[0.0; 3]; 3];
    for (i, row) in rotation_inv.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = src_r_dst.read(i, j);
        }
    }
    let mut translation_inv = [0.0; 3];
    for (i, val) in translation_inv.iter_mut().enumerate() {
        *val = src_t_dst.read(i);
    }

    (rotation_inv, translation_inv)
}

/// Convert a camera pose in the world frame into the world pose in the camera frame.
///
/// PRECONDITION: `world_r_cam` is orthonormal. The returned rotation is then
/// orthonormal as well.
pub fn world_pose_to_store_pose(
    world_r_cam: &[[f64; 3]; 3],
    world_t_cam: &[f64; 3],
) -> ([[f64; 3]; 3], [f64; 3]) {
    invert_rigid_transform(world_r_cam, world_t_cam)
}

/// Inverse of [`world_pose_to_store_pose`].
pub fn store_pose_to_world_pose(
    cam_r_world: &[[f64; 3]; 3],
    cam_t_world: &[f64; 3],
) -> ([[f64; 3]; 3], [f64; 3]) {
    invert_rigid_transform(cam_r_world, cam_t_world)
}

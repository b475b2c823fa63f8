use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::blob::{decode_params, encode_params};
use crate::camera_model::CameraModel;
use crate::error::{ColmapError, Result};
use crate::types::{ColmapCamera, ColmapImage};

/// The tables of a COLMAP database.
///
/// The feature tables are not written by this crate but COLMAP expects them
/// to exist when it opens the project.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cameras (
    camera_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    model INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    params BLOB,
    prior_focal_length INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS images (
    image_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    camera_id INTEGER NOT NULL,
    prior_qw REAL,
    prior_qx REAL,
    prior_qy REAL,
    prior_qz REAL,
    prior_tx REAL,
    prior_ty REAL,
    prior_tz REAL,
    CONSTRAINT image_id_check CHECK(image_id >= 0 and image_id < 2147483647),
    FOREIGN KEY(camera_id) REFERENCES cameras(camera_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS index_name ON images(name);

CREATE TABLE IF NOT EXISTS keypoints (
    image_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    FOREIGN KEY(image_id) REFERENCES images(image_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS descriptors (
    image_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    FOREIGN KEY(image_id) REFERENCES images(image_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS matches (
    pair_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB
);

CREATE TABLE IF NOT EXISTS two_view_geometries (
    pair_id INTEGER PRIMARY KEY NOT NULL,
    rows INTEGER NOT NULL,
    cols INTEGER NOT NULL,
    data BLOB,
    config INTEGER NOT NULL,
    F BLOB,
    E BLOB,
    H BLOB,
    qvec BLOB,
    tvec BLOB
);
"#;

const POSE_COLUMNS: [&str; 7] = [
    "prior_qw", "prior_qx", "prior_qy", "prior_qz", "prior_tx", "prior_ty", "prior_tz",
];

/// What to do with a stored image whose pose columns are NULL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPosePolicy {
    /// Fail with [`ColmapError::MissingField`].
    #[default]
    Fail,
    /// Replace the missing value by zero.
    FillZero,
}

type CameraRow = (u32, i64, u32, u32, Option<Vec<u8>>);
type ImageRow = (u32, String, u32, [Option<f64>; 7]);

/// A session on a COLMAP database file.
///
/// All the mutations run inside a transaction that is only made durable by
/// [`ColmapDatabase::commit`]. Closing or dropping the store without
/// committing discards them.
pub struct ColmapDatabase {
    conn: Option<Connection>,
    dirty: bool,
}

impl ColmapDatabase {
    /// Open or create a database file and make sure the tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Opening COLMAP database {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a database living only in memory.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // image to camera references are checked here, not by sqlite
        conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn: Some(conn),
            dirty: false,
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(ColmapError::ClosedStore)
    }

    fn conn_mut(&mut self) -> Result<&Connection> {
        let conn = self.conn.as_ref().ok_or(ColmapError::ClosedStore)?;
        self.dirty = true;
        Ok(conn)
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Whether there are mutations not yet committed.
    pub fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    fn camera_exists(&self, camera_id: u32) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM cameras WHERE camera_id = ?1",
                params![camera_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Add a camera and return its new id.
    ///
    /// # Arguments
    ///
    /// * `model` - The camera model.
    /// * `width` - The image width in pixels.
    /// * `height` - The image height in pixels.
    /// * `params` - The intrinsic parameters, as many as the model declares.
    /// * `prior_focal_length` - Whether the focal length comes from a trusted calibration.
    pub fn add_camera(
        &mut self,
        model: CameraModel,
        width: u32,
        height: u32,
        params: &[f64],
        prior_focal_length: bool,
    ) -> Result<u32> {
        model.validate_params(params)?;
        if width == 0 || height == 0 {
            return Err(ColmapError::InvalidCameraSize { width, height });
        }

        let conn = self.conn_mut()?;
        conn.execute(
            "INSERT INTO cameras (model, width, height, params, prior_focal_length) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                model.id(),
                width,
                height,
                encode_params(params),
                prior_focal_length
            ],
        )?;
        let camera_id = row_id(conn.last_insert_rowid())?;
        log::debug!("Added camera {camera_id} ({model} {width}x{height})");
        Ok(camera_id)
    }

    /// Add an image and return its new id.
    ///
    /// The camera must exist and the name must not be used by another image.
    pub fn add_image(
        &mut self,
        name: &str,
        camera_id: u32,
        qvec: &[f64; 4],
        tvec: &[f64; 3],
    ) -> Result<u32> {
        if !self.camera_exists(camera_id)? {
            return Err(ColmapError::ForeignKey { camera_id });
        }
        if self.has_image(name)? {
            return Err(ColmapError::DuplicateName(name.to_string()));
        }

        let conn = self.conn_mut()?;
        conn.execute(
            "INSERT INTO images (name, camera_id, prior_qw, prior_qx, prior_qy, prior_qz, \
             prior_tx, prior_ty, prior_tz) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                name, camera_id, qvec[0], qvec[1], qvec[2], qvec[3], tvec[0], tvec[1], tvec[2]
            ],
        )?;
        row_id(conn.last_insert_rowid())
    }

    /// Replace the pose of the image with the given name.
    pub fn update_image_pose(&mut self, name: &str, qvec: &[f64; 4], tvec: &[f64; 3]) -> Result<()> {
        let updated = self.conn_mut()?.execute(
            "UPDATE images SET prior_qw = ?1, prior_qx = ?2, prior_qy = ?3, prior_qz = ?4, \
             prior_tx = ?5, prior_ty = ?6, prior_tz = ?7 WHERE name = ?8",
            params![qvec[0], qvec[1], qvec[2], qvec[3], tvec[0], tvec[1], tvec[2], name],
        )?;
        if updated == 0 {
            return Err(ColmapError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Make every image reference the given camera.
    pub fn reassign_all_images_to_camera(&mut self, camera_id: u32) -> Result<usize> {
        if !self.camera_exists(camera_id)? {
            return Err(ColmapError::ForeignKey { camera_id });
        }
        let updated = self
            .conn_mut()?
            .execute("UPDATE images SET camera_id = ?1", params![camera_id])?;
        Ok(updated)
    }

    /// Delete every camera.
    ///
    /// Images are left pointing to the deleted cameras until
    /// [`ColmapDatabase::reassign_all_images_to_camera`] is called in the same
    /// transaction. Prefer [`ColmapDatabase::replace_cameras`].
    pub fn delete_all_cameras(&mut self) -> Result<usize> {
        let deleted = self.conn_mut()?.execute("DELETE FROM cameras", [])?;
        Ok(deleted)
    }

    /// Replace all the cameras by a single new one used by every image.
    ///
    /// The deletion, insertion and reassignment happen under one savepoint:
    /// either all of them are applied or none.
    pub fn replace_cameras(
        &mut self,
        model: CameraModel,
        width: u32,
        height: u32,
        params: &[f64],
        prior_focal_length: bool,
    ) -> Result<u32> {
        self.conn_mut()?.execute_batch("SAVEPOINT replace_cameras")?;

        let result = (|| -> Result<u32> {
            let deleted = self.delete_all_cameras()?;
            let camera_id = self.add_camera(model, width, height, params, prior_focal_length)?;
            let reassigned = self.reassign_all_images_to_camera(camera_id)?;
            log::info!(
                "Replaced {deleted} camera(s) by camera {camera_id}, {reassigned} image(s) reassigned"
            );
            Ok(camera_id)
        })();

        let conn = self.conn()?;
        if result.is_err() {
            conn.execute_batch("ROLLBACK TO replace_cameras")?;
        }
        conn.execute_batch("RELEASE replace_cameras")?;
        result
    }

    /// Get a camera by id.
    pub fn camera(&self, camera_id: u32) -> Result<Option<ColmapCamera>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT camera_id, model, width, height, params FROM cameras WHERE camera_id = ?1",
                params![camera_id],
                camera_row,
            )
            .optional()?;
        row.map(camera_from_row).transpose()
    }

    /// All the cameras ordered by id.
    pub fn list_cameras(&self) -> Result<Vec<ColmapCamera>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT camera_id, model, width, height, params FROM cameras ORDER BY camera_id",
        )?;
        let rows = stmt
            .query_map([], camera_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(camera_from_row).collect()
    }

    /// All the images ordered by id, failing on missing pose values.
    pub fn list_images(&self) -> Result<Vec<ColmapImage>> {
        self.list_images_with(MissingPosePolicy::Fail)
    }

    /// All the images ordered by id.
    ///
    /// # Arguments
    ///
    /// * `policy` - What to do with NULL pose columns.
    pub fn list_images_with(&self, policy: MissingPosePolicy) -> Result<Vec<ColmapImage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT image_id, name, camera_id, prior_qw, prior_qx, prior_qy, prior_qz, \
             prior_tx, prior_ty, prior_tz FROM images ORDER BY image_id",
        )?;
        let rows = stmt
            .query_map([], image_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|row| image_from_row(row, policy))
            .collect()
    }

    /// Get an image by name.
    pub fn image_by_name(&self, name: &str) -> Result<Option<ColmapImage>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT image_id, name, camera_id, prior_qw, prior_qx, prior_qy, prior_qz, \
                 prior_tx, prior_ty, prior_tz FROM images WHERE name = ?1",
                params![name],
                image_row,
            )
            .optional()?;
        row.map(|row| image_from_row(row, MissingPosePolicy::Fail))
            .transpose()
    }

    /// Whether an image with this name exists.
    pub fn has_image(&self, name: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM images WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of cameras.
    pub fn num_cameras(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM cameras", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of images.
    pub fn num_images(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Make the pending mutations durable and start a new transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.conn()?.execute_batch("COMMIT; BEGIN")?;
        self.dirty = false;
        Ok(())
    }

    /// Discard the pending mutations and start a new transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.conn()?.execute_batch("ROLLBACK; BEGIN")?;
        self.dirty = false;
        Ok(())
    }

    /// Release the database. Uncommitted mutations are discarded.
    pub fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(ColmapError::ClosedStore)?;
        if self.dirty {
            log::warn!("Closing COLMAP database with uncommitted changes, rolling back");
            self.dirty = false;
        }
        conn.execute_batch("ROLLBACK")?;
        conn.close().map_err(|(_, err)| ColmapError::Sqlite(err))
    }
}

impl Drop for ColmapDatabase {
    fn drop(&mut self) {
        if self.conn.is_some() && self.dirty {
            // sqlite rolls back the open transaction when the connection closes
            log::warn!("Dropping COLMAP database with uncommitted changes, rolling back");
        }
    }
}

fn row_id(rowid: i64) -> Result<u32> {
    u32::try_from(rowid)
        .map_err(|_| ColmapError::Sqlite(rusqlite::Error::IntegralValueOutOfRange(0, rowid)))
}

fn camera_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CameraRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn camera_from_row((camera_id, model_id, width, height, blob): CameraRow) -> Result<ColmapCamera> {
    let model = CameraModel::from_id(model_id)?;
    let params = decode_params(blob.as_deref().unwrap_or_default())?;
    model.validate_params(&params)?;
    Ok(ColmapCamera {
        camera_id,
        model,
        width,
        height,
        params,
    })
}

fn image_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRow> {
    let mut pose = [None; 7];
    for (i, value) in pose.iter_mut().enumerate() {
        *value = row.get(3 + i)?;
    }
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, pose))
}

fn image_from_row(
    (image_id, name, camera_id, pose): ImageRow,
    policy: MissingPosePolicy,
) -> Result<ColmapImage> {
    let mut values = [0.0; 7];
    for ((value, column), field) in values.iter_mut().zip(pose).zip(POSE_COLUMNS) {
        *value = match (column, policy) {
            (Some(v), _) => v,
            (None, MissingPosePolicy::FillZero) => {
                log::warn!("Image {image_id} ({name}) has no {field}, using 0");
                0.0
            }
            (None, MissingPosePolicy::Fail) => {
                return Err(ColmapError::MissingField { image_id, field });
            }
        };
    }

    Ok(ColmapImage {
        image_id,
        name,
        camera_id,
        qvec: [values[0], values[1], values[2], values[3]],
        tvec: [values[4], values[5], values[6]],
        points2d: Vec::new(),
    })
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ColmapError>;

/// Error types for the COLMAP module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ColmapError {
    /// The camera model id or name is not one of the supported models.
    #[error("Unknown camera model: {0}")]
    UnknownModel(String),

    /// The parameter vector does not match the model's declared length.
    #[error("Invalid number of camera parameters for {model}: expected {expected}, got {got}")]
    InvalidParameterCount {
        /// Model name
        model: &'static str,
        /// Number of parameters declared by the model
        expected: usize,
        /// Number of parameters provided
        got: usize,
    },

    /// The camera width or height is zero.
    #[error("Invalid camera size {width}x{height}")]
    InvalidCameraSize {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// The blob length is not a multiple of the element size.
    #[error("Invalid blob of {len} bytes for elements of {elem_size} bytes")]
    Codec {
        /// Blob length in bytes
        len: usize,
        /// Element size in bytes
        elem_size: usize,
    },

    /// An image references a camera that does not exist.
    #[error("Camera with id {camera_id} does not exist")]
    ForeignKey {
        /// The missing camera id
        camera_id: u32,
    },

    /// An image with the same name already exists.
    #[error("Image with name {0} already exists")]
    DuplicateName(String),

    /// No image with the given name exists.
    #[error("Image with name {0} not found")]
    NotFound(String),

    /// A pose column of a stored image is NULL.
    #[error("Image {image_id} has no value for {field}")]
    MissingField {
        /// Image id
        image_id: u32,
        /// Column name
        field: &'static str,
    },

    /// Malformed line in a text model file.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The image name cannot be written to the text model.
    #[error("Image name {0:?} contains whitespace")]
    InvalidImageName(String),

    /// The store was closed.
    #[error("The project store is closed")]
    ClosedStore,

    /// The pose source failed or produced an inconsistent frame.
    #[error("Pose source error: {0}")]
    PoseSource(String),

    /// The rotation is not a proper rotation matrix.
    #[error("Degenerate pose: {0}")]
    DegeneratePose(String),

    /// Invalid conversion configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error reading or writing a file.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// Error from the SQLite engine.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Error (de)serializing JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

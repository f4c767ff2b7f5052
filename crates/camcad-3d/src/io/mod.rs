mod camera;
mod points;
mod pose;

pub use camera::read_pinhole_json;
pub use points::{parse_points_json, read_points_json};
pub use pose::{
    parse_pose_json, read_pose_json, read_transform_pose_json, transform_pose_json, PoseFile,
};

use crate::camera::CameraError;

/// Error types for the readers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IoError {
    /// Failed to read the file
    #[error("Failed to read file")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or has the wrong shape
    #[error("Failed to parse JSON document")]
    Json(#[from] serde_json::Error),

    /// The document has no `points` section
    #[error("Missing `points` section")]
    MissingPoints,

    /// The document has no usable `pose` section
    #[error("Invalid `pose` section: expected 6 finite values, got {0}")]
    InvalidPose(usize),

    /// The intrinsics are not a valid camera
    #[error(transparent)]
    Camera(#[from] CameraError),
}

use camcad_3d::io::IoError;
use camcad_3d::CameraError;

/// Errors raised while setting up a registration.
///
/// Once constructed, a registration never fails: degenerate iterations and
/// divergence are reported through [`crate::RegistrationState`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistrationError {
    /// The CAD point cloud has no points
    #[error("CAD point cloud is empty")]
    EmptyCadCloud,

    /// The observed point cloud has no points
    #[error("Observed point cloud is empty")]
    EmptyObservedCloud,

    /// A solver option is out of range
    #[error("Invalid solver options: {0}")]
    InvalidOptions(String),

    /// The camera model is not usable
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Failed to load a configuration file
    #[error(transparent)]
    Io(#[from] IoError),
}

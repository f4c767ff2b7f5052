#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Camera projection models.
pub mod camera;

/// Readers for point lists, poses and camera intrinsics.
pub mod io;

/// Operations on point sets: projection, densification, scaling and back-projection.
pub mod ops;

/// Point types and the point cloud container.
pub mod pointcloud;

pub use camera::{CameraError, CameraModel, PinholeCamera};
pub use pointcloud::{Point2D, Point3D, PointCloud};

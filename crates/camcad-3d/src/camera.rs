use std::path::Path;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::io::IoError;
use crate::pointcloud::{Point2D, Point3D};

/// Points closer than this to the image plane do not project.
const MIN_DEPTH: f64 = 1e-9;

/// Error types for camera models.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CameraError {
    /// A focal length is zero, negative or not finite.
    #[error("Invalid focal length (fx: {fx}, fy: {fy})")]
    InvalidFocalLength {
        /// Focal length in x.
        fx: f64,
        /// Focal length in y.
        fy: f64,
    },

    /// The principal point is not finite.
    #[error("Invalid principal point (cx: {cx}, cy: {cy})")]
    InvalidPrincipalPoint {
        /// Principal point x coordinate.
        cx: f64,
        /// Principal point y coordinate.
        cy: f64,
    },

    /// The image has a zero dimension.
    #[error("Invalid image size {width}x{height}")]
    InvalidImageSize {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// The intrinsics matrix does not have the pinhole form.
    #[error("Intrinsics matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]")]
    InvalidIntrinsicsMatrix,
}

/// A camera projection model, treated as an opaque function by the registration loop.
///
/// Implementations must be pure: the same point always yields the same pixel,
/// so a model can be shared by concurrent registration runs.
pub trait CameraModel: Send + Sync {
    /// Project a point expressed in the camera frame to a pixel.
    ///
    /// Returns `None` for points behind the camera or outside the valid domain
    /// of the model.
    fn project(&self, point: &Point3D) -> Option<Point2D>;

    /// Unit direction of the camera ray through a pixel.
    fn back_project(&self, pixel: &Point2D) -> Option<DVec3>;

    /// Jacobian of [`CameraModel::project`] with respect to the camera-frame point.
    ///
    /// Returns the two rows `[du/dp, dv/dp]`. The default uses central
    /// differences; models with a closed form should override it.
    fn project_jacobian(&self, point: &Point3D) -> Option<[DVec3; 2]> {
        let h = 1e-6 * point.abs().max_element().max(1.0);
        let mut rows = [DVec3::ZERO; 2];

        for axis in 0..3 {
            let mut step = DVec3::ZERO;
            step[axis] = h;
            let plus = self.project(&(*point + step))?;
            let minus = self.project(&(*point - step))?;
            let d = (plus - minus) / (2.0 * h);
            rows[0][axis] = d.x;
            rows[1][axis] = d.y;
        }

        Some(rows)
    }

    /// Check that the model is fully configured.
    fn validate(&self) -> Result<(), CameraError> {
        Ok(())
    }
}

/// An ideal pinhole camera without distortion.
///
/// When the image size is known, projections falling outside the image are
/// rejected as out of the field of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x coordinate (pixels).
    pub cx: f64,
    /// Principal point y coordinate (pixels).
    pub cy: f64,
    /// Image width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Image height in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl PinholeCamera {
    /// Create a pinhole camera with an unbounded image plane.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, CameraError> {
        let camera = Self {
            fx,
            fy,
            cx,
            cy,
            width: None,
            height: None,
        };
        camera.validate()?;
        Ok(camera)
    }

    /// Restrict projections to a `width` x `height` image.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Result<Self, CameraError> {
        self.width = Some(width);
        self.height = Some(height);
        self.validate()?;
        Ok(self)
    }

    /// Create a pinhole camera from a 3x3 intrinsics matrix (column major).
    pub fn from_matrix(k: &DMat3) -> Result<Self, CameraError> {
        let is_pinhole = k.y_axis.x == 0.0
            && k.x_axis.y == 0.0
            && k.x_axis.z == 0.0
            && k.y_axis.z == 0.0
            && k.z_axis.z == 1.0;
        if !is_pinhole {
            return Err(CameraError::InvalidIntrinsicsMatrix);
        }
        Self::new(k.x_axis.x, k.y_axis.y, k.z_axis.x, k.z_axis.y)
    }

    /// Load the intrinsics from a JSON file `{fx, fy, cx, cy, width?, height?}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IoError> {
        crate::io::read_pinhole_json(path)
    }

    /// The 3x3 intrinsics matrix.
    pub fn camera_matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.fx, 0.0, 0.0),
            DVec3::new(0.0, self.fy, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    fn in_image(&self, pixel: &Point2D) -> bool {
        match (self.width, self.height) {
            (Some(w), Some(h)) => {
                pixel.x >= 0.0 && pixel.y >= 0.0 && pixel.x < w as f64 && pixel.y < h as f64
            }
            _ => true,
        }
    }
}

impl CameraModel for PinholeCamera {
    fn project(&self, point: &Point3D) -> Option<Point2D> {
        if point.z.is_nan() || point.z <= MIN_DEPTH {
            return None;
        }
        let pixel = Point2D::new(
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        );
        if !pixel.is_finite() || !self.in_image(&pixel) {
            return None;
        }
        Some(pixel)
    }

    fn back_project(&self, pixel: &Point2D) -> Option<DVec3> {
        let ray = DVec3::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy, 1.0);
        ray.try_normalize()
    }

    fn project_jacobian(&self, point: &Point3D) -> Option<[DVec3; 2]> {
        if point.z.is_nan() || point.z <= MIN_DEPTH {
            return None;
        }
        let inv_z = 1.0 / point.z;
        let inv_z2 = inv_z * inv_z;
        Some([
            DVec3::new(self.fx * inv_z, 0.0, -self.fx * point.x * inv_z2),
            DVec3::new(0.0, self.fy * inv_z, -self.fy * point.y * inv_z2),
        ])
    }

    fn validate(&self) -> Result<(), CameraError> {
        let valid_focal = |f: f64| f.is_finite() && f > 0.0;
        if !valid_focal(self.fx) || !valid_focal(self.fy) {
            return Err(CameraError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(CameraError::InvalidPrincipalPoint {
                cx: self.cx,
                cy: self.cy,
            });
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            if width == 0 || height == 0 {
                return Err(CameraError::InvalidImageSize { width, height });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Numeric(PinholeCamera);

    impl CameraModel for Numeric {
        fn project(&self, point: &Point3D) -> Option<Point2D> {
            self.0.project(point)
        }

        fn back_project(&self, pixel: &Point2D) -> Option<DVec3> {
            self.0.back_project(pixel)
        }
    }

    #[test]
    fn test_project_center() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?;
        let pixel = camera.project(&Point3D::new(0.0, 0.0, 5.0));
        assert_eq!(pixel, Some(Point2D::new(320.0, 240.0)));

        let pixel = camera.project(&Point3D::new(1.0, -1.0, 5.0));
        assert_eq!(pixel, Some(Point2D::new(420.0, 140.0)));
        Ok(())
    }

    #[test]
    fn test_project_behind_camera() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?;
        assert!(camera.project(&Point3D::new(0.0, 0.0, -1.0)).is_none());
        assert!(camera.project(&Point3D::new(1.0, 0.0, 0.0)).is_none());
        assert!(camera.project(&Point3D::new(0.0, 0.0, f64::NAN)).is_none());
        Ok(())
    }

    #[test]
    fn test_project_outside_image() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?.with_image_size(640, 480)?;
        assert!(camera.project(&Point3D::new(0.0, 0.0, 1.0)).is_some());
        assert!(camera.project(&Point3D::new(10.0, 0.0, 1.0)).is_none());
        assert!(camera.project(&Point3D::new(0.0, -10.0, 1.0)).is_none());
        Ok(())
    }

    #[test]
    fn test_back_project_is_unit_ray() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(400.0, 420.0, 300.0, 200.0)?;
        let p = Point3D::new(0.3, -0.2, 2.0);
        let pixel = camera.project(&p).ok_or(CameraError::InvalidIntrinsicsMatrix)?;
        let ray = camera
            .back_project(&pixel)
            .ok_or(CameraError::InvalidIntrinsicsMatrix)?;
        assert_relative_eq!(ray.length(), 1.0, epsilon = 1e-12);
        let expected = p.normalize();
        assert_relative_eq!(ray.x, expected.x, epsilon = 1e-12);
        assert_relative_eq!(ray.y, expected.y, epsilon = 1e-12);
        assert_relative_eq!(ray.z, expected.z, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_analytic_jacobian_matches_numeric() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(800.0, 780.0, 640.0, 480.0)?;
        let numeric = Numeric(camera);
        let p = Point3D::new(0.4, -0.7, 3.2);

        let analytic = camera.project_jacobian(&p).ok_or(CameraError::InvalidIntrinsicsMatrix)?;
        let approx = numeric.project_jacobian(&p).ok_or(CameraError::InvalidIntrinsicsMatrix)?;
        for (a, n) in analytic.iter().zip(approx.iter()) {
            assert_relative_eq!(a.x, n.x, epsilon = 1e-5);
            assert_relative_eq!(a.y, n.y, epsilon = 1e-5);
            assert_relative_eq!(a.z, n.z, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_intrinsics() {
        assert!(matches!(
            PinholeCamera::new(0.0, 500.0, 0.0, 0.0),
            Err(CameraError::InvalidFocalLength { .. })
        ));
        assert!(matches!(
            PinholeCamera::new(500.0, 500.0, f64::INFINITY, 0.0),
            Err(CameraError::InvalidPrincipalPoint { .. })
        ));
        let camera = PinholeCamera::new(500.0, 500.0, 0.0, 0.0).map(|c| c.with_image_size(0, 480));
        assert!(matches!(
            camera,
            Ok(Err(CameraError::InvalidImageSize { .. }))
        ));
    }

    #[test]
    fn test_camera_matrix_roundtrip() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 510.0, 320.0, 240.0)?;
        let k = camera.camera_matrix();
        assert_eq!(PinholeCamera::from_matrix(&k)?, camera);

        let mut skewed = k;
        skewed.y_axis.x = 1.0;
        assert_eq!(
            PinholeCamera::from_matrix(&skewed),
            Err(CameraError::InvalidIntrinsicsMatrix)
        );
        Ok(())
    }
}

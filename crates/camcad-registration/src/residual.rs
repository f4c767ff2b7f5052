use camcad_3d::ops::ProjectedCloud;
use camcad_3d::{CameraModel, Point2D, Point3D};
use camcad_lie::Pose;
use camcad_optim::{Factor, Linearization};

use crate::correspondence::Correspondence;

/// A CAD point paired with the pixel it was matched to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualTerm {
    /// Point in CAD coordinates.
    pub cad_point: Point3D,
    /// Observed pixel matched to its projection.
    pub observed_pixel: Point2D,
}

/// Turn the correspondences of one outer iteration into residual terms.
///
/// `projected` must be the projection the correspondences were computed on;
/// its source indices map matches back to `cad`.
pub fn build_residuals(
    cad: &[Point3D],
    observed: &[Point2D],
    projected: &ProjectedCloud,
    correspondences: &[Correspondence],
) -> Vec<ResidualTerm> {
    correspondences
        .iter()
        .filter_map(|c| {
            let cad_index = *projected.source_indices.get(c.source_index)?;
            Some(ResidualTerm {
                cad_point: *cad.get(cad_index)?,
                observed_pixel: *observed.get(c.target_index)?,
            })
        })
        .collect()
}

/// Reprojection error `project(pose * cad_point) - observed_pixel`.
pub struct ReprojectionFactor<'a, C: CameraModel + ?Sized> {
    term: ResidualTerm,
    camera: &'a C,
}

impl<'a, C: CameraModel + ?Sized> ReprojectionFactor<'a, C> {
    /// Create a factor for one residual term.
    pub fn new(term: ResidualTerm, camera: &'a C) -> Self {
        Self { term, camera }
    }

    /// The residual term.
    pub fn term(&self) -> &ResidualTerm {
        &self.term
    }
}

impl<C: CameraModel + ?Sized> Factor for ReprojectionFactor<'_, C> {
    fn linearize(&self, pose: &Pose, compute_jacobian: bool) -> Option<Linearization> {
        let point_cam = pose.transform_point(self.term.cad_point);
        let pixel = self.camera.project(&point_cam)?;
        let residual = pixel - self.term.observed_pixel;

        if !compute_jacobian {
            return Some(Linearization {
                residual,
                jacobian: None,
            });
        }

        // J = J_proj * [-(R p)^ | I] for the left perturbation
        let rotated = point_cam - pose.translation;
        let jacobian = self.camera.project_jacobian(&point_cam).map(|rows| {
            rows.map(|a| {
                let r = rotated.cross(a);
                [r.x, r.y, r.z, a.x, a.y, a.z]
            })
        });

        Some(Linearization { residual, jacobian })
    }
}

use camcad_3d::ops::project_cloud;
use camcad_3d::{CameraModel, Point3D};
use camcad_lie::Pose;

use crate::correspondence::{Correspondence, CorrespondenceEstimator};
use crate::options::{AlignmentOffset, ErrorMetric, SolverOptions};

/// Alignment quality of a pose, measured on a fresh association.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceReport {
    /// Configured metric over the matched pixel distances. `None` without matches.
    pub error: Option<f64>,
    /// Mean matched pixel distance. `None` without matches.
    pub mean_error: Option<f64>,
    /// Number of projected points that projected.
    pub num_projected: usize,
    /// Number of matched pairs the error was computed on.
    pub num_correspondences: usize,
    /// Whether the error is at or below the threshold.
    pub converged: bool,
}

/// Decides whether a pose aligns the CAD cloud with the observed pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceChecker {
    /// Converged when the error is at or below this many pixels.
    pub threshold: f64,
    /// Statistic over the matched distances.
    pub metric: ErrorMetric,
    /// Matching radius in pixels.
    pub max_distance: f64,
    /// Shift applied before matching.
    pub offset: AlignmentOffset,
}

impl ConvergenceChecker {
    /// Create a checker from the registration options.
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            threshold: options.convergence_pixel_threshold,
            metric: options.convergence_metric,
            max_distance: options.correspondence_max_distance_px,
            offset: options.alignment_offset,
        }
    }

    /// Project the whole CAD cloud under `pose`, re-match it and measure the error.
    pub fn evaluate<C: CameraModel + ?Sized>(
        &self,
        cad: &[Point3D],
        pose: &Pose,
        camera: &C,
        estimator: &CorrespondenceEstimator,
    ) -> ConvergenceReport {
        let projected = project_cloud(cad, pose, camera);
        let correspondences =
            estimator.find_with_offset(&projected.pixels, self.max_distance, self.offset);
        let mut report = self.report(&correspondences);
        report.num_projected = projected.len();
        report
    }

    /// Measure the error of an existing set of matches.
    pub fn report(&self, correspondences: &[Correspondence]) -> ConvergenceReport {
        let mean_error = mean_distance(correspondences);
        let error = match self.metric {
            ErrorMetric::Mean => mean_error,
            ErrorMetric::Max => max_distance(correspondences),
        };
        ConvergenceReport {
            error,
            mean_error,
            num_projected: 0,
            num_correspondences: correspondences.len(),
            converged: error.is_some_and(|e| e <= self.threshold),
        }
    }
}

fn mean_distance(correspondences: &[Correspondence]) -> Option<f64> {
    if correspondences.is_empty() {
        return None;
    }
    let sum = correspondences.iter().map(|c| c.distance).sum::<f64>();
    Some(sum / correspondences.len() as f64)
}

fn max_distance(correspondences: &[Correspondence]) -> Option<f64> {
    correspondences.iter().map(|c| c.distance).reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcad_3d::{CameraError, PinholeCamera, Point2D};
    use glam::DVec3;

    fn matches(distances: &[f64]) -> Vec<Correspondence> {
        distances
            .iter()
            .enumerate()
            .map(|(i, d)| Correspondence {
                source_index: i,
                target_index: i,
                distance: *d,
            })
            .collect()
    }

    #[test]
    fn test_mean_and_max() {
        let options = SolverOptions::default().with_convergence(1.5, ErrorMetric::Mean);
        let checker = ConvergenceChecker::new(&options);
        let report = checker.report(&matches(&[0.5, 1.0, 2.5]));
        assert_eq!(report.error, Some(4.0 / 3.0));
        assert!(report.converged);
        assert_eq!(report.num_correspondences, 3);

        let checker = ConvergenceChecker {
            metric: ErrorMetric::Max,
            ..checker
        };
        let report = checker.report(&matches(&[0.5, 1.0, 2.5]));
        assert_eq!(report.error, Some(2.5));
        assert_eq!(report.mean_error, Some(4.0 / 3.0));
        assert!(!report.converged);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let checker = ConvergenceChecker::new(&SolverOptions::default());
        assert!(checker.report(&matches(&[1.0])).converged);
    }

    #[test]
    fn test_no_matches_never_converges() {
        let checker = ConvergenceChecker::new(&SolverOptions::default());
        let report = checker.report(&[]);
        assert_eq!(report.error, None);
        assert!(!report.converged);
    }

    #[test]
    fn test_evaluate_uses_fresh_matches() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?;
        let cad = [Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 0.0, 0.0)];
        let pose = Pose::from_translation(DVec3::new(0.0, 0.0, 5.0));
        let observed = [Point2D::new(320.0, 240.0), Point2D::new(420.0, 243.0)];
        let estimator = CorrespondenceEstimator::new(&observed);

        let checker = ConvergenceChecker::new(&SolverOptions::default());
        let report = checker.evaluate(&cad, &pose, &camera, &estimator);
        assert_eq!(report.num_projected, 2);
        assert_eq!(report.num_correspondences, 2);
        assert_eq!(report.error, Some(1.5));
        assert!(!report.converged);
        Ok(())
    }
}

use std::path::Path;

use camcad_3d::io::IoError;
use camcad_optim::{LevenbergMarquardt, RobustLossKind};
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Pixel residual statistic used by the convergence test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMetric {
    /// Mean distance over the matched pairs.
    #[default]
    Mean,
    /// Largest distance over the matched pairs.
    Max,
}

/// Optional shift of the projected pixels applied before matching.
///
/// Only the copy used for association is shifted; residuals and the
/// convergence metric always use the true projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentOffset {
    /// Match the projections as they are.
    #[default]
    None,
    /// Align the centroids of both pixel sets.
    Centroid,
    /// Align the bounding-box centres of both pixel sets.
    Center,
}

/// Configuration of a registration run.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// use camcad_registration::{ErrorMetric, SolverOptions};
///
/// let text = r#"{"convergence_metric": "max", "loss_scale": 2.0}"#;
/// let options = SolverOptions::from_json_str(text)?;
/// assert_eq!(options.convergence_metric, ErrorMetric::Max);
/// assert_eq!(options.max_outer_iterations, 30);
/// # Ok::<(), camcad_registration::RegistrationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Maximum number of outer (project, match, solve) iterations.
    pub max_outer_iterations: usize,
    /// Maximum number of Levenberg-Marquardt steps per outer iteration.
    pub max_inner_iterations: usize,
    /// Largest pixel distance at which a projected and an observed point are matched.
    pub correspondence_max_distance_px: f64,
    /// Converged when the error metric is at or below this many pixels.
    pub convergence_pixel_threshold: f64,
    /// Statistic compared against the threshold.
    pub convergence_metric: ErrorMetric,
    /// Robust loss applied to the squared reprojection errors.
    pub robust_loss: RobustLossKind,
    /// Huber delta or Cauchy scale, in pixels.
    pub loss_scale: f64,
    /// Consecutive iterations of increasing mean error that stop the run as diverged.
    pub divergence_window: usize,
    /// Distance along the optical axis of the default starting pose.
    pub initial_depth: f64,
    /// Shift applied to the projections before matching.
    pub alignment_offset: AlignmentOffset,
    /// Initial damping of the inner solver.
    pub lambda_init: f64,
    /// Damping multiplier on rejected and divisor on accepted steps.
    pub lambda_factor: f64,
    /// Damping above which the inner solve stops.
    pub lambda_max: f64,
    /// Relative cost improvement below which the inner solve stops.
    pub cost_tolerance: f64,
    /// Gradient norm below which the inner solve stops.
    pub gradient_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_outer_iterations: 30,
            max_inner_iterations: 50,
            correspondence_max_distance_px: 1000.0,
            convergence_pixel_threshold: 1.0,
            convergence_metric: ErrorMetric::Mean,
            robust_loss: RobustLossKind::Huber,
            loss_scale: 1.0,
            divergence_window: 5,
            initial_depth: 2000.0,
            alignment_offset: AlignmentOffset::None,
            lambda_init: 1e-4,
            lambda_factor: 10.0,
            lambda_max: 1e10,
            cost_tolerance: 1e-10,
            gradient_tolerance: 1e-12,
        }
    }
}

impl SolverOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate options from a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, RegistrationError> {
        let options: Self = serde_json::from_str(text).map_err(IoError::from)?;
        options.validate()?;
        Ok(options)
    }

    /// Read and validate options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistrationError> {
        let text = std::fs::read_to_string(path).map_err(IoError::from)?;
        Self::from_json_str(&text)
    }

    /// Set the outer and inner iteration limits.
    pub fn with_max_iterations(mut self, outer: usize, inner: usize) -> Self {
        self.max_outer_iterations = outer;
        self.max_inner_iterations = inner;
        self
    }

    /// Set the correspondence distance threshold.
    pub fn with_max_distance(mut self, max_distance_px: f64) -> Self {
        self.correspondence_max_distance_px = max_distance_px;
        self
    }

    /// Set the convergence threshold and metric.
    pub fn with_convergence(mut self, threshold_px: f64, metric: ErrorMetric) -> Self {
        self.convergence_pixel_threshold = threshold_px;
        self.convergence_metric = metric;
        self
    }

    /// Set the robust loss and its scale.
    pub fn with_robust_loss(mut self, kind: RobustLossKind, scale: f64) -> Self {
        self.robust_loss = kind;
        self.loss_scale = scale;
        self
    }

    /// Set the divergence window.
    pub fn with_divergence_window(mut self, window: usize) -> Self {
        self.divergence_window = window;
        self
    }

    /// Set the depth of the default starting pose.
    pub fn with_initial_depth(mut self, depth: f64) -> Self {
        self.initial_depth = depth;
        self
    }

    /// Set the alignment pre-pass.
    pub fn with_alignment_offset(mut self, offset: AlignmentOffset) -> Self {
        self.alignment_offset = offset;
        self
    }

    /// Check every field is in range.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        let fail = |msg: String| Err(RegistrationError::InvalidOptions(msg));
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if self.max_outer_iterations == 0 {
            return fail("max_outer_iterations must be at least 1".to_string());
        }
        if self.max_inner_iterations == 0 {
            return fail("max_inner_iterations must be at least 1".to_string());
        }
        if !non_negative(self.correspondence_max_distance_px) {
            return fail(format!(
                "correspondence_max_distance_px must be finite and non-negative, got {}",
                self.correspondence_max_distance_px
            ));
        }
        if !non_negative(self.convergence_pixel_threshold) {
            return fail(format!(
                "convergence_pixel_threshold must be finite and non-negative, got {}",
                self.convergence_pixel_threshold
            ));
        }
        if self.robust_loss != RobustLossKind::None
            && !(self.loss_scale.is_finite() && self.loss_scale > 0.0)
        {
            return fail(format!(
                "loss_scale must be positive for the {} loss, got {}",
                self.robust_loss, self.loss_scale
            ));
        }
        if self.divergence_window == 0 {
            return fail("divergence_window must be at least 1".to_string());
        }
        if !(self.initial_depth.is_finite() && self.initial_depth > 0.0) {
            return fail(format!(
                "initial_depth must be positive, got {}",
                self.initial_depth
            ));
        }
        if !(self.lambda_init.is_finite() && self.lambda_init > 0.0) {
            return fail(format!("lambda_init must be positive, got {}", self.lambda_init));
        }
        if !(self.lambda_factor.is_finite() && self.lambda_factor > 1.0) {
            return fail(format!(
                "lambda_factor must be greater than 1, got {}",
                self.lambda_factor
            ));
        }
        if self.lambda_max.is_nan() || self.lambda_max < self.lambda_init {
            return fail(format!(
                "lambda_max ({}) must not be below lambda_init ({})",
                self.lambda_max, self.lambda_init
            ));
        }
        if !non_negative(self.cost_tolerance) || !non_negative(self.gradient_tolerance) {
            return fail("tolerances must be finite and non-negative".to_string());
        }
        Ok(())
    }

    /// The inner solver configured from these options.
    pub fn solver(&self) -> LevenbergMarquardt {
        LevenbergMarquardt::new()
            .with_max_iterations(self.max_inner_iterations)
            .with_lambda(self.lambda_init, self.lambda_factor, self.lambda_max)
            .with_tolerances(self.cost_tolerance, self.gradient_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() -> Result<(), RegistrationError> {
        let options = SolverOptions::default();
        options.validate()?;
        assert_eq!(options.correspondence_max_distance_px, 1000.0);
        assert_eq!(options.robust_loss, RobustLossKind::Huber);
        assert_eq!(options.alignment_offset, AlignmentOffset::None);

        let lm = options.solver();
        assert_eq!(lm.max_iterations, 50);
        assert_eq!(lm.lambda_init, 1e-4);
        Ok(())
    }

    #[test]
    fn test_partial_json() -> Result<(), RegistrationError> {
        let options = SolverOptions::from_json_str(
            r#"{
                "robust_loss": "cauchy",
                "alignment_offset": "center",
                "correspondence_max_distance_px": 1e6
            }"#,
        )?;
        assert_eq!(options.robust_loss, RobustLossKind::Cauchy);
        assert_eq!(options.alignment_offset, AlignmentOffset::Center);
        assert_eq!(options.correspondence_max_distance_px, 1e6);
        assert_eq!(options.max_inner_iterations, 50);
        Ok(())
    }

    #[test]
    fn test_json_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let options = SolverOptions::default()
            .with_convergence(0.5, ErrorMetric::Max)
            .with_alignment_offset(AlignmentOffset::Centroid);
        let text = serde_json::to_string(&options)?;
        assert_eq!(SolverOptions::from_json_str(&text)?, options);
        Ok(())
    }

    #[test]
    fn test_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"max_outer_iterations": 7}}"#)?;
        let options = SolverOptions::from_json_file(file.path())?;
        assert_eq!(options.max_outer_iterations, 7);

        let missing = SolverOptions::from_json_file(file.path().with_extension("nope"));
        assert!(matches!(missing, Err(RegistrationError::Io(IoError::Io(_)))));
        Ok(())
    }

    #[test]
    fn test_invalid_options() {
        let cases = [
            SolverOptions::default().with_max_iterations(0, 10),
            SolverOptions::default().with_max_iterations(10, 0),
            SolverOptions::default().with_max_distance(-1.0),
            SolverOptions::default().with_max_distance(f64::NAN),
            SolverOptions::default().with_convergence(f64::INFINITY, ErrorMetric::Mean),
            SolverOptions::default().with_robust_loss(RobustLossKind::Huber, 0.0),
            SolverOptions::default().with_divergence_window(0),
            SolverOptions::default().with_initial_depth(-5.0),
            SolverOptions {
                lambda_factor: 1.0,
                ..Default::default()
            },
            SolverOptions {
                lambda_max: 1e-8,
                ..Default::default()
            },
        ];
        for options in cases {
            assert!(
                matches!(options.validate(), Err(RegistrationError::InvalidOptions(_))),
                "{:?}",
                options
            );
        }

        // the scale is unused without a robust loss
        let plain = SolverOptions::default().with_robust_loss(RobustLossKind::None, 0.0);
        assert!(plain.validate().is_ok());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            SolverOptions::from_json_str(r#"{"robust_loss": "tukey"}"#),
            Err(RegistrationError::Io(IoError::Json(_)))
        ));
        assert!(matches!(
            SolverOptions::from_json_str(r#"{"divergence_window": 0}"#),
            Err(RegistrationError::InvalidOptions(_))
        ));
    }
}

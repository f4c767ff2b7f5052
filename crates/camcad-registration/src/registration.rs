use std::fmt;

use camcad_3d::ops::project_cloud;
use camcad_3d::{CameraModel, Point2D, Point3D};
use camcad_lie::Pose;
use camcad_optim::TerminationReason;
use glam::{DMat4, DVec3};
use rayon::prelude::*;

use crate::convergence::{ConvergenceChecker, ConvergenceReport};
use crate::correspondence::CorrespondenceEstimator;
use crate::error::RegistrationError;
use crate::options::SolverOptions;
use crate::residual::{build_residuals, ReprojectionFactor};

/// Relative increase of the mean error that counts as getting worse.
const INCREASE_TOLERANCE: f64 = 1e-9;

/// State of the registration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Starting pose chosen, no iteration run yet.
    Init,
    /// Outer iterations in progress.
    Iterating,
    /// The error reached the convergence threshold.
    Converged,
    /// The mean error kept increasing; the best pose seen is reported.
    Diverged,
    /// The outer iteration budget ran out.
    MaxIterationsReached,
}

impl RegistrationState {
    /// Whether the loop has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RegistrationState::Converged
                | RegistrationState::Diverged
                | RegistrationState::MaxIterationsReached
        )
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Init => "init",
            RegistrationState::Iterating => "iterating",
            RegistrationState::Converged => "converged",
            RegistrationState::Diverged => "diverged",
            RegistrationState::MaxIterationsReached => "max iterations reached",
        };
        write!(f, "{name}")
    }
}

/// Diagnostics of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationSummary {
    /// 1-based outer iteration number.
    pub iteration: usize,
    /// CAD points that projected under the pose the iteration started from.
    pub num_projected: usize,
    /// Matches the inner solve was built from.
    pub num_correspondences: usize,
    /// Why the inner solve stopped.
    pub inner_termination: TerminationReason,
    /// Inner solver steps taken.
    pub inner_iterations: usize,
    /// Robust cost before the inner solve.
    pub initial_cost: f64,
    /// Robust cost after the inner solve.
    pub final_cost: f64,
    /// Alignment of the refined pose, on fresh matches.
    pub report: ConvergenceReport,
}

/// Outcome of a registration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Terminal state of the loop.
    pub state: RegistrationState,
    /// Final pose, mapping CAD coordinates into the camera frame.
    pub pose: Pose,
    /// Mean matched pixel distance of `pose`. `None` when nothing matched.
    pub final_mean_pixel_error: Option<f64>,
    /// Number of outer iterations run.
    pub outer_iterations: usize,
    /// One entry per outer iteration.
    pub history: Vec<IterationSummary>,
}

impl RegistrationResult {
    /// Whether the run converged. Other terminal states are not failures but
    /// the pose should not be trusted.
    pub fn is_converged(&self) -> bool {
        self.state == RegistrationState::Converged
    }

    /// The pose as a 4x4 homogeneous matrix.
    pub fn matrix(&self) -> DMat4 {
        self.pose.to_matrix()
    }

    /// The pose as `[qw, qx, qy, qz, tx, ty, tz]`.
    pub fn quaternion_translation(&self) -> [f64; 7] {
        self.pose.to_quaternion_translation()
    }
}

/// Counts consecutive outer iterations whose mean error went up.
#[derive(Debug, Clone, Copy)]
struct DivergenceMonitor {
    window: usize,
    increasing: usize,
    previous: Option<f64>,
}

impl DivergenceMonitor {
    fn new(window: usize, initial_error: Option<f64>) -> Self {
        Self {
            window,
            increasing: 0,
            previous: initial_error,
        }
    }

    /// Record the mean error of the latest iteration. Returns `true` once
    /// `window` increases happened in a row.
    ///
    /// A missing error, an equal or a lower one resets the count.
    fn update(&mut self, mean_error: Option<f64>) -> bool {
        self.increasing = match (self.previous, mean_error) {
            (Some(prev), Some(current)) if current > prev * (1.0 + INCREASE_TOLERANCE) => {
                self.increasing + 1
            }
            _ => 0,
        };
        self.previous = mean_error;
        self.increasing >= self.window
    }
}

/// A configured registration of one CAD cloud against one set of observed pixels.
///
/// The inputs are borrowed read-only, so the same CAD cloud and camera can be
/// shared by several registrations running at once.
pub struct Registration<'a, C: CameraModel + ?Sized> {
    cad: &'a [Point3D],
    observed: &'a [Point2D],
    camera: &'a C,
    options: SolverOptions,
    initial_pose: Pose,
    estimator: CorrespondenceEstimator,
}

impl<'a, C: CameraModel + ?Sized> Registration<'a, C> {
    /// Validate the inputs and prepare a registration.
    ///
    /// The starting pose defaults to the identity rotation placed
    /// `initial_depth` along the optical axis.
    pub fn new(
        cad: &'a [Point3D],
        observed: &'a [Point2D],
        camera: &'a C,
        options: SolverOptions,
    ) -> Result<Self, RegistrationError> {
        options.validate()?;
        camera.validate()?;
        if cad.is_empty() {
            return Err(RegistrationError::EmptyCadCloud);
        }
        if observed.is_empty() {
            return Err(RegistrationError::EmptyObservedCloud);
        }

        let initial_pose = Pose::from_translation(DVec3::new(0.0, 0.0, options.initial_depth));
        Ok(Self {
            cad,
            observed,
            camera,
            estimator: CorrespondenceEstimator::new(observed),
            options,
            initial_pose,
        })
    }

    /// Start from a given pose instead of the default one.
    pub fn with_initial_pose(mut self, pose: Pose) -> Self {
        self.initial_pose = pose;
        self
    }

    /// The options of this registration.
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// The pose the loop starts from.
    pub fn initial_pose(&self) -> &Pose {
        &self.initial_pose
    }

    /// Run the loop until it converges, diverges or runs out of iterations.
    pub fn run(&self) -> RegistrationResult {
        let start = std::time::Instant::now();
        let loss = self.options.robust_loss.build(self.options.loss_scale);
        let solver = self.options.solver();
        let checker = ConvergenceChecker::new(&self.options);

        let mut state = RegistrationState::Init;
        let mut pose = self.initial_pose;
        let mut history = Vec::with_capacity(self.options.max_outer_iterations);

        let initial = checker.evaluate(self.cad, &pose, self.camera, &self.estimator);
        let mut best = (pose, initial.mean_error);
        let mut last_mean_error = initial.mean_error;
        let mut divergence =
            DivergenceMonitor::new(self.options.divergence_window, initial.mean_error);

        log::debug!(
            "registration start: {} cad points, {} observed, initial error {:?}",
            self.cad.len(),
            self.observed.len(),
            initial.mean_error
        );

        for iteration in 1..=self.options.max_outer_iterations {
            state = RegistrationState::Iterating;

            let projected = project_cloud(self.cad, &pose, self.camera);
            let correspondences = self.estimator.find_with_offset(
                &projected.pixels,
                self.options.correspondence_max_distance_px,
                self.options.alignment_offset,
            );
            if correspondences.is_empty() {
                log::warn!(
                    "iteration {}: no correspondences within {} px ({} of {} points projected)",
                    iteration,
                    self.options.correspondence_max_distance_px,
                    projected.len(),
                    self.cad.len()
                );
            }

            let terms = build_residuals(self.cad, self.observed, &projected, &correspondences);
            let factors = terms
                .iter()
                .map(|term| ReprojectionFactor::new(*term, self.camera))
                .collect::<Vec<_>>();

            let inner = solver.optimize(&factors, loss.as_ref(), &pose);
            if inner.termination_reason == TerminationReason::InsufficientResiduals
                && !correspondences.is_empty()
            {
                log::warn!(
                    "iteration {}: only {} residuals, pose left unchanged",
                    iteration,
                    inner.num_residuals
                );
            }
            pose = inner.pose;

            let report = checker.evaluate(self.cad, &pose, self.camera, &self.estimator);
            history.push(IterationSummary {
                iteration,
                num_projected: projected.len(),
                num_correspondences: correspondences.len(),
                inner_termination: inner.termination_reason,
                inner_iterations: inner.iterations,
                initial_cost: inner.initial_cost,
                final_cost: inner.final_cost,
                report,
            });

            log::debug!(
                "iteration {}: projected {} matched {} inner {:?} ({} steps)",
                iteration,
                projected.len(),
                correspondences.len(),
                inner.termination_reason,
                inner.iterations
            );
            log::debug!(
                "iteration {}: cost {:.4e} -> {:.4e} error {:?} elapsed {:?}",
                iteration,
                inner.initial_cost,
                inner.final_cost,
                report.error,
                start.elapsed()
            );

            last_mean_error = report.mean_error;
            if let Some(error) = report.mean_error {
                if best.1.map_or(true, |best_error| error < best_error) {
                    best = (pose, Some(error));
                }
            }

            if report.converged {
                state = RegistrationState::Converged;
                break;
            }

            if divergence.update(report.mean_error) {
                state = RegistrationState::Diverged;
                break;
            }
        }

        if !state.is_terminal() {
            state = RegistrationState::MaxIterationsReached;
        }

        let (pose, final_mean_pixel_error) = match state {
            RegistrationState::Diverged => best,
            _ => (pose, last_mean_error),
        };

        log::info!(
            "registration {} after {} iterations, mean error {:?}, elapsed {:?}",
            state,
            history.len(),
            final_mean_pixel_error,
            start.elapsed()
        );

        RegistrationResult {
            state,
            pose,
            final_mean_pixel_error,
            outer_iterations: history.len(),
            history,
        }
    }
}

/// Register several observed pixel sets against the same CAD cloud in parallel.
///
/// Every run starts from `initial_pose`, or the default pose when `None`.
/// Results are returned in the order of `observed_sets`.
pub fn register_many<C, O>(
    cad: &[Point3D],
    observed_sets: &[O],
    camera: &C,
    options: &SolverOptions,
    initial_pose: Option<Pose>,
) -> Vec<Result<RegistrationResult, RegistrationError>>
where
    C: CameraModel + ?Sized,
    O: AsRef<[Point2D]> + Sync,
{
    observed_sets
        .par_iter()
        .map(|observed| -> Result<RegistrationResult, RegistrationError> {
            let registration = Registration::new(cad, observed.as_ref(), camera, options.clone())?;
            let registration = match initial_pose {
                Some(pose) => registration.with_initial_pose(pose),
                None => registration,
            };
            Ok(registration.run())
        })
        .collect()
}

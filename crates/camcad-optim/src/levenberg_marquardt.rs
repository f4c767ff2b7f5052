//! Levenberg-Marquardt optimizer over a single rigid pose.
//!
//! Each iteration solves the damped normal equations
//! `(J^T W J + lambda * diag(J^T W J)) dx = -J^T W r` and applies `dx` as a
//! left tangent-space perturbation of the pose.

use camcad_lie::{Perturbation, Pose};

use crate::factor::Factor;
use crate::losses::RobustLoss;
use crate::normal_equations::NormalEquations;

/// Number of pose parameters.
const POSE_DOF: usize = 6;

/// Result of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerResult {
    /// Best pose found. Equal to the initial pose when no step was accepted.
    pub pose: Pose,
    /// Robust cost at the initial pose
    pub initial_cost: f64,
    /// Robust cost at the returned pose
    pub final_cost: f64,
    /// Number of iterations performed (accepted and rejected steps)
    pub iterations: usize,
    /// Number of residual terms that took part in the solve
    pub num_residuals: usize,
    /// Reason for termination
    pub termination_reason: TerminationReason,
}

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Converged: relative cost change below tolerance, or cost at zero
    CostConverged,
    /// Converged: gradient norm below tolerance
    GradientConverged,
    /// Maximum iterations reached
    MaxIterations,
    /// Lambda exceeded maximum (no step reduces the cost)
    LambdaMaxExceeded,
    /// Fewer equations than pose parameters; the pose is returned unchanged
    InsufficientResiduals,
}

impl TerminationReason {
    /// Whether the solver stopped at a stationary point.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            TerminationReason::CostConverged | TerminationReason::GradientConverged
        )
    }
}

/// Levenberg-Marquardt optimizer configuration.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Initial damping parameter
    pub lambda_init: f64,
    /// Maximum damping parameter
    pub lambda_max: f64,
    /// Factor for lambda adaptation
    pub lambda_factor: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Convergence threshold for the relative cost change
    pub cost_tolerance: f64,
    /// Convergence threshold for gradient norm
    pub gradient_tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_init: 1e-4,
            lambda_max: 1e10,
            lambda_factor: 10.0,
            max_iterations: 50,
            cost_tolerance: 1e-10,
            gradient_tolerance: 1e-12,
        }
    }
}

impl LevenbergMarquardt {
    /// Minimum step norm threshold. Steps smaller than this are considered zero.
    const STEP_SIZE_TOLERANCE: f64 = 1e-14;
    /// Costs below this are treated as an exact fit.
    const COST_FLOOR: f64 = 1e-20;
    /// Lower bound for lambda after successful steps.
    const LAMBDA_MIN: f64 = 1e-12;
    /// Diagonal floor used by the Marquardt scaling.
    const MIN_DIAGONAL: f64 = 1e-9;

    /// Create a new optimizer with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the initial, multiplier and maximum damping.
    pub fn with_lambda(mut self, init: f64, factor: f64, max: f64) -> Self {
        self.lambda_init = init;
        self.lambda_factor = factor;
        self.lambda_max = max;
        self
    }

    /// Set the relative cost and gradient tolerances.
    pub fn with_tolerances(mut self, cost_tolerance: f64, gradient_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    /// Minimise `sum_i rho(|r_i(pose)|^2)` starting from `initial`.
    ///
    /// Factors that cannot be evaluated at `initial` are left out of the solve.
    /// A trial pose at which any remaining factor cannot be evaluated is
    /// rejected like a cost increase. This never fails: when nothing improves
    /// the initial pose is returned unchanged.
    pub fn optimize<F: Factor>(
        &self,
        factors: &[F],
        loss: &dyn RobustLoss,
        initial: &Pose,
    ) -> OptimizerResult {
        let active = factors
            .iter()
            .filter(|f| f.linearize(initial, false).is_some())
            .collect::<Vec<_>>();

        let mut result = OptimizerResult {
            pose: *initial,
            initial_cost: 0.0,
            final_cost: 0.0,
            iterations: 0,
            num_residuals: active.len(),
            termination_reason: TerminationReason::MaxIterations,
        };

        if 2 * active.len() < POSE_DOF {
            if let Some(ne) = NormalEquations::build(&active, initial, loss, false) {
                result.initial_cost = ne.cost;
                result.final_cost = ne.cost;
            }
            result.termination_reason = TerminationReason::InsufficientResiduals;
            return result;
        }

        // factors are pure, so every pose they evaluated at evaluates again
        let Some(mut ne) = NormalEquations::build(&active, initial, loss, true) else {
            result.termination_reason = TerminationReason::InsufficientResiduals;
            return result;
        };
        result.initial_cost = ne.cost;
        result.final_cost = ne.cost;

        let mut lambda = self.lambda_init;
        let mut relinearize = false;

        loop {
            if relinearize {
                match NormalEquations::build(&active, &result.pose, loss, true) {
                    Some(current) => ne = current,
                    None => {
                        result.termination_reason = TerminationReason::LambdaMaxExceeded;
                        return result;
                    }
                }
                relinearize = false;
            }

            if ne.cost <= Self::COST_FLOOR {
                result.termination_reason = TerminationReason::CostConverged;
                return result;
            }
            if ne.gradient_norm() < self.gradient_tolerance {
                result.termination_reason = TerminationReason::GradientConverged;
                return result;
            }

            if result.iterations >= self.max_iterations {
                result.termination_reason = TerminationReason::MaxIterations;
                return result;
            }
            result.iterations += 1;

            let step = ne
                .solve_damped(lambda, Self::MIN_DIAGONAL)
                .map(Perturbation::from_array);

            let trial = match step {
                Some(delta) if delta.norm() < Self::STEP_SIZE_TOLERANCE => {
                    result.termination_reason = TerminationReason::CostConverged;
                    return result;
                }
                Some(delta) => {
                    let pose = result.pose.compose(&delta);
                    NormalEquations::build(&active, &pose, loss, false).map(|t| (pose, t.cost))
                }
                None => None,
            };

            match trial {
                Some((pose, new_cost)) if new_cost < result.final_cost => {
                    let relative_change = (result.final_cost - new_cost) / result.final_cost;
                    result.pose = pose;
                    result.final_cost = new_cost;
                    lambda = (lambda / self.lambda_factor).max(Self::LAMBDA_MIN);

                    log::trace!(
                        "lm iteration {}: cost {:.6e} lambda {:.1e}",
                        result.iterations,
                        new_cost,
                        lambda
                    );

                    if relative_change < self.cost_tolerance {
                        result.termination_reason = TerminationReason::CostConverged;
                        return result;
                    }
                    relinearize = true;
                }
                _ => {
                    // singular system, invalid trial pose or cost increase
                    lambda *= self.lambda_factor;
                    if lambda > self.lambda_max {
                        result.termination_reason = TerminationReason::LambdaMaxExceeded;
                        return result;
                    }
                }
            }
        }
    }
}

use std::ops::Add;

use camcad_lie::Pose;
use rayon::prelude::*;

use crate::factor::{Factor, Linearization};
use crate::losses::RobustLoss;

/// Factors per parallel work item.
const CHUNK_SIZE: usize = 64;

/// Gauss-Newton normal equations `H dx = -g` of the 6-parameter pose problem.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalEquations {
    /// Approximate Hessian `sum_i w_i J_i^T J_i`.
    pub hessian: [[f64; 6]; 6],
    /// Gradient `sum_i w_i J_i^T r_i`.
    pub gradient: [f64; 6],
    /// Robust cost `sum_i rho(|r_i|^2)`.
    pub cost: f64,
    /// Number of residual terms accumulated.
    pub num_residuals: usize,
}

impl NormalEquations {
    /// Add one linearized residual weighted by the robust loss.
    pub fn accumulate(&mut self, lin: &Linearization, loss: &dyn RobustLoss) {
        let s = lin.residual.length_squared();
        self.cost += loss.rho(s);
        self.num_residuals += 1;

        let Some(jac) = lin.jacobian else {
            return;
        };
        let w = loss.weight(s);
        let r = [lin.residual.x, lin.residual.y];

        for (row, ri) in jac.iter().zip(r.iter()) {
            for i in 0..6 {
                let wji = w * row[i];
                self.gradient[i] += wji * ri;
                // upper triangle only, mirrored before solving
                for j in i..6 {
                    self.hessian[i][j] += wji * row[j];
                }
            }
        }
    }

    /// Evaluate every factor at `pose` and sum their contributions.
    ///
    /// Factors are linearized in parallel over fixed-size chunks whose partial
    /// sums are merged in order, so the result does not depend on thread
    /// scheduling. Returns `None` if any factor cannot be evaluated.
    pub fn build<F: Factor>(
        factors: &[F],
        pose: &Pose,
        loss: &dyn RobustLoss,
        compute_jacobian: bool,
    ) -> Option<Self> {
        let partials = factors
            .par_chunks(CHUNK_SIZE)
            .map(|chunk| {
                chunk.iter().try_fold(Self::default(), |mut acc, factor| {
                    let lin = factor.linearize(pose, compute_jacobian)?;
                    acc.accumulate(&lin, loss);
                    Some(acc)
                })
            })
            .collect::<Option<Vec<_>>>()?;

        let mut total = partials.into_iter().fold(Self::default(), |a, b| a + b);
        total.symmetrize();
        Some(total)
    }

    /// Euclidean norm of the gradient.
    pub fn gradient_norm(&self) -> f64 {
        self.gradient.iter().map(|g| g * g).sum::<f64>().sqrt()
    }

    /// Solve the Marquardt-damped system `(H + lambda * diag(H)) dx = -g`.
    ///
    /// Diagonal entries below `min_diagonal` are damped as if they were
    /// `min_diagonal`, so unobservable directions still get regularized.
    pub fn solve_damped(&self, lambda: f64, min_diagonal: f64) -> Option<[f64; 6]> {
        let mut a = self.hessian;
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += lambda * row[i].max(min_diagonal);
        }
        let b = self.gradient.map(|g| -g);
        solve_6x6(a, b)
    }

    fn symmetrize(&mut self) {
        for i in 0..6 {
            for j in 0..i {
                self.hessian[i][j] = self.hessian[j][i];
            }
        }
    }
}

impl Add for NormalEquations {
    type Output = NormalEquations;

    fn add(mut self, rhs: Self) -> Self::Output {
        for i in 0..6 {
            for j in 0..6 {
                self.hessian[i][j] += rhs.hessian[i][j];
            }
            self.gradient[i] += rhs.gradient[i];
        }
        self.cost += rhs.cost;
        self.num_residuals += rhs.num_residuals;
        self
    }
}

/// Solve a 6x6 linear system with Gaussian elimination and partial pivoting.
///
/// Returns `None` when the matrix is numerically singular or the solution is
/// not finite.
pub fn solve_6x6(mut a: [[f64; 6]; 6], mut b: [f64; 6]) -> Option<[f64; 6]> {
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let tol = f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    for i in 0..6 {
        // pivot
        let mut piv = i;
        let mut max_val = a[i][i].abs();
        for (r, row) in a.iter().enumerate().skip(i + 1) {
            if row[i].abs() > max_val {
                max_val = row[i].abs();
                piv = r;
            }
        }
        if max_val.is_nan() || max_val <= tol {
            return None;
        }
        if piv != i {
            a.swap(i, piv);
            b.swap(i, piv);
        }

        // eliminate below
        for r in (i + 1)..6 {
            let factor = a[r][i] / a[i][i];
            if factor == 0.0 {
                continue;
            }
            for c in i..6 {
                a[r][c] -= factor * a[i][c];
            }
            b[r] -= factor * b[i];
        }
    }

    // back substitution
    let mut x = [0.0; 6];
    for i in (0..6).rev() {
        let sum: f64 = ((i + 1)..6).map(|c| a[i][c] * x[c]).sum();
        x[i] = (b[i] - sum) / a[i][i];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

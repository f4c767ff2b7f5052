use camcad_lie::Pose;
use glam::DVec2;

/// A 2D residual and its Jacobian with respect to the pose perturbation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linearization {
    /// Residual vector.
    pub residual: DVec2,
    /// Row-major 2x6 Jacobian, columns ordered `(r1, r2, r3, t1, t2, t3)`.
    ///
    /// `None` when not requested or not available at this pose; the term then
    /// contributes to the cost only.
    pub jacobian: Option<[[f64; 6]; 2]>,
}

/// A residual term of the pose problem.
///
/// Implementations are evaluated concurrently, so they must not hold mutable
/// state.
pub trait Factor: Send + Sync {
    /// Evaluate the residual at `pose`, and its Jacobian if `compute_jacobian`.
    ///
    /// Returns `None` when the term cannot be evaluated at this pose (for
    /// example the point no longer projects).
    fn linearize(&self, pose: &Pose, compute_jacobian: bool) -> Option<Linearization>;
}

impl<T: Factor + ?Sized> Factor for &T {
    fn linearize(&self, pose: &Pose, compute_jacobian: bool) -> Option<Linearization> {
        (**self).linearize(pose, compute_jacobian)
    }
}

impl<T: Factor + ?Sized> Factor for Box<T> {
    fn linearize(&self, pose: &Pose, compute_jacobian: bool) -> Option<Linearization> {
        (**self).linearize(pose, compute_jacobian)
    }
}

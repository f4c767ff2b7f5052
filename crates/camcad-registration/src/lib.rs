#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Each outer iteration projects the CAD cloud under the current pose,
//! associates the projections with the observed pixels by nearest neighbour,
//! refines the pose with a robust Levenberg-Marquardt solve over the matched
//! reprojection errors, and re-evaluates the alignment on fresh matches.
//!
//! ```no_run
//! use camcad_3d::{PinholeCamera, Point2D, Point3D};
//! use camcad_registration::{Registration, SolverOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = PinholeCamera::new(800.0, 800.0, 640.0, 480.0)?;
//! let cad = vec![Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 0.0, 0.0)];
//! let observed = vec![Point2D::new(640.0, 480.0), Point2D::new(800.0, 480.0)];
//!
//! let result = Registration::new(&cad, &observed, &camera, SolverOptions::default())?.run();
//! println!("{:?} after {} iterations", result.state, result.outer_iterations);
//! # Ok(())
//! # }
//! ```

mod convergence;
mod correspondence;
mod error;
mod options;
mod registration;
mod residual;

pub use convergence::{ConvergenceChecker, ConvergenceReport};
pub use correspondence::{find_correspondences, Correspondence, CorrespondenceEstimator};
pub use error::RegistrationError;
pub use options::{AlignmentOffset, ErrorMetric, SolverOptions};
pub use registration::{
    register_many, IterationSummary, Registration, RegistrationResult, RegistrationState,
};
pub use residual::{build_residuals, ReprojectionFactor, ResidualTerm};

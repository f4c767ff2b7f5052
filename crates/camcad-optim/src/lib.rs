#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The solver minimises `sum_i rho(|r_i(pose)|^2)` over the six tangent
//! parameters of a [`camcad_lie::Pose`]. Residual terms are supplied through the
//! [`Factor`] trait and the robust loss `rho` through [`RobustLoss`].

mod factor;
mod levenberg_marquardt;
mod losses;
mod normal_equations;

pub use factor::{Factor, Linearization};
pub use levenberg_marquardt::{LevenbergMarquardt, OptimizerResult, TerminationReason};
pub use losses::{CauchyLoss, HuberLoss, IdentityLoss, RobustLoss, RobustLossKind};
pub use normal_equations::{solve_6x6, NormalEquations};

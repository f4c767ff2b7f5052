#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # camcad Lie
//!
//! Rotations live on SO(3), which is not a flat vector space. Poses are therefore
//! kept as immutable values and updated through a 6-parameter tangent-space
//! [`Perturbation`] applied with the exponential map.
//!
//! ## Example
//!
//! ```rust
//! use camcad_lie::{Perturbation, Pose};
//! use glam::DVec3;
//!
//! let pose = Pose::from_translation(DVec3::new(0.0, 0.0, 5.0));
//! let delta = Perturbation::new(DVec3::new(0.0, 0.0, 0.1), DVec3::new(0.0, 0.0, -0.5));
//!
//! let updated = pose.compose(&delta);
//! let restored = updated.compose(&-delta);
//! assert!(restored.translation_distance(&pose) < 1e-12);
//! ```

/// Rigid camera poses and their tangent-space perturbations.
pub mod pose;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

pub use pose::{Perturbation, Pose};
pub use so3::SO3;

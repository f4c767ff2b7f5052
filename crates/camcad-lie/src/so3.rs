use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;

/// Angles below this threshold use the Taylor expansion of the exponential map.
const SMALL_ANGLE: f64 = 1e-8;

/// A 3D rotation stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// Unit quaternion representing the rotation.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Create a rotation from a quaternion. The quaternion is normalized.
    pub fn from_quaternion(quat: &DQuat) -> Self {
        Self {
            q: quat.normalize(),
        }
    }

    /// Create a rotation from a 3x3 rotation matrix.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            q: DQuat::from_mat3(mat).normalize(),
        }
    }

    /// Sample a uniformly distributed rotation from the thread local generator.
    pub fn from_random() -> Self {
        Self::from_random_with(&mut rand::rng())
    }

    /// Sample a uniformly distributed rotation from the given generator.
    pub fn from_random_with<R: Rng>(rng: &mut R) -> Self {
        let r1: f64 = rng.random();
        let r2: f64 = rng.random();
        let r3: f64 = rng.random();

        let two_pi = 2.0 * std::f64::consts::PI;
        let w = (1.0 - r1).sqrt() * (two_pi * r2).sin();
        let x = (1.0 - r1).sqrt() * (two_pi * r2).cos();
        let y = r1.sqrt() * (two_pi * r3).sin();
        let z = r1.sqrt() * (two_pi * r3).cos();

        Self {
            q: DQuat::from_xyzw(x, y, z, w).normalize(),
        }
    }

    /// The rotation as an orthonormal 3x3 matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Rotate a point.
    #[inline]
    pub fn transform(&self, point: DVec3) -> DVec3 {
        self.q * point
    }

    /// Lie algebra -> Lie group.
    ///
    /// Closed form of the matrix exponential of `hat(v)`.
    pub fn exp(v: DVec3) -> Self {
        let theta_sq = v.length_squared();
        let theta = theta_sq.sqrt();

        let (w, b) = if theta < SMALL_ANGLE {
            (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
        } else {
            let half = 0.5 * theta;
            (half.cos(), half.sin() / theta)
        };
        let xyz = b * v;

        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, w).normalize(),
        }
    }

    /// Lie group -> Lie algebra (axis-angle vector).
    pub fn log(&self) -> DVec3 {
        // pick the hemisphere with a non-negative real part
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = DVec3::new(q.x, q.y, q.z);
        let n = vec.length();

        if n < SMALL_ANGLE {
            vec * (2.0 / q.w)
        } else {
            let theta = 2.0 * n.atan2(q.w);
            vec * (theta / n)
        }
    }

    /// Vector space -> Lie algebra (skew-symmetric matrix).
    pub fn hat(v: DVec3) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(0.0, v.z, -v.y),
            DVec3::new(-v.z, 0.0, v.x),
            DVec3::new(v.y, -v.x, 0.0),
        )
    }

    /// Lie algebra -> vector space.
    pub fn vee(omega: DMat3) -> DVec3 {
        DVec3::new(omega.y_axis.z, omega.z_axis.x, omega.x_axis.y)
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        self.log().length()
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl Mul<DVec3> for SO3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform(rhs)
    }
}

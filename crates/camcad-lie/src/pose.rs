use std::ops::Neg;

use glam::{DMat3, DMat4, DQuat, DVec3};

use crate::so3::SO3;

/// A 6-parameter tangent-space increment `(r1, r2, r3, t1, t2, t3)`.
///
/// `rotation` is an axis-angle increment in radians, `translation` is added to
/// the pose translation as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Perturbation {
    /// Rotation increment in the Lie algebra so(3).
    pub rotation: DVec3,
    /// Translation increment.
    pub translation: DVec3,
}

impl Perturbation {
    /// The zero perturbation.
    pub const ZERO: Self = Self {
        rotation: DVec3::ZERO,
        translation: DVec3::ZERO,
    };

    /// Create a perturbation from its rotation and translation parts.
    pub fn new(rotation: DVec3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a perturbation from `[r1, r2, r3, t1, t2, t3]`.
    pub fn from_array(v: [f64; 6]) -> Self {
        Self {
            rotation: DVec3::new(v[0], v[1], v[2]),
            translation: DVec3::new(v[3], v[4], v[5]),
        }
    }

    /// Create a perturbation whose rotation part is given in degrees.
    pub fn from_degrees(rotation_deg: DVec3, translation: DVec3) -> Self {
        Self {
            rotation: DVec3::new(
                rotation_deg.x.to_radians(),
                rotation_deg.y.to_radians(),
                rotation_deg.z.to_radians(),
            ),
            translation,
        }
    }

    /// The perturbation as `[r1, r2, r3, t1, t2, t3]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    /// Euclidean norm of the 6-vector.
    pub fn norm(&self) -> f64 {
        (self.rotation.length_squared() + self.translation.length_squared()).sqrt()
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.translation.is_finite()
    }
}

impl Neg for Perturbation {
    type Output = Perturbation;

    fn neg(self) -> Self::Output {
        Self {
            rotation: -self.rotation,
            translation: -self.translation,
        }
    }
}

/// Rigid transform mapping CAD (world) coordinates into the camera frame.
///
/// A point `p` is mapped to `R * p + t`. The rotation is always a proper
/// rotation since it is stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Rotation part.
    pub rotation: SO3,
    /// Translation part.
    pub translation: DVec3,
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: SO3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a pose from a rotation and a translation.
    pub fn new(rotation: SO3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity rotation with the given translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            rotation: SO3::IDENTITY,
            translation,
        }
    }

    /// Apply a tangent-space perturbation and return the new pose.
    ///
    /// The rotation increment is left-multiplied onto the current rotation,
    /// the translation increment is added. `self` is left untouched so a
    /// rejected step can simply be dropped.
    pub fn compose(&self, delta: &Perturbation) -> Pose {
        Pose {
            rotation: SO3::exp(delta.rotation) * self.rotation,
            translation: self.translation + delta.translation,
        }
    }

    /// Map a point from CAD coordinates into the camera frame.
    #[inline]
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation.transform(point) + self.translation
    }

    /// The inverse transform (camera -> CAD).
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            rotation,
            translation: -rotation.transform(self.translation),
        }
    }

    /// The rotation matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        self.rotation.matrix()
    }

    /// The axis-angle vector of the rotation.
    pub fn rvec(&self) -> DVec3 {
        self.rotation.log()
    }

    /// The pose as a 4x4 homogeneous matrix.
    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation.q, self.translation)
    }

    /// Create a pose from a 4x4 homogeneous matrix.
    ///
    /// The upper-left block is assumed to be a rotation matrix.
    pub fn from_matrix(mat: &DMat4) -> Pose {
        Pose {
            rotation: SO3::from_matrix(&DMat3::from_mat4(*mat)),
            translation: mat.w_axis.truncate(),
        }
    }

    /// The pose as `[qw, qx, qy, qz, tx, ty, tz]`.
    pub fn to_quaternion_translation(&self) -> [f64; 7] {
        let q = self.rotation.q;
        let t = self.translation;
        [q.w, q.x, q.y, q.z, t.x, t.y, t.z]
    }

    /// Create a pose from `[qw, qx, qy, qz, tx, ty, tz]`.
    ///
    /// The quaternion is normalized. Returns `None` for a zero or non-finite
    /// quaternion, or a non-finite translation.
    pub fn from_quaternion_translation(qt: &[f64; 7]) -> Option<Pose> {
        let q = DQuat::from_xyzw(qt[1], qt[2], qt[3], qt[0]);
        let translation = DVec3::new(qt[4], qt[5], qt[6]);

        let norm = q.length();
        if !norm.is_finite() || norm < f64::EPSILON || !translation.is_finite() {
            return None;
        }

        Some(Pose {
            rotation: SO3::from_quaternion(&q),
            translation,
        })
    }

    /// Angle in radians of the relative rotation between two poses.
    pub fn angular_distance(&self, other: &Pose) -> f64 {
        (self.rotation.inverse() * other.rotation).angle()
    }

    /// Euclidean distance between the two translations.
    pub fn translation_distance(&self, other: &Pose) -> f64 {
        (self.translation - other.translation).length()
    }
}

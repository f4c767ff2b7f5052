use std::path::Path;

use camcad_lie::{Perturbation, Pose};
use glam::DVec3;
use serde::Deserialize;

use super::IoError;

#[derive(Deserialize)]
struct PoseDocument {
    #[serde(default)]
    pose: Vec<f64>,
}

/// A pose document `{"pose": [x, y, z, rx, ry, rz]}`, rotations in degrees.
///
/// The values are expressed in world axes (x forward, y left, z up). They are
/// remapped to camera axes (x right, y down, z forward) before being applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseFile {
    /// Translation in world axes.
    pub translation: DVec3,
    /// Rotation angles about the world axes, in degrees.
    pub rotation_deg: DVec3,
}

impl PoseFile {
    /// Parse a pose document.
    pub fn parse(text: &str) -> Result<Self, IoError> {
        let document: PoseDocument = serde_json::from_str(text)?;
        let v = document.pose;
        if v.len() != 6 || v.iter().any(|x| !x.is_finite()) {
            return Err(IoError::InvalidPose(v.len()));
        }
        Ok(Self {
            translation: DVec3::new(v[0], v[1], v[2]),
            rotation_deg: DVec3::new(v[3], v[4], v[5]),
        })
    }

    /// Read a pose document from a file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The same pose in camera axes: `(x, y, z) -> (-y, -z, x)` for both the
    /// translation and the rotation angles.
    pub fn to_camera_axes(&self) -> Self {
        let remap = |v: DVec3| DVec3::new(-v.y, -v.z, v.x);
        Self {
            translation: remap(self.translation),
            rotation_deg: remap(self.rotation_deg),
        }
    }

    /// Apply the pose as an initial placement onto `base`.
    ///
    /// The camera-axes components are negated unless `inverted` is set.
    pub fn apply_initial(&self, base: &Pose, inverted: bool) -> Pose {
        let sign = if inverted { 1.0 } else { -1.0 };
        self.to_camera_axes().apply(base, sign)
    }

    /// Apply the pose as a structure transform onto `base`.
    ///
    /// The camera-axes components are negated only when `inverted` is set.
    pub fn apply_structure(&self, base: &Pose, inverted: bool) -> Pose {
        let sign = if inverted { -1.0 } else { 1.0 };
        self.to_camera_axes().apply(base, sign)
    }

    // rx, ry, rz, then the translation, each as a left perturbation
    fn apply(&self, base: &Pose, sign: f64) -> Pose {
        let r = sign * self.rotation_deg;
        let steps = [
            Perturbation::from_degrees(DVec3::new(r.x, 0.0, 0.0), DVec3::ZERO),
            Perturbation::from_degrees(DVec3::new(0.0, r.y, 0.0), DVec3::ZERO),
            Perturbation::from_degrees(DVec3::new(0.0, 0.0, r.z), DVec3::ZERO),
            Perturbation::new(DVec3::ZERO, sign * self.translation),
        ];
        steps.iter().fold(*base, |pose, step| pose.compose(step))
    }
}

/// Parse an initial pose document and apply it onto the identity.
///
/// See [`PoseFile::apply_initial`].
pub fn parse_pose_json(text: &str, inverted: bool) -> Result<Pose, IoError> {
    Ok(PoseFile::parse(text)?.apply_initial(&Pose::IDENTITY, inverted))
}

/// Read an initial pose from a JSON file. See [`parse_pose_json`].
pub fn read_pose_json(path: impl AsRef<Path>, inverted: bool) -> Result<Pose, IoError> {
    let text = std::fs::read_to_string(path)?;
    parse_pose_json(&text, inverted)
}

/// Parse a structure pose document and apply it onto `base`.
///
/// See [`PoseFile::apply_structure`].
pub fn transform_pose_json(text: &str, base: &Pose, inverted: bool) -> Result<Pose, IoError> {
    Ok(PoseFile::parse(text)?.apply_structure(base, inverted))
}

/// Read a structure pose from a JSON file and apply it onto `base`.
pub fn read_transform_pose_json(
    path: impl AsRef<Path>,
    base: &Pose,
    inverted: bool,
) -> Result<Pose, IoError> {
    let text = std::fs::read_to_string(path)?;
    transform_pose_json(&text, base, inverted)
}

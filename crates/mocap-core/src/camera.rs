use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::Resolution;

/// Lens calibration exported by a node after a calibration session.
///
/// The camera matrix and distortion coefficients are carried for downstream
/// consumers; triangulation itself only needs the field of view and the
/// resolution the calibration was solved at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// 3×3 pinhole camera matrix, row-major.
    pub camera_matrix: [[f64; 3]; 3],
    /// Distortion coefficients in the usual `k1, k2, p1, p2, k3, ...` order.
    pub distortion: Vec<f64>,
    /// `(horizontal, vertical)` field of view in degrees.
    pub fov: [f64; 2],
    #[serde(default)]
    pub resolution: Resolution,
}

impl CameraIntrinsics {
    /// Field of view in radians.
    pub fn fov_radians(&self) -> Vector2<f64> {
        Vector2::new(self.fov[0].to_radians(), self.fov[1].to_radians())
    }
}

/// Camera placement in the world frame.
///
/// `rotation` holds Euler angles in radians applied about X, then Y, then Z
/// (`R = Rz · Ry · Rx`); an unrotated camera looks down `-Z`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPose {
    pub position: Point3<f64>,
    pub rotation: Vector3<f64>,
}

impl WorldPose {
    pub fn new(position: Point3<f64>, rotation: Vector3<f64>) -> Self {
        Self { position, rotation }
    }
}

/// A calibrated camera node, read-only for the duration of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Host name of the node the camera is attached to.
    pub host: String,
    pub intrinsics: CameraIntrinsics,
    pub pose: WorldPose,
}

impl Camera {
    pub fn new(host: impl Into<String>, intrinsics: CameraIntrinsics, pose: WorldPose) -> Self {
        Self {
            host: host.into(),
            intrinsics,
            pose,
        }
    }

    #[inline]
    pub fn position(&self) -> Point3<f64> {
        self.pose.position
    }

    #[inline]
    pub fn rotation(&self) -> Vector3<f64> {
        self.pose.rotation
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.intrinsics.resolution
    }

    #[inline]
    pub fn fov_radians(&self) -> Vector2<f64> {
        self.intrinsics.fov_radians()
    }
}

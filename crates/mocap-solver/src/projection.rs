//! Mapping between image detections and world-space rays.
//!
//! A detection's offset from the frame centre, scaled by the field of view,
//! is treated as an extra rotation of the camera (tilt about the camera X axis
//! for the vertical offset, pan about the camera Y axis for the horizontal
//! one). The adjusted orientation then turns the camera's forward vector
//! (`-Z`) into the ray direction.

use mocap_core::{Camera, Resolution};
use nalgebra::{Point2, Point3, Rotation3, Vector2, Vector3};

use crate::geometry::{rotate_about_axis, Ray};

fn forward() -> Point3<f64> {
    Point3::new(0.0, 0.0, -1.0)
}

/// Camera orientation adjusted for a detection at normalized position `uv`.
///
/// `rotation` is the camera's XYZ Euler triple, `fov` the horizontal/vertical
/// field of view in radians. Returns the adjusted XYZ Euler triple.
pub fn adjusted_orientation(rotation: Vector3<f64>, fov: Vector2<f64>, uv: [f64; 2]) -> Vector3<f64> {
    let pan = (uv[0] - 0.5) * fov.x;
    let tilt = (uv[1] - 0.5) * fov.y;

    let camera = Rotation3::from_euler_angles(rotation.x, rotation.y, rotation.z);
    let adjusted = camera
        * Rotation3::from_axis_angle(&Vector3::x_axis(), tilt)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), -pan);

    let (x, y, z) = adjusted.euler_angles();
    Vector3::new(x, y, z)
}

/// Turn the forward vector by an XYZ Euler triple, one axis at a time.
pub fn rotate_forward(euler: Vector3<f64>) -> Vector3<f64> {
    let origin = Point3::origin();
    let x = rotate_about_axis(forward(), origin, Point3::new(5.0, 0.0, 0.0), euler.x);
    let y = rotate_about_axis(x, origin, Point3::new(0.0, 5.0, 0.0), euler.y);
    let z = rotate_about_axis(y, origin, Point3::new(0.0, 0.0, 5.0), euler.z);
    z.coords
}

/// World-space ray from `camera` through a pixel detection made at the
/// camera's calibration resolution.
pub fn back_project(camera: &Camera, pixel: Point2<f64>) -> Ray {
    back_project_at(camera, camera.resolution(), pixel)
}

/// World-space ray from `camera` through a pixel of a frame captured at
/// `resolution`.
///
/// The pixel is normalized by the frame it was detected in, so detections
/// from a scaled capture mode map onto the same rays as full-size ones.
pub fn back_project_at(camera: &Camera, resolution: Resolution, pixel: Point2<f64>) -> Ray {
    let uv = resolution.normalize(pixel.x, pixel.y);
    let euler = adjusted_orientation(camera.rotation(), camera.fov_radians(), uv);
    let origin = camera.position();
    Ray::new(origin, origin + rotate_forward(euler))
}

/// Pixel at which `camera` sees `point`, if it falls inside the frame.
///
/// This is the exact inverse of [`back_project`] and is mostly useful for
/// generating synthetic detections.
pub fn project(camera: &Camera, point: Point3<f64>) -> Option<Point2<f64>> {
    project_at(camera, camera.resolution(), point)
}

/// [`project`] into a frame captured at `resolution`.
pub fn project_at(camera: &Camera, resolution: Resolution, point: Point3<f64>) -> Option<Point2<f64>> {
    let offset = point - camera.position();
    if offset.norm_squared() <= f64::EPSILON {
        return None;
    }
    let r = camera.rotation();
    let world_to_camera = Rotation3::from_euler_angles(r.x, r.y, r.z).inverse();
    let d = world_to_camera * offset.normalize();
    if d.z >= 0.0 {
        return None;
    }

    let pan = d.x.clamp(-1.0, 1.0).asin();
    let tilt = d.y.atan2(-d.z);

    let fov = camera.fov_radians();
    let u = pan / fov.x + 0.5;
    let v = tilt / fov.y + 0.5;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return None;
    }
    let [x, y] = resolution.denormalize(u, v);
    Some(Point2::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mocap_core::{CameraIntrinsics, WorldPose};

    fn camera(position: Point3<f64>, rotation: Vector3<f64>) -> Camera {
        Camera::new(
            "cam",
            CameraIntrinsics {
                camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                distortion: Vec::new(),
                fov: [62.2, 48.8],
                resolution: Resolution::new(1632, 1232),
            },
            WorldPose::new(position, rotation),
        )
    }

    #[test]
    fn centre_pixel_looks_down_the_optical_axis() {
        let cam = camera(Point3::new(1.0, 2.0, 3.0), Vector3::zeros());
        let ray = back_project(&cam, Point2::new(816.0, 616.0));
        assert_relative_eq!(ray.origin, Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(ray.direction(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn sequential_axis_rotations_match_euler_composition() {
        let euler = Vector3::new(0.3, -0.7, 1.9);
        let expected = Rotation3::from_euler_angles(euler.x, euler.y, euler.z) * forward().coords;
        assert_relative_eq!(rotate_forward(euler), expected, epsilon = 1e-12);
    }

    #[test]
    fn horizontal_offset_pans_by_its_share_of_the_fov() {
        let cam = camera(Point3::origin(), Vector3::zeros());
        // Right edge of the frame: half the horizontal FOV away from the axis.
        let ray = back_project(&cam, Point2::new(1632.0, 616.0));
        let half = 31.1_f64.to_radians();
        assert_relative_eq!(
            ray.direction(),
            Vector3::new(half.sin(), 0.0, -half.cos()),
            epsilon = 1e-12
        );
    }

    #[test]
    fn projection_inverts_back_projection() {
        let cam = camera(Point3::new(-2.0, 0.5, 4.0), Vector3::new(0.2, -0.35, 0.1));
        for pixel in [
            Point2::new(816.0, 616.0),
            Point2::new(100.0, 1100.0),
            Point2::new(1500.0, 40.0),
        ] {
            let ray = back_project(&cam, pixel);
            let seen = project(&cam, ray.at(3.5)).expect("in view");
            assert_relative_eq!(seen, pixel, epsilon = 1e-6);
        }
    }

    #[test]
    fn scaled_frames_map_to_the_same_ray() {
        let cam = camera(Point3::new(0.5, -1.0, 4.0), Vector3::new(0.1, 0.25, -0.05));
        let full = back_project(&cam, Point2::new(1200.0, 300.0));
        let half = back_project_at(&cam, Resolution::new(816, 616), Point2::new(600.0, 150.0));
        assert_relative_eq!(half.direction(), full.direction(), epsilon = 1e-12);

        let seen = project_at(&cam, Resolution::new(816, 616), full.at(2.0)).expect("in view");
        assert_relative_eq!(seen, Point2::new(600.0, 150.0), epsilon = 1e-6);
    }

    #[test]
    fn points_behind_the_camera_are_not_projected() {
        let cam = camera(Point3::origin(), Vector3::zeros());
        assert!(project(&cam, Point3::new(0.0, 0.0, 2.0)).is_none());
        assert!(project(&cam, Point3::new(10.0, 0.0, -0.1)).is_none());
    }
}

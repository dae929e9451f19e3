//! Ray primitives: arbitrary-axis rotation and skew-line closest approach.

use nalgebra::{Matrix3, Point3, Vector3};

/// A line through `origin` and `through`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub through: Point3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, through: Point3<f64>) -> Self {
        Self { origin, through }
    }

    /// Unit direction from `origin` towards `through`.
    #[inline]
    pub fn direction(&self) -> Vector3<f64> {
        (self.through - self.origin).normalize()
    }

    #[inline]
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction() * t
    }
}

/// Rotate `p` by `theta` radians about the axis through `axis_a` and `axis_b`.
///
/// Positive angles turn counter-clockwise when looking from `axis_b` towards
/// `axis_a` (right-handed). The rotation matrix is built from the axis unit
/// vector with the Rodrigues construction.
pub fn rotate_about_axis(
    p: Point3<f64>,
    axis_a: Point3<f64>,
    axis_b: Point3<f64>,
    theta: f64,
) -> Point3<f64> {
    let n = (axis_b - axis_a).normalize();
    let (s, c) = theta.sin_cos();
    let t = 1.0 - c;
    let (x, y, z) = (n.x, n.y, n.z);

    let m = Matrix3::new(
        t * x * x + c,
        t * x * y - s * z,
        t * x * z + s * y,
        t * x * y + s * z,
        t * y * y + c,
        t * y * z - s * x,
        t * x * z - s * y,
        t * y * z + s * x,
        t * z * z + c,
    );

    axis_a + m * (p - axis_a)
}

/// Closest approach between two rays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayApproach {
    /// Non-parallel rays: the nearest point on each and their separation.
    Skew {
        on_a: Point3<f64>,
        on_b: Point3<f64>,
        distance: f64,
    },
    /// Degenerate geometry: the rays are parallel, so only the distance
    /// between the lines is defined.
    Parallel { distance: f64 },
}

impl RayApproach {
    pub fn distance(&self) -> f64 {
        match *self {
            RayApproach::Skew { distance, .. } | RayApproach::Parallel { distance } => distance,
        }
    }

    /// Midpoint between the two closest points, if defined.
    pub fn midpoint(&self) -> Option<Point3<f64>> {
        match *self {
            RayApproach::Skew { on_a, on_b, .. } => Some(nalgebra::center(&on_a, &on_b)),
            RayApproach::Parallel { .. } => None,
        }
    }
}

/// Compute the closest approach between `a` and `b`.
///
/// Rays whose unit directions have a squared cross-product norm at or below
/// `parallel_epsilon` are reported as [`RayApproach::Parallel`].
pub fn closest_approach(a: &Ray, b: &Ray, parallel_epsilon: f64) -> RayApproach {
    let da = a.direction();
    let db = b.direction();
    let cross = da.cross(&db);
    let denom = cross.norm_squared();
    let t = b.origin - a.origin;

    if denom <= parallel_epsilon {
        let along = da.dot(&t);
        let foot = a.origin + da * along;
        return RayApproach::Parallel {
            distance: (foot - b.origin).norm(),
        };
    }

    let det_a = Matrix3::from_rows(&[t.transpose(), db.transpose(), cross.transpose()]).determinant();
    let det_b = Matrix3::from_rows(&[t.transpose(), da.transpose(), cross.transpose()]).determinant();

    let on_a = a.origin + da * (det_a / denom);
    let on_b = b.origin + db * (det_b / denom);

    RayApproach::Skew {
        on_a,
        on_b,
        distance: (on_a - on_b).norm(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-12;

    #[test]
    fn quarter_turn_about_z() {
        let p = rotate_about_axis(
            Point3::new(1.0, 0.0, 0.0),
            Point3::origin(),
            Point3::new(0.0, 0.0, 5.0),
            FRAC_PI_2,
        );
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn rotation_about_offset_axis_keeps_axis_points_fixed() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(2.0, 2.0, 3.0);
        let on_axis = Point3::new(4.0, 2.0, 3.0);
        assert_relative_eq!(rotate_about_axis(on_axis, a, b, 1.1), on_axis, epsilon = 1e-12);

        let off = Point3::new(1.0, 3.0, 3.0);
        let turned = rotate_about_axis(off, a, b, FRAC_PI_2);
        assert_relative_eq!(turned, Point3::new(1.0, 2.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn matches_nalgebra_axis_angle() {
        let axis = Vector3::new(0.3, -0.5, 0.8);
        let rot = nalgebra::Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(axis), 0.7);
        let p = Point3::new(-1.0, 0.25, 2.0);
        let ours = rotate_about_axis(p, Point3::origin(), Point3::from(axis * 3.0), 0.7);
        assert_relative_eq!(ours, rot * p, epsilon = 1e-12);
    }

    #[test]
    fn skew_lines_closest_points_are_perpendicular_to_both() {
        let cases = [
            (
                Ray::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)),
                Ray::new(Point3::new(0.0, 1.0, 1.0), Point3::new(0.0, 2.0, 1.0)),
            ),
            (
                Ray::new(Point3::new(-3.0, 1.0, 2.0), Point3::new(1.0, 0.5, -1.0)),
                Ray::new(Point3::new(4.0, -2.0, 0.5), Point3::new(-1.0, 3.0, 2.5)),
            ),
            (
                Ray::new(Point3::new(0.1, 0.2, 0.3), Point3::new(10.0, 0.2, 0.31)),
                Ray::new(Point3::new(5.0, -7.0, 1.0), Point3::new(5.1, 7.0, 1.2)),
            ),
        ];
        for (a, b) in cases {
            let RayApproach::Skew { on_a, on_b, distance } = closest_approach(&a, &b, EPS) else {
                panic!("expected skew rays");
            };
            let gap = on_a - on_b;
            assert!(gap.dot(&a.direction()).abs() < 1e-9);
            assert!(gap.dot(&b.direction()).abs() < 1e-9);
            assert_relative_eq!(gap.norm(), distance, epsilon = 1e-12);
        }
    }

    #[test]
    fn known_skew_distance() {
        let a = Ray::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let b = Ray::new(Point3::new(0.0, 1.0, 1.0), Point3::new(0.0, 2.0, 1.0));
        let approach = closest_approach(&a, &b, EPS);
        assert_relative_eq!(approach.distance(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            approach.midpoint().expect("skew"),
            Point3::new(0.0, 0.0, 0.5),
            epsilon = 1e-12
        );
    }

    #[test]
    fn intersecting_rays_meet_with_zero_residual() {
        let target = Point3::new(0.5, -0.25, 2.0);
        let a = Ray::new(Point3::new(-1.0, 0.0, 0.0), target);
        let b = Ray::new(Point3::new(1.0, 1.0, 0.0), target);
        let approach = closest_approach(&a, &b, EPS);
        assert!(approach.distance() < 1e-12);
        assert_relative_eq!(approach.midpoint().expect("skew"), target, epsilon = 1e-12);
    }

    #[test]
    fn parallel_rays_report_line_distance_only() {
        let a = Ray::new(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, -1.0));
        let b = Ray::new(Point3::new(3.0, 4.0, 7.0), Point3::new(3.0, 4.0, 9.0));
        let approach = closest_approach(&a, &b, EPS);
        assert!(matches!(approach, RayApproach::Parallel { .. }));
        assert_relative_eq!(approach.distance(), 5.0, epsilon = 1e-12);
        assert!(approach.midpoint().is_none());
    }
}

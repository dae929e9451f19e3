//! Multi-view triangulation of marker detections.
//!
//! Every calibrated node contributes, per frame, a pixel position for each
//! marker it identified. Each detection is back-projected to a world-space ray
//! from the camera centre; for a marker seen by two or more nodes, every pair
//! of rays is intersected in the least-squares sense (closest approach of two
//! skew lines) and the pairwise midpoints are averaged.
//!
//! ```
//! use mocap_core::{Camera, CameraIntrinsics, FrameDetections, MarkerIdentity, Resolution, WorldPose};
//! use mocap_solver::{project, NodeFrame, TriangulationSolver};
//! use nalgebra::{Point3, Vector3};
//!
//! let intrinsics = CameraIntrinsics {
//!     camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
//!     distortion: vec![],
//!     fov: [62.2, 48.8],
//!     resolution: Resolution::new(1632, 1232),
//! };
//! let a = Camera::new("a", intrinsics.clone(), WorldPose::new(Point3::new(-0.5, 0.0, 5.0), Vector3::zeros()));
//! let b = Camera::new("b", intrinsics, WorldPose::new(Point3::new(0.5, 0.0, 5.0), Vector3::zeros()));
//!
//! let marker: MarkerIdentity = "red triangle".parse().unwrap();
//! let target = Point3::new(0.1, 0.2, 0.0);
//! let mut fa = FrameDetections::new();
//! fa.insert(marker, project(&a, target).unwrap());
//! let mut fb = FrameDetections::new();
//! fb.insert(marker, project(&b, target).unwrap());
//!
//! let solver = TriangulationSolver::default();
//! let points = solver.solve_frame(0, &[
//!     NodeFrame::new(&a, &fa),
//!     NodeFrame::new(&b, &fb),
//! ]);
//! assert_eq!(points.len(), 1);
//! assert!((points[0].position - target).norm() < 1e-6);
//! ```

mod geometry;
mod params;
mod projection;
mod solver;

pub use geometry::{closest_approach, rotate_about_axis, Ray, RayApproach};
pub use params::{FrameCountPolicy, SolverParams};
pub use projection::{
    adjusted_orientation, back_project, back_project_at, project, project_at, rotate_forward,
};
pub use solver::{NodeFrame, NodeTrack, SequenceSolution, SolveError, TriangulationSolver};

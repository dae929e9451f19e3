use approx::assert_relative_eq;
use mocap_core::{
    Camera, CameraIntrinsics, FrameDetections, MarkerColor, MarkerIdentity, MarkerPattern,
    Resolution, SolvedSequence, WorldPose,
};
use mocap_solver::{
    back_project, project, FrameCountPolicy, NodeTrack, SolverParams, TriangulationSolver,
};
use nalgebra::{Point2, Point3, Rotation3, Vector3};

const RED_TRIANGLE: MarkerIdentity = MarkerIdentity::new(MarkerColor::Red, MarkerPattern::Triangle);
const GREEN_SQUARE: MarkerIdentity = MarkerIdentity::new(MarkerColor::Green, MarkerPattern::Square);

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        camera_matrix: [[1270.0, 0.0, 816.0], [0.0, 1270.0, 616.0], [0.0, 0.0, 1.0]],
        distortion: vec![0.0; 5],
        fov: [62.2, 48.8],
        resolution: Resolution::new(1632, 1232),
    }
}

/// Camera at `position` whose optical axis passes through `target`.
fn aimed(host: &str, position: Point3<f64>, target: Point3<f64>) -> Camera {
    let d = (target - position).normalize();
    let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), d.y.atan2(-d.z))
        * Rotation3::from_axis_angle(&Vector3::y_axis(), -d.x.asin());
    let (x, y, z) = rot.euler_angles();
    Camera::new(host, intrinsics(), WorldPose::new(position, Vector3::new(x, y, z)))
}

fn walk(frame: usize) -> Point3<f64> {
    let t = frame as f64 * 0.1;
    Point3::new(0.5 * t, 0.2 * t.sin(), 1.0 - 0.3 * t)
}

fn track_of(camera: &Camera, frames: usize, markers: &[MarkerIdentity]) -> Vec<FrameDetections> {
    (0..frames)
        .map(|f| {
            let mut detections = FrameDetections::new();
            for (k, marker) in markers.iter().enumerate() {
                let point = walk(f) + Vector3::new(0.0, 0.25 * k as f64, 0.0);
                if let Some(px) = project(camera, point) {
                    detections.insert(*marker, px);
                }
            }
            detections
        })
        .collect()
}

#[test]
fn two_nodes_five_frames_give_five_points() {
    let a = aimed("mocap-a", Point3::new(-2.5, 1.0, 5.0), Point3::new(0.0, 0.0, 0.5));
    let b = aimed("mocap-b", Point3::new(2.5, 0.8, 5.5), Point3::new(0.0, 0.0, 0.5));
    let fa = track_of(&a, 5, &[RED_TRIANGLE]);
    let fb = track_of(&b, 5, &[RED_TRIANGLE]);

    let solution = TriangulationSolver::default()
        .solve_sequence(&[
            NodeTrack::new(&a, &fa),
            NodeTrack::new(&b, &fb),
        ])
        .expect("solve");

    assert!(solution.dropped_frames.is_empty());
    assert_eq!(solution.sequence.len(), 5);
    assert_eq!(solution.sequence.point_count(), 5);
    for (frame, position) in solution.sequence.track(RED_TRIANGLE) {
        assert_relative_eq!(position, walk(frame), epsilon = 1e-3);
    }
}

#[test]
fn markers_are_solved_independently() {
    let target = Point3::new(0.0, 0.0, 0.5);
    let cams = [
        aimed("a", Point3::new(-3.0, 0.0, 4.0), target),
        aimed("b", Point3::new(3.0, 0.5, 4.0), target),
        aimed("c", Point3::new(0.0, 3.0, 4.5), target),
    ];
    // Node "c" never identifies the green square.
    let frames = [
        track_of(&cams[0], 3, &[RED_TRIANGLE, GREEN_SQUARE]),
        track_of(&cams[1], 3, &[RED_TRIANGLE]),
        track_of(&cams[2], 3, &[RED_TRIANGLE, GREEN_SQUARE]),
    ];
    let tracks: Vec<NodeTrack<'_>> = cams
        .iter()
        .zip(&frames)
        .map(|(camera, frames)| NodeTrack::new(camera, frames))
        .collect();

    let solution = TriangulationSolver::default()
        .solve_sequence(&tracks)
        .expect("solve");
    for frame in &solution.sequence.frames {
        let markers: Vec<MarkerIdentity> = frame.iter().map(|p| p.marker).collect();
        assert_eq!(markers, vec![RED_TRIANGLE, GREEN_SQUARE]);
    }
    for (frame, position) in solution.sequence.track(GREEN_SQUARE) {
        assert_relative_eq!(
            position,
            walk(frame) + Vector3::new(0.0, 0.25, 0.0),
            epsilon = 1e-3
        );
    }
}

#[test]
fn noisy_detections_report_a_residual() {
    let target = Point3::new(0.0, 0.0, 0.5);
    let a = aimed("a", Point3::new(-3.0, 0.0, 4.0), target);
    let b = aimed("b", Point3::new(3.0, 0.0, 4.0), target);
    let mut fa = FrameDetections::new();
    fa.insert(RED_TRIANGLE, project(&a, target).expect("visible"));
    let mut fb = FrameDetections::new();
    let px = project(&b, target).expect("visible");
    fb.insert(RED_TRIANGLE, Point2::new(px.x, px.y + 8.0));

    let solution = TriangulationSolver::default()
        .solve_sequence(&[
            NodeTrack::new(&a, std::slice::from_ref(&fa)),
            NodeTrack::new(&b, std::slice::from_ref(&fb)),
        ])
        .expect("solve");
    let point = solution.sequence.frames[0][0];
    assert!(point.residual > 1e-3);

    let ra = back_project(&a, fa[&RED_TRIANGLE]);
    let rb = back_project(&b, fb[&RED_TRIANGLE]);
    let gap = mocap_solver::closest_approach(&ra, &rb, 1e-12);
    assert_relative_eq!(point.residual, gap.distance(), epsilon = 1e-12);
}

#[test]
fn truncation_is_silent_under_truncate_policy() {
    let target = Point3::new(0.0, 0.0, 0.5);
    let a = aimed("a", Point3::new(-3.0, 0.0, 4.0), target);
    let b = aimed("b", Point3::new(3.0, 0.0, 4.0), target);
    let fa = track_of(&a, 3, &[RED_TRIANGLE]);
    let fb = track_of(&b, 5, &[RED_TRIANGLE]);

    let solver = TriangulationSolver::new(SolverParams {
        frame_count_policy: FrameCountPolicy::Truncate,
        ..SolverParams::default()
    });
    let solution = solver
        .solve_sequence(&[
            NodeTrack::new(&a, &fa),
            NodeTrack::new(&b, &fb),
        ])
        .expect("solve");
    assert_eq!(solution.sequence.len(), 3);
    assert_eq!(solution.dropped_frames, vec![("b".to_string(), 2)]);
}

#[test]
fn solved_sequence_serializes_as_frame_lists() {
    let target = Point3::new(0.0, 0.0, 0.5);
    let a = aimed("a", Point3::new(-3.0, 0.0, 4.0), target);
    let b = aimed("b", Point3::new(3.0, 0.0, 4.0), target);
    let fa = track_of(&a, 2, &[RED_TRIANGLE]);
    let fb = track_of(&b, 2, &[RED_TRIANGLE]);
    let solution = TriangulationSolver::default()
        .solve_sequence(&[
            NodeTrack::new(&a, &fa),
            NodeTrack::new(&b, &fb),
        ])
        .expect("solve");

    let json = serde_json::to_value(&solution.sequence).expect("serialize");
    let frames = json.as_array().expect("array of frames");
    assert_eq!(frames.len(), 2);
    let entry = frames[1][0].as_array().expect("entry tuple");
    assert_eq!(entry.len(), 3);
    assert_eq!(entry[0], "red triangle");
    assert_eq!(entry[1].as_array().map(Vec::len), Some(3));
    assert!(entry[2].is_f64());

    let back: SolvedSequence = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, solution.sequence);
}

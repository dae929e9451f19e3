use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use mocap_core::io::{session_workspace, solved_file_name, ArtifactKind};
use mocap_core::{
    Camera, CameraIntrinsics, CameraStore, IoError, NodeCaptureResult, PoseProvider, Resolution,
    SessionId,
};
use mocap_session::{RetrievedArtifact, Session, SessionError, SessionState};
use mocap_solver::{NodeTrack, SolveError, SolverParams, TriangulationSolver};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum MocapError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Artifact(#[from] IoError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("no node results found for session {session}")]
    NoResults { session: SessionId },
}

/// What [`solve_session`] did.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveSummary {
    /// The written `<sessionID>.solved` file.
    pub output: PathBuf,
    /// Hosts whose results took part, sorted.
    pub cameras: Vec<String>,
    /// Hosts left out, with the reason.
    pub excluded: Vec<(String, String)>,
    pub frames: usize,
    pub points: usize,
    pub dropped_frames: Vec<(String, usize)>,
}

/// Host names of the `<host>_<sessionID>.mocap` files in `workspace`, sorted.
fn node_results(workspace: &Path, session: &SessionId) -> Result<Vec<(String, PathBuf)>, MocapError> {
    let suffix = format!("_{session}.{}", ArtifactKind::Mocap.extension());
    let mut found = Vec::new();
    for entry in fs::read_dir(workspace)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(host) = name.strip_suffix(&suffix) {
            if !host.is_empty() {
                found.push((host.to_string(), path.clone()));
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Triangulate a retrieved capture session.
///
/// Reads every node result in `<workspace_root>/<sessionID>/`, pairs it with
/// the node's camera from `poses` and writes `<sessionID>.solved` next to
/// them. Nodes with an unreadable result or no usable calibration are left
/// out; at least two must remain. If the session record is present and in
/// the `retrieved` state it is advanced to `solved`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(session = %session))
)]
pub fn solve_session(
    workspace_root: impl AsRef<Path>,
    session: &SessionId,
    poses: &impl PoseProvider,
    params: &SolverParams,
) -> Result<SolveSummary, MocapError> {
    let workspace = session_workspace(&workspace_root, session);
    let results = node_results(&workspace, session)?;
    if results.is_empty() {
        return Err(MocapError::NoResults {
            session: session.clone(),
        });
    }

    let mut excluded = Vec::new();
    let mut nodes: Vec<(Camera, NodeCaptureResult)> = Vec::with_capacity(results.len());
    for (host, path) in results {
        let result = match NodeCaptureResult::load_json(&path) {
            Ok(result) => result,
            Err(err) => {
                warn!("{host}: unreadable result {}: {err}", path.display());
                excluded.push((host, err.to_string()));
                continue;
            }
        };
        let camera = match poses.camera(&host) {
            Ok(camera) => camera,
            Err(err) => {
                warn!("{err}");
                excluded.push((host, err.reason));
                continue;
            }
        };
        if let Err(reason) = check_frame_size(&camera, result.resolution) {
            warn!("{host}: {reason}");
            excluded.push((host, reason));
            continue;
        }
        nodes.push((camera, result));
    }

    let tracks: Vec<NodeTrack<'_>> = nodes
        .iter()
        .map(|(camera, result)| NodeTrack::new(camera, &result.frames).at(result.resolution))
        .collect();
    let solution = TriangulationSolver::new(params.clone()).solve_sequence(&tracks)?;

    let output = workspace.join(solved_file_name(session));
    solution.sequence.write_json(&output)?;
    info!(
        "session {session}: {} point(s) over {} frame(s) -> {}",
        solution.sequence.point_count(),
        solution.sequence.len(),
        output.display()
    );

    mark_solved(&workspace, session);

    Ok(SolveSummary {
        output,
        cameras: nodes.iter().map(|(camera, _)| camera.host.clone()).collect(),
        excluded,
        frames: solution.sequence.len(),
        points: solution.sequence.point_count(),
        dropped_frames: solution.dropped_frames,
    })
}

/// A uniformly scaled capture mode is accepted. A different aspect ratio is a
/// cropped sensor area outside what the calibrated field of view describes.
fn check_frame_size(camera: &Camera, frame: Resolution) -> Result<(), String> {
    let calibrated = camera.resolution();
    if frame == calibrated {
        return Ok(());
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(format!("empty frame size {}x{}", frame.width, frame.height));
    }
    let aspect = |r: Resolution| r.width as f64 / r.height as f64;
    if (aspect(frame) / aspect(calibrated) - 1.0).abs() > ASPECT_TOLERANCE {
        return Err(format!(
            "frames are {}x{} but the calibration is {}x{}",
            frame.width, frame.height, calibrated.width, calibrated.height
        ));
    }
    debug!(
        "{}: rescaling {}x{} detections to the {}x{} calibration",
        camera.host, frame.width, frame.height, calibrated.width, calibrated.height
    );
    Ok(())
}

const ASPECT_TOLERANCE: f64 = 0.01;

fn mark_solved(workspace: &Path, session: &SessionId) {
    let record = workspace.join(format!("{session}.session"));
    if !record.exists() {
        return;
    }
    let mut stored = match Session::load_json(&record) {
        Ok(stored) => stored,
        Err(err) => {
            warn!("could not read {}: {err}", record.display());
            return;
        }
    };
    if stored.state() != SessionState::Retrieved {
        return;
    }
    if let Err(err) = stored
        .advance(SessionState::Solved)
        .map_err(MocapError::from)
        .and_then(|()| stored.write_json(&record).map_err(MocapError::from))
    {
        warn!("could not update {}: {err}", record.display());
    }
}

/// Move the calibration exports of a finished calibration session into `store`.
///
/// Returns each host with the archive of the calibration it replaced.
pub fn install_calibrations(
    artifacts: &[RetrievedArtifact],
    store: &CameraStore,
) -> Result<Vec<(String, Option<PathBuf>)>, MocapError> {
    artifacts
        .iter()
        .map(|artifact| {
            let intrinsics = CameraIntrinsics::load_json(&artifact.path)?;
            let archived = store.install_calibration(&artifact.host, &intrinsics)?;
            Ok((artifact.host.clone(), archived))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_core::{
        CalibrationUnavailable, CaptureConfig, FrameDetections, MarkerColor, MarkerIdentity,
        MarkerPattern, WorldPose,
    };
    use mocap_solver::project_at;
    use nalgebra::{Point3, Rotation3, Vector3};
    use std::collections::HashMap;

    const GREEN_SQUARE: MarkerIdentity =
        MarkerIdentity::new(MarkerColor::Green, MarkerPattern::Square);

    struct Rig(HashMap<String, Camera>);

    impl PoseProvider for Rig {
        fn camera(&self, host: &str) -> Result<Camera, CalibrationUnavailable> {
            self.0.get(host).cloned().ok_or_else(|| CalibrationUnavailable {
                host: host.to_string(),
                reason: "not in rig".into(),
            })
        }
    }

    fn camera_at(host: &str, position: Point3<f64>) -> Camera {
        let d = -position.coords.normalize();
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), d.y.atan2(-d.z))
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -d.x.asin());
        let (x, y, z) = rot.euler_angles();
        Camera::new(
            host,
            CameraIntrinsics {
                camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                distortion: Vec::new(),
                fov: [62.2, 48.8],
                resolution: Resolution::new(1632, 1232),
            },
            WorldPose::new(position, Vector3::new(x, y, z)),
        )
    }

    fn write_result(workspace: &Path, session: &SessionId, camera: &Camera, points: &[Point3<f64>]) {
        write_result_at(workspace, session, camera, camera.resolution(), points);
    }

    fn write_result_at(
        workspace: &Path,
        session: &SessionId,
        camera: &Camera,
        resolution: Resolution,
        points: &[Point3<f64>],
    ) {
        let frames = points
            .iter()
            .map(|p| {
                let mut frame = FrameDetections::new();
                frame.insert(GREEN_SQUARE, project_at(camera, resolution, *p).expect("in view"));
                frame
            })
            .collect();
        NodeCaptureResult {
            host: camera.host.clone(),
            session: session.clone(),
            resolution,
            frames,
        }
        .write_json(workspace.join(format!("{}_{session}.mocap", camera.host)))
        .expect("write result");
    }

    fn rig(cameras: &[Camera]) -> Rig {
        Rig(cameras.iter().map(|c| (c.host.clone(), c.clone())).collect())
    }

    #[test]
    fn uncalibrated_nodes_are_left_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "5eed".parse().expect("id");
        let workspace = session_workspace(dir.path(), &session);
        fs::create_dir_all(&workspace).expect("workspace");

        let a = camera_at("cam-a", Point3::new(4.0, 0.5, 3.0));
        let b = camera_at("cam-b", Point3::new(-3.0, 1.0, 4.0));
        let c = camera_at("cam-c", Point3::new(0.0, 3.0, 5.0));
        let points = [Point3::new(0.1, 0.2, 0.0), Point3::new(-0.3, 0.0, 0.25)];
        for camera in [&a, &b, &c] {
            write_result(&workspace, &session, camera, &points);
        }
        fs::write(workspace.join("notes.txt"), "ignored").expect("notes");

        let summary = solve_session(dir.path(), &session, &rig(&[a, b]), &SolverParams::default())
            .expect("solve");
        assert_eq!(summary.cameras, vec!["cam-a", "cam-b"]);
        assert_eq!(summary.excluded.len(), 1);
        assert_eq!(summary.excluded[0].0, "cam-c");
        assert_eq!((summary.frames, summary.points), (2, 2));

        let solved = mocap_core::SolvedSequence::load_json(&summary.output).expect("solved");
        for (frame, expected) in points.iter().enumerate() {
            approx::assert_abs_diff_eq!(solved.frames[frame][0].position, *expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn detections_are_read_at_the_recorded_frame_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "0816".parse().expect("id");
        let workspace = session_workspace(dir.path(), &session);
        fs::create_dir_all(&workspace).expect("workspace");

        let a = camera_at("cam-a", Point3::new(4.0, 0.5, 3.0));
        let b = camera_at("cam-b", Point3::new(-3.0, 1.0, 4.0));
        let points = [Point3::new(0.3, 0.2, 0.1), Point3::new(-0.2, 0.1, 0.0)];
        let half = Resolution::new(816, 616);
        write_result_at(&workspace, &session, &a, half, &points);
        write_result_at(&workspace, &session, &b, half, &points);

        let summary = solve_session(dir.path(), &session, &rig(&[a, b]), &SolverParams::default())
            .expect("solve");
        assert!(summary.excluded.is_empty());
        let solved = mocap_core::SolvedSequence::load_json(&summary.output).expect("solved");
        for (frame, expected) in points.iter().enumerate() {
            approx::assert_abs_diff_eq!(solved.frames[frame][0].position, *expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn cropped_frames_are_left_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "c0de".parse().expect("id");
        let workspace = session_workspace(dir.path(), &session);
        fs::create_dir_all(&workspace).expect("workspace");

        let a = camera_at("cam-a", Point3::new(4.0, 0.5, 3.0));
        let b = camera_at("cam-b", Point3::new(-3.0, 1.0, 4.0));
        let c = camera_at("cam-c", Point3::new(0.0, 3.0, 5.0));
        let points = [Point3::origin()];
        write_result(&workspace, &session, &a, &points);
        write_result(&workspace, &session, &b, &points);
        write_result_at(&workspace, &session, &c, Resolution::new(1280, 720), &points);

        let summary = solve_session(dir.path(), &session, &rig(&[a, b, c]), &SolverParams::default())
            .expect("solve");
        assert_eq!(summary.cameras, vec!["cam-a", "cam-b"]);
        assert_eq!(summary.excluded.len(), 1);
        assert_eq!(summary.excluded[0].0, "cam-c");
        assert!(summary.excluded[0].1.contains("1280x720"));
    }

    #[test]
    fn one_calibrated_node_is_not_enough() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "beef".parse().expect("id");
        let workspace = session_workspace(dir.path(), &session);
        fs::create_dir_all(&workspace).expect("workspace");
        let a = camera_at("cam-a", Point3::new(4.0, 0.5, 3.0));
        write_result(&workspace, &session, &a, &[Point3::origin()]);

        let err = solve_session(dir.path(), &session, &rig(&[a]), &SolverParams::default())
            .expect_err("one view");
        assert!(matches!(
            err,
            MocapError::Solve(SolveError::NotEnoughViews { available: 1 })
        ));
    }

    #[test]
    fn empty_workspace_has_no_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "f00d".parse().expect("id");
        fs::create_dir_all(session_workspace(dir.path(), &session)).expect("workspace");
        let err = solve_session(dir.path(), &session, &rig(&[]), &SolverParams::default())
            .expect_err("empty");
        assert!(matches!(err, MocapError::NoResults { .. }));
    }

    #[test]
    fn retrieved_record_is_marked_solved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session: SessionId = "abcd".parse().expect("id");
        let workspace = session_workspace(dir.path(), &session);
        fs::create_dir_all(&workspace).expect("workspace");

        let mut record = Session::new(session.clone(), CaptureConfig::default(), vec![]);
        for state in [
            SessionState::Synchronizing,
            SessionState::Recording,
            SessionState::Processing,
            SessionState::Retrieved,
        ] {
            record.advance(state).expect("advance");
        }
        let record_path = record.record_path(dir.path());
        record.write_json(&record_path).expect("record");

        let a = camera_at("cam-a", Point3::new(4.0, 0.5, 3.0));
        let b = camera_at("cam-b", Point3::new(-3.0, 1.0, 4.0));
        for camera in [&a, &b] {
            write_result(&workspace, &session, camera, &[Point3::origin()]);
        }
        solve_session(dir.path(), &session, &rig(&[a, b]), &SolverParams::default())
            .expect("solve");

        let stored = Session::load_json(&record_path).expect("record");
        assert_eq!(stored.state(), SessionState::Solved);
    }

    #[test]
    fn calibration_exports_are_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let export = dir.path().join("cam-a_9-6-0a1b.calibration");
        let intrinsics = camera_at("cam-a", Point3::new(1.0, 1.0, 1.0)).intrinsics;
        intrinsics.write_json(&export).expect("export");

        let store = CameraStore::new(dir.path().join("cameras"));
        let installed = install_calibrations(
            &[RetrievedArtifact {
                host: "cam-a".into(),
                path: export,
            }],
            &store,
        )
        .expect("install");
        assert_eq!(installed, vec![("cam-a".to_string(), None)]);
        assert_eq!(
            CameraIntrinsics::load_json(store.calibration_path("cam-a")).expect("installed"),
            intrinsics
        );
    }
}

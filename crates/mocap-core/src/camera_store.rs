use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::io::IoError;
use crate::{Camera, CameraIntrinsics, WorldPose};

/// Reason a camera cannot take part in triangulation.
#[derive(thiserror::Error, Debug)]
#[error("calibration unavailable for {host}: {reason}")]
pub struct CalibrationUnavailable {
    pub host: String,
    pub reason: String,
}

/// Source of per-camera intrinsics and world pose.
pub trait PoseProvider {
    fn camera(&self, host: &str) -> Result<Camera, CalibrationUnavailable>;
}

/// Directory-backed camera parameters.
///
/// Holds `<host>.calibration` (lens calibration) and `<host>.pose` (world pose)
/// for every node.
#[derive(Clone, Debug)]
pub struct CameraStore {
    root: PathBuf,
}

impl CameraStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calibration_path(&self, host: &str) -> PathBuf {
        self.root.join(format!("{host}.calibration"))
    }

    pub fn pose_path(&self, host: &str) -> PathBuf {
        self.root.join(format!("{host}.pose"))
    }

    /// Replace a host's calibration in one step.
    ///
    /// The new file is written next to the old one and renamed over it; the
    /// previous calibration, if any, is kept as
    /// `<host>.calibration.<unix-seconds>.bak`. Returns the archive path.
    pub fn install_calibration(
        &self,
        host: &str,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Option<PathBuf>, IoError> {
        fs::create_dir_all(&self.root)?;
        let target = self.calibration_path(host);

        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        staged.write_all(serde_json::to_string_pretty(intrinsics)?.as_bytes())?;
        staged.as_file().sync_all()?;

        let archived = if target.exists() {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let archive = self
                .root
                .join(format!("{host}.calibration.{stamp}.bak"));
            fs::copy(&target, &archive)?;
            debug!("archived {} to {}", target.display(), archive.display());
            Some(archive)
        } else {
            None
        };

        staged.persist(&target).map_err(|e| IoError::Io(e.error))?;
        info!("installed calibration for {host} at {}", target.display());
        Ok(archived)
    }

    pub fn write_pose(&self, host: &str, pose: &WorldPose) -> Result<(), IoError> {
        fs::create_dir_all(&self.root)?;
        pose.write_json(self.pose_path(host))
    }
}

impl PoseProvider for CameraStore {
    fn camera(&self, host: &str) -> Result<Camera, CalibrationUnavailable> {
        let unavailable = |what: &str, path: &Path, err: IoError| CalibrationUnavailable {
            host: host.to_string(),
            reason: format!("{what} {}: {err}", path.display()),
        };
        let cal_path = self.calibration_path(host);
        let intrinsics = CameraIntrinsics::load_json(&cal_path)
            .map_err(|e| unavailable("calibration", &cal_path, e))?;
        let pose_path = self.pose_path(host);
        let pose =
            WorldPose::load_json(&pose_path).map_err(|e| unavailable("pose", &pose_path, e))?;
        Ok(Camera::new(host, intrinsics, pose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resolution;
    use nalgebra::{Point3, Vector3};

    fn intrinsics(fov: f64) -> CameraIntrinsics {
        CameraIntrinsics {
            camera_matrix: [[1000.0, 0.0, 816.0], [0.0, 1000.0, 616.0], [0.0, 0.0, 1.0]],
            distortion: vec![0.0; 5],
            fov: [fov, fov * 0.75],
            resolution: Resolution::default(),
        }
    }

    #[test]
    fn missing_files_mean_calibration_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CameraStore::new(dir.path());
        let err = store.camera("cam9").expect_err("no files");
        assert_eq!(err.host, "cam9");

        store.install_calibration("cam9", &intrinsics(60.0)).expect("install");
        let err = store.camera("cam9").expect_err("no pose yet");
        assert!(err.reason.starts_with("pose"));
    }

    #[test]
    fn recalibration_replaces_and_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CameraStore::new(dir.path());
        let pose = WorldPose::new(Point3::new(0.0, 0.0, 5.0), Vector3::zeros());
        store.write_pose("cam1", &pose).expect("pose");

        assert!(store
            .install_calibration("cam1", &intrinsics(60.0))
            .expect("first")
            .is_none());
        let archive = store
            .install_calibration("cam1", &intrinsics(70.0))
            .expect("second")
            .expect("archived");

        let old = CameraIntrinsics::load_json(&archive).expect("archive readable");
        assert_eq!(old.fov[0], 60.0);
        let camera = store.camera("cam1").expect("camera");
        assert_eq!(camera.intrinsics.fov[0], 70.0);
        assert_eq!(camera.pose, pose);
    }
}

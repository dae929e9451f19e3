use std::path::{Path, PathBuf};

use mocap_core::{io, IoError};
use mocap_session::CoordinatorConfig;
use mocap_solver::SolverParams;
use serde::{Deserialize, Serialize};

fn default_cameras_dir() -> PathBuf {
    PathBuf::from("cameras")
}

/// Deployment configuration: nodes, session defaults, camera store and solver.
///
/// Coordinator fields sit at the top level of the file; solver parameters go
/// under `"solver"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MocapConfig {
    #[serde(flatten)]
    pub coordinator: CoordinatorConfig,
    /// Directory holding `<host>.calibration` and `<host>.pose` files.
    #[serde(default = "default_cameras_dir")]
    pub cameras_dir: PathBuf,
    #[serde(default)]
    pub solver: SolverParams,
}

impl Default for MocapConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            cameras_dir: default_cameras_dir(),
            solver: SolverParams::default(),
        }
    }
}

impl MocapConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        io::read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        io::write_json(self, path)
    }
}

//! On-disk artifacts: node detection files, calibration exports, world poses
//! and solved sequences. Everything is JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{CameraIntrinsics, FrameDetections, Resolution, SessionId, SolvedSequence, WorldPose};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, IoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Kinds of per-node result files a session can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Mocap,
    Calibration,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Mocap => "mocap",
            ArtifactKind::Calibration => "calibration",
        }
    }
}

/// `<host>_<sessionID>.<ext>`
pub fn artifact_file_name(host: &str, session: &SessionId, kind: ArtifactKind) -> String {
    format!("{host}_{session}.{}", kind.extension())
}

/// `<workspace_root>/<sessionID>`
pub fn session_workspace(root: impl AsRef<Path>, session: &SessionId) -> PathBuf {
    root.as_ref().join(session.to_string())
}

/// `<sessionID>.solved`
pub fn solved_file_name(session: &SessionId) -> String {
    format!("{session}.solved")
}

/// Per-frame detections recorded by one node over one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeCaptureResult {
    pub host: String,
    pub session: SessionId,
    pub resolution: Resolution,
    pub frames: Vec<FrameDetections>,
}

impl NodeCaptureResult {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }
}

impl CameraIntrinsics {
    /// Load a calibration export.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        read_json(path)
    }

    /// Write a calibration export; matrix, distortion and FOV are written as a unit.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }
}

impl WorldPose {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }
}

impl SolvedSequence {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }
}

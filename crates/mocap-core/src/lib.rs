//! Core data model for synchronized multi-node motion capture.
//!
//! This crate holds the types every other crate agrees on: marker identities
//! and per-frame detections, calibrated cameras, capture configuration,
//! session identifiers, the node line protocol vocabulary and the JSON
//! artifacts exchanged between nodes, coordinator and solver. It does no
//! networking and no geometry.

mod camera;
mod camera_store;
mod config;
pub mod io;
mod logger;
mod marker;
pub mod protocol;
mod session_id;
mod solved;

pub use camera::{Camera, CameraIntrinsics, WorldPose};
pub use camera_store::{CalibrationUnavailable, CameraStore, PoseProvider};
pub use config::{
    AwbGains, CaptureConfig, Resolution, DURATION_PRESETS, FRAME_RATE_PRESETS, ISO_PRESETS,
    SHUTTER_PRESETS,
};
pub use io::{ArtifactKind, IoError, NodeCaptureResult};
pub use marker::{FrameDetections, MarkerColor, MarkerIdentity, MarkerPattern, ParseIdentityError};
pub use session_id::{ParseSessionIdError, SessionId, SessionKind};
pub use solved::{SolvedPoint, SolvedSequence};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

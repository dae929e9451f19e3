use mocap_core::IoError;

/// Failure of a single frame or a collaborator call.
///
/// Inside the detection pipeline these are isolated to the frame that raised
/// them; elsewhere they are wrapped in [`AgentError`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("marker identification failed: {0}")]
    Identify(String),
    #[error("sensor capture failed: {0}")]
    Capture(String),
    #[error("lens calibration failed: {0}")]
    Calibrate(String),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },
    #[error("coordinator disconnected while waiting for {field}")]
    Disconnected { field: &'static str },
    #[error("recording failed")]
    Capture(#[source] FrameError),
    #[error("processing failed: {0}")]
    Pipeline(String),
    #[error("export failed")]
    Export(#[source] IoError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

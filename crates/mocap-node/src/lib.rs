//! Capture node agent.
//!
//! A node answers the coordinator's handshake prompts, waits out the
//! negotiated record delay, records into an append-only [`FrameBuffer`] and,
//! once recording ends, freezes it into a [`FrameArena`] that a bounded rayon
//! pool processes in four contiguous chunks. Results come back over a channel
//! and are reassembled in frame order; a frame whose decoding or marker
//! identification fails keeps an empty detection map instead of failing the
//! node.
//!
//! Sensor access, pixel decoding, marker identification and lens calibration
//! are collaborators behind the [`FrameSource`], [`FrameDecoder`],
//! [`MarkerIdentifier`] and [`LensCalibrator`] traits. [`ReplaySource`],
//! [`PackedRgbDecoder`] and [`ColorCentroidIdentifier`] are simple stand-ins
//! for running a node from recorded frames.

mod agent;
mod buffer;
mod collab;
mod error;
mod pipeline;

pub use agent::{AgentReport, AgentSettings, CaptureAgent};
pub use buffer::{FrameArena, FrameBuffer};
pub use collab::{
    ColorCentroidIdentifier, FrameDecoder, FrameSource, LensCalibrator, MarkerIdentifier,
    PackedRgbDecoder, ReplaySource,
};
pub use error::{AgentError, FrameError};
pub use pipeline::{DetectionPipeline, PipelineOutput, PIPELINE_CHUNKS};

//! Session coordinator.
//!
//! The coordinator talks to every capture node over a line-oriented
//! [`NodeLink`] (an `ssh` child process in production, any reader/writer
//! pair otherwise). Each node gets its own thread: it answers the node's
//! configuration prompts, then reports readiness to a barrier. Once every
//! node is ready the coordinator fixes a common start instant and each
//! thread sends its node the remaining delay, corrected for the measured
//! link latency. Telemetry and result files are then collected per node.
//!
//! A handshake failure anywhere cancels all node threads and fails the
//! session; after the start, a node that fails only drops out of the results.

mod config;
mod coordinator;
mod error;
mod handshake;
mod link;
mod retrieve;
mod session;

pub use config::{CoordinatorConfig, NodeConfig};
pub use coordinator::{Coordinator, NodePlan, SessionReport, SyncPlan};
pub use error::{FailureKind, SessionError};
pub use handshake::{configure_node, hold_for_prompt, read_telemetry, NodeReady, NodeTelemetry};
pub use link::{LinkError, NodeLink, SshConnector, SshLink, StreamLink};
pub use retrieve::{retrieve_result, retrieve_results, NodeFailure, RetrievedArtifact};
pub use session::{Session, SessionState};

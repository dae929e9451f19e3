//! High-level facade crate for the `mocap-*` workspace.
//!
//! This crate provides:
//! - re-exports of the underlying crates under short names
//! - [`MocapConfig`], the single JSON file that drives a deployment
//! - the offline half of a session: [`solve_session`] turns the per-node
//!   `.mocap` files retrieved into a session workspace into a `.solved`
//!   sequence, and [`install_calibrations`] moves calibration exports into
//!   the camera store.
//!
//! ## Quickstart
//!
//! ```no_run
//! use mocap::{solve_session, CameraStore, MocapConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MocapConfig::load_json("mocap.json")?;
//! let cameras = CameraStore::new(&config.cameras_dir);
//! let session: mocap::SessionId = "0a1b".parse()?;
//! let summary = solve_session(
//!     &config.coordinator.workspace_root,
//!     &session,
//!     &cameras,
//!     &config.solver,
//! )?;
//! println!("{} points in {} frames", summary.points, summary.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `mocap::core`: markers, cameras, capture configuration, session ids, artifacts.
//! - `mocap::solver`: ray geometry and multi-view triangulation.
//! - `mocap::node`: capture agent and parallel detection pipeline.
//! - `mocap::session`: node links, handshake and the session coordinator.

mod config;
mod solve;

pub use mocap_core as core;
pub use mocap_node as node;
pub use mocap_session as session;
pub use mocap_solver as solver;

pub use config::MocapConfig;
pub use solve::{install_calibrations, solve_session, MocapError, SolveSummary};

pub use mocap_core::{Camera, CameraStore, PoseProvider, SessionId, SolvedSequence};
pub use mocap_session::{Coordinator, CoordinatorConfig, Session, SessionState};
pub use mocap_solver::{FrameCountPolicy, SolverParams, TriangulationSolver};

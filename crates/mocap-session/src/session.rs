use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info};
use mocap_core::{io, ArtifactKind, CaptureConfig, IoError, SessionId, SessionKind};
use serde::{Deserialize, Serialize};

use crate::{FailureKind, SessionError};

/// Lifecycle of a capture session.
///
/// `Configuring → Synchronizing → Recording → Processing → Retrieved → Solved`,
/// with `Failed` reachable from any state that is not terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Configuring,
    Synchronizing,
    Recording,
    Processing,
    Retrieved,
    Solved,
    Failed(FailureKind),
}

impl SessionState {
    fn successor(self) -> Option<SessionState> {
        match self {
            SessionState::Configuring => Some(SessionState::Synchronizing),
            SessionState::Synchronizing => Some(SessionState::Recording),
            SessionState::Recording => Some(SessionState::Processing),
            SessionState::Processing => Some(SessionState::Retrieved),
            SessionState::Retrieved => Some(SessionState::Solved),
            SessionState::Solved | SessionState::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Configuring => f.write_str("configuring"),
            SessionState::Synchronizing => f.write_str("synchronizing"),
            SessionState::Recording => f.write_str("recording"),
            SessionState::Processing => f.write_str("processing"),
            SessionState::Retrieved => f.write_str("retrieved"),
            SessionState::Solved => f.write_str("solved"),
            SessionState::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// One capture or calibration session and its progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub config: CaptureConfig,
    /// Participating node hosts, in configuration order.
    pub nodes: Vec<String>,
    state: SessionState,
    /// Message of the error that failed the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl Session {
    pub fn new(id: SessionId, config: CaptureConfig, nodes: Vec<String>) -> Self {
        Self {
            id,
            config,
            nodes,
            state: SessionState::Configuring,
            failure: None,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn kind(&self) -> SessionKind {
        self.id.kind()
    }

    /// Artifact type the nodes export for this session.
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self.kind() {
            SessionKind::Capture => ArtifactKind::Mocap,
            SessionKind::Calibration => ArtifactKind::Calibration,
        }
    }

    /// Nodes that must deliver results for the session to count.
    pub fn required_results(&self) -> usize {
        match self.kind() {
            SessionKind::Capture => 2,
            SessionKind::Calibration => 1,
        }
    }

    /// Move to the next lifecycle state; skipping or going back is an error.
    pub fn advance(&mut self, to: SessionState) -> Result<(), SessionError> {
        if self.state.successor() != Some(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        info!("session {}: {} -> {to}", self.id, self.state);
        self.state = to;
        Ok(())
    }

    /// Record a fatal error. Terminal sessions keep their state.
    pub fn fail(&mut self, err: &SessionError) {
        if self.state.is_terminal() {
            return;
        }
        error!("session {} failed while {}: {err}", self.id, self.state);
        self.state = SessionState::Failed(err.kind());
        self.failure = Some(err.to_string());
    }

    /// `<workspace_root>/<sessionID>`
    pub fn workspace(&self, root: impl AsRef<Path>) -> PathBuf {
        io::session_workspace(root, &self.id)
    }

    /// `<workspace>/<sessionID>.session`
    pub fn record_path(&self, root: impl AsRef<Path>) -> PathBuf {
        self.workspace(root).join(format!("{}.session", self.id))
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        io::read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        io::write_json(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            "3fa9".parse().expect("id"),
            CaptureConfig::default(),
            vec!["a".into(), "b".into()],
        )
    }

    #[test]
    fn lifecycle_runs_in_order() {
        let mut s = session();
        for next in [
            SessionState::Synchronizing,
            SessionState::Recording,
            SessionState::Processing,
            SessionState::Retrieved,
            SessionState::Solved,
        ] {
            s.advance(next).expect("advance");
        }
        assert!(s.state().is_terminal());
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut s = session();
        let err = s.advance(SessionState::Recording).expect_err("skip");
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Configuring,
                to: SessionState::Recording
            }
        ));
        assert_eq!(s.state(), SessionState::Configuring);
    }

    #[test]
    fn failure_is_reachable_from_any_live_state_and_sticks() {
        let mut s = session();
        s.advance(SessionState::Synchronizing).expect("advance");
        s.fail(&SessionError::Cancelled { host: "b".into() });
        assert_eq!(s.state(), SessionState::Failed(FailureKind::Cancelled));

        s.fail(&SessionError::NotEnoughResults {
            available: 0,
            required: 2,
        });
        assert_eq!(s.state(), SessionState::Failed(FailureKind::Cancelled));
        assert!(s.advance(SessionState::Recording).is_err());
    }

    #[test]
    fn record_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut s = session();
        s.fail(&SessionError::HandshakeMismatch {
            host: "a".into(),
            expected: "ISO".into(),
            received: "Error".into(),
        });
        let path = s.record_path(dir.path());
        assert!(path.ends_with("3fa9/3fa9.session"));
        s.write_json(&path).expect("write");
        let back = Session::load_json(&path).expect("load");
        assert_eq!(back, s);
        assert_eq!(back.state(), SessionState::Failed(FailureKind::HandshakeMismatch));
        assert!(back.failure().expect("message").contains("ISO"));
    }
}

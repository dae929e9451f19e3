use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use mocap_core::io::artifact_file_name;
use serde::{Deserialize, Serialize};

use crate::link::NodeLink;
use crate::{NodeTelemetry, Session, SessionError};

/// A node result file copied into the session workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedArtifact {
    pub host: String,
    pub path: PathBuf,
}

/// A node excluded from the session's results.
#[derive(Debug)]
pub struct NodeFailure {
    pub host: String,
    pub error: SessionError,
}

/// Copy one node's export into `workspace` as `<host>_<sessionID>.<ext>`.
pub fn retrieve_result<L: NodeLink + ?Sized>(
    link: &mut L,
    session: &Session,
    telemetry: &NodeTelemetry,
    workspace: &Path,
) -> Result<RetrievedArtifact, SessionError> {
    let host = link.host().to_string();
    let local = workspace.join(artifact_file_name(&host, &session.id, session.artifact_kind()));
    link.fetch(Path::new(&telemetry.export_path), &local)
        .map_err(|e| SessionError::TransferFailure {
            host: host.clone(),
            reason: e.to_string(),
        })?;
    info!("{host}: retrieved {}", local.display());
    Ok(RetrievedArtifact { host, path: local })
}

/// Retrieve every node's export; a failed transfer only excludes that node.
pub fn retrieve_results<'a, L: NodeLink + ?Sized + 'a>(
    session: &Session,
    workspace: &Path,
    nodes: impl IntoIterator<Item = (&'a mut L, &'a NodeTelemetry)>,
) -> Result<(Vec<RetrievedArtifact>, Vec<NodeFailure>), SessionError> {
    fs::create_dir_all(workspace)?;
    let mut artifacts = Vec::new();
    let mut failures = Vec::new();
    for (link, telemetry) in nodes {
        match retrieve_result(&mut *link, session, telemetry, workspace) {
            Ok(artifact) => artifacts.push(artifact),
            Err(error) => {
                warn!("{error}");
                failures.push(NodeFailure {
                    host: link.host().to_string(),
                    error,
                });
            }
        }
    }
    Ok((artifacts, failures))
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use mocap_core::{io, CaptureConfig, IoError};
use serde::{Deserialize, Serialize};

fn default_remote_dir() -> String {
    "~/mocap".to_string()
}

fn default_command() -> String {
    "./mocap-node".to_string()
}

/// How to reach one capture node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, used in artifact file names and logs.
    pub host: String,
    /// Network address; defaults to `host`.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Working directory of the agent on the node.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
    /// Command starting the agent, run inside `remote_dir`.
    #[serde(default = "default_command")]
    pub command: String,
}

impl NodeConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            address: None,
            user: None,
            remote_dir: default_remote_dir(),
            command: default_command(),
        }
    }

    /// `[user@]address`
    pub fn destination(&self) -> String {
        let address = self.address.as_deref().unwrap_or(&self.host);
        match &self.user {
            Some(user) => format!("{user}@{address}"),
            None => address.to_string(),
        }
    }

    pub fn remote_command(&self) -> String {
        format!("cd {}; {}", self.remote_dir, self.command)
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_lead_time() -> f64 {
    1.0
}

fn default_sync_tolerance() -> f64 {
    0.010
}

/// Coordinator settings, usually loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub nodes: Vec<NodeConfig>,
    /// Directory holding one workspace per session.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Time between the readiness barrier and the common start instant.
    #[serde(default = "default_lead_time")]
    pub lead_time_s: f64,
    /// Per-read limit while waiting for handshake prompts; unlimited if absent.
    #[serde(default)]
    pub read_timeout_s: Option<f64>,
    /// Per-read limit while waiting for telemetry; unlimited if absent.
    #[serde(default)]
    pub telemetry_timeout_s: Option<f64>,
    /// Largest acceptable spread of estimated link latencies.
    #[serde(default = "default_sync_tolerance")]
    pub sync_tolerance_s: f64,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            workspace_root: default_workspace_root(),
            lead_time_s: default_lead_time(),
            read_timeout_s: None,
            telemetry_timeout_s: None,
            sync_tolerance_s: default_sync_tolerance(),
            capture: CaptureConfig::default(),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl CoordinatorConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        io::read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        io::write_json(self, path)
    }

    pub fn hosts(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.host.clone()).collect()
    }

    pub fn lead_time(&self) -> Duration {
        seconds(self.lead_time_s)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_s.map(seconds)
    }

    pub fn telemetry_timeout(&self) -> Option<Duration> {
        self.telemetry_timeout_s.map(seconds)
    }

    pub fn sync_tolerance(&self) -> Duration {
        seconds(self.sync_tolerance_s)
    }
}

//! Line-oriented command channels to capture nodes.

use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::NodeConfig;
use crate::SessionError;

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("link closed")]
    Closed,
    #[error("read timed out")]
    TimedOut,
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A node's command channel.
pub trait NodeLink: Send {
    fn host(&self) -> &str;

    /// Next line from the node without its line terminator. Waits at most
    /// `timeout` when given, forever otherwise.
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<String, LinkError>;

    fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Copy a file from node storage to a local path.
    fn fetch(&mut self, remote: &Path, local: &Path) -> Result<(), LinkError>;

    /// Release the channel. Later reads report [`LinkError::Closed`].
    fn close(&mut self);
}

/// A link over any reader/writer pair.
///
/// A background thread reads lines from the node so that reads can time
/// out. [`NodeLink::fetch`] copies within the local filesystem, which suits
/// nodes that share it (local runs, tests).
pub struct StreamLink<W: Write + Send> {
    host: String,
    lines: Option<Receiver<io::Result<String>>>,
    writer: Option<W>,
}

impl<W: Write + Send> StreamLink<W> {
    pub fn new<R: Read + Send + 'static>(
        host: impl Into<String>,
        reader: R,
        writer: W,
    ) -> io::Result<Self> {
        let host = host.into();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("link-{host}"))
            .spawn(move || {
                for line in BufReader::new(reader).lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self {
            host,
            lines: Some(rx),
            writer: Some(writer),
        })
    }
}

impl<W: Write + Send> NodeLink for StreamLink<W> {
    fn host(&self) -> &str {
        &self.host
    }

    fn read_line(&mut self, timeout: Option<Duration>) -> Result<String, LinkError> {
        let lines = self.lines.as_ref().ok_or(LinkError::Closed)?;
        let line = match timeout {
            Some(timeout) => lines.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => LinkError::TimedOut,
                RecvTimeoutError::Disconnected => LinkError::Closed,
            })?,
            None => lines.recv().map_err(|_| LinkError::Closed)?,
        }?;
        Ok(line.trim_end_matches('\r').to_string())
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::Closed)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn fetch(&mut self, remote: &Path, local: &Path) -> Result<(), LinkError> {
        fs::copy(remote, local)
            .map(|_| ())
            .map_err(|e| LinkError::Transfer(format!("{}: {e}", remote.display())))
    }

    fn close(&mut self) {
        self.writer = None;
        self.lines = None;
    }
}

/// Opens node links by running the agent command over `ssh`.
#[derive(Clone, Debug)]
pub struct SshConnector {
    pub ssh: String,
    pub scp: String,
    /// Extra arguments for both programs, e.g. `-o BatchMode=yes`.
    pub options: Vec<String>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            scp: "scp".to_string(),
            options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

impl SshConnector {
    /// Start `cd <remote_dir>; <command>` on the node.
    pub fn connect(&self, node: &NodeConfig) -> Result<SshLink, SessionError> {
        let destination = node.destination();
        debug!("{}: ssh {destination} {:?}", node.host, node.remote_command());
        let mut child = Command::new(&self.ssh)
            .args(&self.options)
            .arg("-T")
            .arg(&destination)
            .arg(node.remote_command())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(SessionError::Link {
                host: node.host.clone(),
                source: LinkError::Closed,
            });
        };
        let stream = StreamLink::new(node.host.clone(), stdout, stdin)?;
        Ok(SshLink {
            stream,
            child,
            destination,
            scp: self.scp.clone(),
            options: self.options.clone(),
        })
    }
}

/// A node reached through an `ssh` child process.
pub struct SshLink {
    stream: StreamLink<ChildStdin>,
    child: Child,
    destination: String,
    scp: String,
    options: Vec<String>,
}

impl NodeLink for SshLink {
    fn host(&self) -> &str {
        self.stream.host()
    }

    fn read_line(&mut self, timeout: Option<Duration>) -> Result<String, LinkError> {
        self.stream.read_line(timeout)
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.stream.write_line(line)
    }

    fn fetch(&mut self, remote: &Path, local: &Path) -> Result<(), LinkError> {
        let source = format!("{}:{}", self.destination, remote.display());
        let status = Command::new(&self.scp)
            .args(&self.options)
            .arg("-q")
            .arg(&source)
            .arg(local)
            .stdin(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkError::Transfer(format!("scp {source} exited with {status}")))
        }
    }

    fn close(&mut self) {
        self.stream.close();
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(err) = self.child.kill() {
                    warn!("{}: could not stop ssh: {err}", self.stream.host());
                }
                let _ = self.child.wait();
            }
        }
    }
}

impl Drop for SshLink {
    fn drop(&mut self) {
        self.close();
    }
}

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use mocap_core::protocol::{format_delay, handshake_script, HandshakeField};
use mocap_core::SessionId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::handshake::{configure_node_until, read_telemetry};
use crate::link::{NodeLink, SshConnector};
use crate::retrieve::{retrieve_results, NodeFailure, RetrievedArtifact};
use crate::{CoordinatorConfig, NodeTelemetry, Session, SessionError, SessionState};

/// Start schedule for one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodePlan {
    pub host: String,
    /// Estimated one-way latency of the node's link.
    pub latency: Duration,
    /// Delay the node was asked to wait before recording.
    ///
    /// Planned as lead time minus latency at the barrier, then replaced by
    /// the value actually written to the node, which is also short by the
    /// time the node task took to pick up the start instant.
    pub delay: Duration,
}

/// Synchronized start computed at the readiness barrier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub lead_time: Duration,
    pub nodes: Vec<NodePlan>,
    /// Largest minus smallest latency.
    pub latency_spread: Duration,
    /// Whether the spread is within the configured tolerance.
    pub within_tolerance: bool,
}

impl SyncPlan {
    fn new(hosts: &[String], latencies: &[Duration], lead_time: Duration, tolerance: Duration) -> Self {
        let nodes: Vec<NodePlan> = hosts
            .iter()
            .zip(latencies)
            .map(|(host, &latency)| NodePlan {
                host: host.clone(),
                latency,
                delay: lead_time.saturating_sub(latency),
            })
            .collect();
        let max = latencies.iter().max().copied().unwrap_or_default();
        let min = latencies.iter().min().copied().unwrap_or_default();
        let latency_spread = max - min;
        Self {
            lead_time,
            nodes,
            latency_spread,
            within_tolerance: latency_spread <= tolerance,
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug)]
pub struct SessionReport {
    pub sync: SyncPlan,
    pub telemetry: Vec<(String, NodeTelemetry)>,
    pub artifacts: Vec<RetrievedArtifact>,
    /// Nodes that recorded but whose telemetry or transfer failed.
    pub excluded: Vec<NodeFailure>,
}

enum NodeEvent {
    Ready { index: usize, latency: Duration },
    Recorded { index: usize, frames: usize },
    Failed { index: usize },
}

struct NodeRun {
    host: String,
    link: Option<Box<dyn NodeLink>>,
    /// Record delay written to the node, if it got that far.
    sent_delay: Option<Duration>,
    outcome: Result<NodeTelemetry, SessionError>,
}

/// Per-node limits shared by all node tasks.
#[derive(Clone, Copy)]
struct Timeouts {
    read: Option<Duration>,
    telemetry: Option<Duration>,
}

/// Drives capture sessions across a fixed set of nodes.
#[derive(Clone, Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// New capture session, or a calibration session when `pattern` is given.
    pub fn create_session<R: Rng + ?Sized>(&self, pattern: Option<(u32, u32)>, rng: &mut R) -> Session {
        let id = match pattern {
            Some((cols, rows)) => SessionId::calibration(cols, rows, rng),
            None => SessionId::capture(rng),
        };
        let session = Session::new(id, self.config.capture.clone(), self.config.hosts());
        info!("created session {} for {} node(s)", session.id, session.nodes.len());
        session
    }

    /// Open an ssh link to every configured node.
    pub fn connect_all(&self, connector: &SshConnector) -> Result<Vec<Box<dyn NodeLink>>, SessionError> {
        self.config
            .nodes
            .iter()
            .map(|node| connector.connect(node).map(|link| Box::new(link) as Box<dyn NodeLink>))
            .collect()
    }

    /// Run `session` over one link per node, from handshake to retrieval.
    ///
    /// A handshake failure on any node cancels the others and fails the
    /// session. After the synchronized start, nodes fail independently; the
    /// session still succeeds if enough of them deliver results. The session
    /// record is written to the workspace either way.
    pub fn run(
        &self,
        session: &mut Session,
        links: Vec<Box<dyn NodeLink>>,
    ) -> Result<SessionReport, SessionError> {
        let result = self.run_inner(session, links);
        if let Err(err) = &result {
            session.fail(err);
        }
        let record = session.record_path(&self.config.workspace_root);
        if let Err(err) = session.write_json(&record) {
            error!("could not write {}: {err}", record.display());
        }
        result
    }

    fn run_inner(
        &self,
        session: &mut Session,
        links: Vec<Box<dyn NodeLink>>,
    ) -> Result<SessionReport, SessionError> {
        if session.state() != SessionState::Configuring {
            return Err(SessionError::InvalidTransition {
                from: session.state(),
                to: SessionState::Synchronizing,
            });
        }
        let hosts: Vec<String> = links.iter().map(|l| l.host().to_string()).collect();
        let script = handshake_script(&session.id, &session.config);
        let timeouts = Timeouts {
            read: self.config.read_timeout(),
            telemetry: self.config.telemetry_timeout(),
        };

        let (mut sync, runs) = thread::scope(|scope| -> Result<_, SessionError> {
            let (event_tx, events) = mpsc::channel();
            let mut starts = Vec::with_capacity(links.len());
            let mut handles = Vec::with_capacity(links.len());
            for (index, link) in links.into_iter().enumerate() {
                let (start_tx, start_rx) = mpsc::channel();
                starts.push(start_tx);
                let events = event_tx.clone();
                let script = &script;
                let handle = thread::Builder::new()
                    .name(format!("node-{}", link.host()))
                    .spawn_scoped(scope, move || {
                        node_task(index, link, script, timeouts, events, start_rx)
                    })?;
                handles.push(handle);
            }
            drop(event_tx);

            // Readiness barrier.
            let mut latencies: Vec<Option<Duration>> = vec![None; hosts.len()];
            let mut failed = None;
            while failed.is_none() && latencies.iter().any(Option::is_none) {
                match events.recv() {
                    Ok(NodeEvent::Ready { index, latency }) => latencies[index] = Some(latency),
                    Ok(NodeEvent::Failed { index }) => failed = Some(index),
                    Ok(NodeEvent::Recorded { .. }) => {}
                    Err(_) => break,
                }
            }
            if failed.is_some() || latencies.iter().any(Option::is_none) {
                drop(starts);
                let mut runs = join_all(handles, &hosts);
                for run in &mut runs {
                    if let Some(link) = run.link.as_mut() {
                        link.close();
                    }
                }
                let error = failed
                    .and_then(|i| runs.swap_remove(i).outcome.err())
                    .unwrap_or_else(|| SessionError::Cancelled {
                        host: hosts.join(","),
                    });
                return Err(error);
            }

            session.advance(SessionState::Synchronizing)?;
            let latencies: Vec<Duration> = latencies.into_iter().flatten().collect();
            let sync = SyncPlan::new(
                &hosts,
                &latencies,
                self.config.lead_time(),
                self.config.sync_tolerance(),
            );
            if !sync.within_tolerance {
                warn!(
                    "latency spread {:?} exceeds tolerance {:?}; nodes may start out of step",
                    sync.latency_spread,
                    self.config.sync_tolerance()
                );
            }
            let target = Instant::now() + sync.lead_time;
            for start in &starts {
                let _ = start.send(target);
            }
            drop(starts);
            session.advance(SessionState::Recording)?;

            let mut pending = hosts.len();
            while pending > 0 {
                match events.recv() {
                    Ok(NodeEvent::Recorded { index, frames }) => {
                        info!("{}: recorded {frames} frame(s)", hosts[index]);
                        pending -= 1;
                    }
                    Ok(NodeEvent::Failed { .. }) => pending -= 1,
                    Ok(NodeEvent::Ready { .. }) => {}
                    Err(_) => break,
                }
            }
            session.advance(SessionState::Processing)?;
            Ok((sync, join_all(handles, &hosts)))
        })?;

        for (plan, run) in sync.nodes.iter_mut().zip(&runs) {
            if let Some(delay) = run.sent_delay {
                plan.delay = delay;
            }
        }

        let mut live: Vec<(Box<dyn NodeLink>, NodeTelemetry)> = Vec::new();
        let mut excluded = Vec::new();
        for run in runs {
            match (run.link, run.outcome) {
                (Some(link), Ok(telemetry)) => live.push((link, telemetry)),
                (mut link, outcome) => {
                    if let Some(link) = link.as_mut() {
                        link.close();
                    }
                    let error = outcome.err().unwrap_or_else(|| SessionError::Cancelled {
                        host: run.host.clone(),
                    });
                    warn!("{}: excluded: {error}", run.host);
                    excluded.push(NodeFailure {
                        host: run.host,
                        error,
                    });
                }
            }
        }
        let telemetry: Vec<(String, NodeTelemetry)> = live
            .iter()
            .map(|(link, t)| (link.host().to_string(), t.clone()))
            .collect();

        let workspace = session.workspace(&self.config.workspace_root);
        let retrieved = retrieve_results(
            session,
            &workspace,
            live.iter_mut().map(|(link, t)| (link.as_mut(), &*t)),
        );
        for (link, _) in &mut live {
            link.close();
        }
        let (artifacts, failures) = retrieved?;
        excluded.extend(failures);

        if artifacts.len() < session.required_results() {
            return Err(SessionError::NotEnoughResults {
                available: artifacts.len(),
                required: session.required_results(),
            });
        }
        session.advance(SessionState::Retrieved)?;

        Ok(SessionReport {
            sync,
            telemetry,
            artifacts,
            excluded,
        })
    }
}

fn join_all(handles: Vec<thread::ScopedJoinHandle<'_, NodeRun>>, hosts: &[String]) -> Vec<NodeRun> {
    handles
        .into_iter()
        .zip(hosts)
        .map(|(handle, host)| {
            handle.join().unwrap_or_else(|_| {
                error!("{host}: node task panicked");
                NodeRun {
                    host: host.clone(),
                    link: None,
                    sent_delay: None,
                    outcome: Err(SessionError::Cancelled { host: host.clone() }),
                }
            })
        })
        .collect()
}

fn node_task(
    index: usize,
    mut link: Box<dyn NodeLink>,
    script: &[HandshakeField],
    timeouts: Timeouts,
    events: Sender<NodeEvent>,
    start: Receiver<Instant>,
) -> NodeRun {
    let host = link.host().to_string();
    let cancelled = || matches!(start.try_recv(), Err(TryRecvError::Disconnected));

    let ready = match configure_node_until(link.as_mut(), script, timeouts.read, &cancelled) {
        Ok(ready) => ready,
        Err(error) => {
            let _ = events.send(NodeEvent::Failed { index });
            link.close();
            return NodeRun {
                host,
                link: Some(link),
                sent_delay: None,
                outcome: Err(error),
            };
        }
    };
    let _ = events.send(NodeEvent::Ready {
        index,
        latency: ready.latency,
    });

    let Ok(target) = start.recv() else {
        link.close();
        return NodeRun {
            outcome: Err(SessionError::Cancelled { host: host.clone() }),
            host,
            link: Some(link),
            sent_delay: None,
        };
    };

    let delay = target
        .saturating_duration_since(Instant::now())
        .saturating_sub(ready.latency);
    if let Err(source) = link.write_line(&format_delay(delay.as_secs_f64())) {
        let _ = events.send(NodeEvent::Failed { index });
        return NodeRun {
            outcome: Err(SessionError::Link {
                host: host.clone(),
                source,
            }),
            host,
            link: Some(link),
            sent_delay: None,
        };
    }

    let mut recorded = false;
    let outcome = read_telemetry(link.as_mut(), timeouts.telemetry, |frames| {
        recorded = true;
        let _ = events.send(NodeEvent::Recorded { index, frames });
    });
    if !recorded {
        let _ = events.send(NodeEvent::Failed { index });
    }
    NodeRun {
        host,
        link: Some(link),
        sent_delay: Some(delay),
        outcome,
    }
}

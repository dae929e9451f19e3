//! Coordinator side of the node line protocol.

use std::time::{Duration, Instant};

use log::{debug, trace};
use mocap_core::protocol::{parse_telemetry_line, HandshakeField, Prompt};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::link::{LinkError, NodeLink};
use crate::SessionError;

/// Longest single blocking read, so cancellation is noticed promptly.
const POLL: Duration = Duration::from_millis(50);

/// A node that answered every configuration prompt and is waiting for its
/// record delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeReady {
    /// Estimated one-way link latency.
    pub latency: Duration,
    /// When the `Record Delay` prompt was read.
    pub ready_at: Instant,
}

/// Figures a node reports once it has recorded and processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTelemetry {
    pub frames: usize,
    pub buffer_seconds: f64,
    pub processing_seconds: f64,
    /// Result file on the node.
    pub export_path: String,
}

fn next_line(
    link: &mut dyn NodeLink,
    expecting: &str,
    timeout: Option<Duration>,
    cancelled: &dyn Fn() -> bool,
) -> Result<String, SessionError> {
    let started = Instant::now();
    loop {
        if cancelled() {
            return Err(SessionError::Cancelled {
                host: link.host().to_string(),
            });
        }
        let wait = match timeout {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) => left.min(POLL),
                None => {
                    return Err(SessionError::Timeout {
                        host: link.host().to_string(),
                        expecting: expecting.to_string(),
                    })
                }
            },
            None => POLL,
        };
        match link.read_line(Some(wait)) {
            Ok(line) if line.trim().is_empty() => trace!("{}: blank line", link.host()),
            Ok(line) => return Ok(line),
            Err(LinkError::TimedOut) => {}
            Err(LinkError::Closed) => {
                return Err(SessionError::Disconnected {
                    host: link.host().to_string(),
                    expecting: expecting.to_string(),
                })
            }
            Err(source) => {
                return Err(SessionError::Link {
                    host: link.host().to_string(),
                    source,
                })
            }
        }
    }
}

/// Read until the node prints `prompt`, skipping blank lines.
///
/// Any other non-blank line is a [`SessionError::HandshakeMismatch`].
/// Returns the instant the prompt arrived.
pub fn hold_for_prompt(
    link: &mut dyn NodeLink,
    prompt: Prompt,
    timeout: Option<Duration>,
) -> Result<Instant, SessionError> {
    wait_for_prompt(link, prompt, timeout, &|| false)
}

pub(crate) fn wait_for_prompt(
    link: &mut dyn NodeLink,
    prompt: Prompt,
    timeout: Option<Duration>,
    cancelled: &dyn Fn() -> bool,
) -> Result<Instant, SessionError> {
    let expected = prompt.as_str();
    let line = next_line(link, expected, timeout, cancelled)?;
    if line.trim_end() != expected {
        return Err(SessionError::HandshakeMismatch {
            host: link.host().to_string(),
            expected: expected.to_string(),
            received: line,
        });
    }
    Ok(Instant::now())
}

/// Answer every configuration prompt of `script`, then wait for the node to
/// ask for its record delay.
pub fn configure_node(
    link: &mut dyn NodeLink,
    script: &[HandshakeField],
    timeout: Option<Duration>,
) -> Result<NodeReady, SessionError> {
    configure_node_until(link, script, timeout, &|| false)
}

#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(host = link.host()))
)]
pub(crate) fn configure_node_until(
    link: &mut dyn NodeLink,
    script: &[HandshakeField],
    timeout: Option<Duration>,
    cancelled: &dyn Fn() -> bool,
) -> Result<NodeReady, SessionError> {
    let mut round_trips = Vec::with_capacity(script.len());
    let mut last_write: Option<Instant> = None;

    for field in script {
        let seen = wait_for_prompt(link, field.prompt, timeout, cancelled)?;
        if let Some(sent) = last_write {
            round_trips.push(seen.duration_since(sent));
        }
        for value in &field.values {
            link.write_line(value).map_err(|source| SessionError::Link {
                host: link.host().to_string(),
                source,
            })?;
        }
        debug!("{}: {} = {:?}", link.host(), field.prompt, field.values);
        last_write = Some(Instant::now());
    }

    let ready_at = wait_for_prompt(link, Prompt::RecordDelay, timeout, cancelled)?;
    if let Some(sent) = last_write {
        round_trips.push(ready_at.duration_since(sent));
    }
    let latency = median(&mut round_trips) / 2;
    debug!("{}: ready, latency ~{latency:?}", link.host());
    Ok(NodeReady { latency, ready_at })
}

fn median(samples: &mut [Duration]) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    samples.sort_unstable();
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        samples[mid]
    } else {
        (samples[mid - 1] + samples[mid]) / 2
    }
}

fn telemetry_value(
    link: &mut dyn NodeLink,
    what: &str,
    timeout: Option<Duration>,
) -> Result<(String, String), SessionError> {
    let line = next_line(link, what, timeout, &|| false)?;
    let value = parse_telemetry_line(&line)
        .map_err(|e| SessionError::TelemetryParse {
            host: link.host().to_string(),
            line: e.line,
        })?
        .trim()
        .to_string();
    Ok((line, value))
}

fn number<T: std::str::FromStr>(link: &dyn NodeLink, line: String, value: &str) -> Result<T, SessionError> {
    value.parse().map_err(|_| SessionError::TelemetryParse {
        host: link.host().to_string(),
        line,
    })
}

/// Read the four telemetry lines, in order: frame count, buffer preparation
/// time, processing time, export path. `on_recorded` runs as soon as the frame
/// count arrives.
pub fn read_telemetry(
    link: &mut dyn NodeLink,
    timeout: Option<Duration>,
    on_recorded: impl FnOnce(usize),
) -> Result<NodeTelemetry, SessionError> {
    let (line, value) = telemetry_value(link, "frame count", timeout)?;
    let frames = number(link, line, &value)?;
    on_recorded(frames);

    let (line, value) = telemetry_value(link, "buffer time", timeout)?;
    let buffer_seconds = number(link, line, &value)?;
    let (line, value) = telemetry_value(link, "processing time", timeout)?;
    let processing_seconds = number(link, line, &value)?;
    let (_, export_path) = telemetry_value(link, "export path", timeout)?;

    Ok(NodeTelemetry {
        frames,
        buffer_seconds,
        processing_seconds,
        export_path,
    })
}

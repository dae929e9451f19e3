//! Line protocol spoken between the coordinator and capture nodes.
//!
//! The node drives the conversation: it prints a prompt line, then reads one
//! line per value. Blank lines are never prompts. After recording the node
//! reports telemetry as `"<label> : <value>"` lines in a fixed order.

use std::fmt;

use crate::{CaptureConfig, SessionId};

/// Prompts a node prints, in handshake order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prompt {
    SessionId,
    Resolution,
    FrameRate,
    MaxRecording,
    Iso,
    ShutterSpeed,
    AwbMode,
    AwbGains,
    RecordDelay,
}

impl Prompt {
    /// Configuration prompts; `RecordDelay` follows once the node is ready.
    pub const CONFIGURATION: [Prompt; 8] = [
        Prompt::SessionId,
        Prompt::Resolution,
        Prompt::FrameRate,
        Prompt::MaxRecording,
        Prompt::Iso,
        Prompt::ShutterSpeed,
        Prompt::AwbMode,
        Prompt::AwbGains,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Prompt::SessionId => "Session ID",
            Prompt::Resolution => "Resolution",
            Prompt::FrameRate => "Frame Rate",
            Prompt::MaxRecording => "Max Recording",
            Prompt::Iso => "ISO",
            Prompt::ShutterSpeed => "Shutter Speed",
            Prompt::AwbMode => "AWB Mode",
            Prompt::AwbGains => "AWB Gains",
            Prompt::RecordDelay => "Record Delay",
        }
    }

    /// Number of value lines that answer this prompt.
    pub fn arity(self) -> usize {
        match self {
            Prompt::Resolution | Prompt::AwbGains => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prompt and the value lines sent in reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeField {
    pub prompt: Prompt,
    pub values: Vec<String>,
}

/// Encode a session's configuration as the ordered handshake script.
pub fn handshake_script(id: &SessionId, config: &CaptureConfig) -> Vec<HandshakeField> {
    Prompt::CONFIGURATION
        .into_iter()
        .map(|prompt| {
            let values = match prompt {
                Prompt::SessionId => vec![id.to_string()],
                Prompt::Resolution => vec![
                    config.resolution.width.to_string(),
                    config.resolution.height.to_string(),
                ],
                Prompt::FrameRate => vec![config.frame_rate.to_string()],
                Prompt::MaxRecording => vec![config.max_recording.to_string()],
                Prompt::Iso => vec![config.iso.to_string()],
                Prompt::ShutterSpeed => vec![config.shutter_speed.to_string()],
                Prompt::AwbMode => vec![config.awb_mode.clone()],
                Prompt::AwbGains => vec![
                    config.awb_gains.red.to_string(),
                    config.awb_gains.blue.to_string(),
                ],
                Prompt::RecordDelay => Vec::new(),
            };
            HandshakeField { prompt, values }
        })
        .collect()
}

/// Format a record delay (seconds) for the `Record Delay` reply.
pub fn format_delay(seconds: f64) -> String {
    format!("{seconds:.6}")
}

pub const TELEMETRY_SEPARATOR: &str = " : ";

/// Telemetry labels in the order a node reports them.
pub const TELEMETRY_FRAMES: &str = "Finished Recording";
pub const TELEMETRY_BUFFER: &str = "Finished Creating Memory Pool";
pub const TELEMETRY_PROCESSING: &str = "Multi Core Processing Finished";
pub const TELEMETRY_EXPORT: &str = "Data Exported to";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed telemetry line {line:?}")]
pub struct TelemetryParseError {
    pub line: String,
}

/// Extract the value of a `"<label> : <value>"` line.
///
/// Labels are positional, so only the separator is checked; everything after
/// the first separator is the value.
pub fn parse_telemetry_line(line: &str) -> Result<&str, TelemetryParseError> {
    line.trim_end()
        .split_once(TELEMETRY_SEPARATOR)
        .map(|(_, value)| value)
        .ok_or_else(|| TelemetryParseError {
            line: line.to_string(),
        })
}

pub fn format_telemetry_line(label: &str, value: impl fmt::Display) -> String {
    format!("{label}{TELEMETRY_SEPARATOR}{value}")
}

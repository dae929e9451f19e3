use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use mocap_core::io::artifact_file_name;
use mocap_core::protocol::{
    format_telemetry_line, Prompt, TELEMETRY_BUFFER, TELEMETRY_EXPORT, TELEMETRY_FRAMES,
    TELEMETRY_PROCESSING,
};
use mocap_core::{
    ArtifactKind, AwbGains, CaptureConfig, NodeCaptureResult, Resolution, SessionId, SessionKind,
};

use crate::{
    AgentError, DetectionPipeline, FrameArena, FrameBuffer, FrameDecoder, FrameSource,
    LensCalibrator, MarkerIdentifier,
};

/// Where and how a node agent runs.
#[derive(Clone, Debug)]
pub struct AgentSettings {
    /// Host name used in exported file names.
    pub host: String,
    /// Directory receiving `<host>_<sessionID>.<ext>` exports.
    pub export_dir: PathBuf,
    /// Detection worker threads; available cores when `None`.
    pub workers: Option<usize>,
}

/// Summary of one served session.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentReport {
    pub session: SessionId,
    pub config: CaptureConfig,
    pub record_delay: Duration,
    pub frames: usize,
    pub failed_frames: Vec<usize>,
    pub export_path: PathBuf,
}

/// The node side of the session protocol.
///
/// One call to [`CaptureAgent::serve`] answers the coordinator's handshake,
/// records, processes the recording and exports the result.
pub struct CaptureAgent {
    settings: AgentSettings,
    source: Box<dyn FrameSource>,
    decoder: Arc<dyn FrameDecoder>,
    identifier: Arc<dyn MarkerIdentifier>,
    calibrator: Option<Box<dyn LensCalibrator>>,
}

impl CaptureAgent {
    pub fn new(
        settings: AgentSettings,
        source: Box<dyn FrameSource>,
        decoder: Arc<dyn FrameDecoder>,
        identifier: Arc<dyn MarkerIdentifier>,
    ) -> Self {
        Self {
            settings,
            source,
            decoder,
            identifier,
            calibrator: None,
        }
    }

    /// Enable calibration sessions.
    pub fn with_calibrator(mut self, calibrator: Box<dyn LensCalibrator>) -> Self {
        self.calibrator = Some(calibrator);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run one session over a line channel to the coordinator.
    pub fn serve<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut output: W,
    ) -> Result<AgentReport, AgentError> {
        let mut channel = Channel {
            input: &mut input,
            output: &mut output,
        };
        let (session, config) = channel.handshake()?;
        info!(
            "{}: session {session} at {}x{} {} fps for {} s",
            self.settings.host,
            config.resolution.width,
            config.resolution.height,
            config.frame_rate,
            config.max_recording
        );

        let delay = channel.prompt_one(Prompt::RecordDelay)?;
        let record_delay = parse_delay(&delay)?;
        debug!("{}: waiting {record_delay:?} before recording", self.settings.host);
        std::thread::sleep(record_delay);

        let mut buffer = FrameBuffer::new(config.resolution, config.max_frames());
        self.source
            .record(&config, &mut buffer)
            .map_err(AgentError::Capture)?;
        channel.telemetry(TELEMETRY_FRAMES, buffer.len())?;

        let started = Instant::now();
        let arena = buffer.flush();
        channel.telemetry(TELEMETRY_BUFFER, seconds(started))?;

        let started = Instant::now();
        let (export_path, failed_frames) = match session.kind() {
            SessionKind::Capture => self.process_capture(&session, &arena)?,
            SessionKind::Calibration => (self.process_calibration(&session, &arena)?, Vec::new()),
        };
        channel.telemetry(TELEMETRY_PROCESSING, seconds(started))?;
        channel.telemetry(TELEMETRY_EXPORT, export_path.display())?;

        Ok(AgentReport {
            session,
            config,
            record_delay,
            frames: arena.len(),
            failed_frames,
            export_path,
        })
    }

    fn export_path(&self, session: &SessionId, kind: ArtifactKind) -> PathBuf {
        self.settings
            .export_dir
            .join(artifact_file_name(&self.settings.host, session, kind))
    }

    fn process_capture(
        &self,
        session: &SessionId,
        arena: &FrameArena,
    ) -> Result<(PathBuf, Vec<usize>), AgentError> {
        let pipeline = DetectionPipeline::new(
            self.settings.workers,
            Arc::clone(&self.decoder),
            Arc::clone(&self.identifier),
        )?;
        let output = pipeline.run(arena);
        if !output.failed.is_empty() {
            warn!(
                "{}: {} of {} frames failed detection",
                self.settings.host,
                output.failed.len(),
                arena.len()
            );
        }

        let result = NodeCaptureResult {
            host: self.settings.host.clone(),
            session: session.clone(),
            resolution: arena.resolution(),
            frames: output.frames,
        };
        let path = self.export_path(session, ArtifactKind::Mocap);
        std::fs::create_dir_all(&self.settings.export_dir)?;
        result.write_json(&path).map_err(AgentError::Export)?;
        Ok((path, output.failed.into_iter().map(|(i, _)| i).collect()))
    }

    fn process_calibration(
        &mut self,
        session: &SessionId,
        arena: &FrameArena,
    ) -> Result<PathBuf, AgentError> {
        let pattern = session
            .pattern()
            .ok_or_else(|| AgentError::Pipeline("calibration session without pattern".into()))?;
        let calibrator = self
            .calibrator
            .as_mut()
            .ok_or_else(|| AgentError::Pipeline("no lens calibrator on this node".into()))?;
        let mut intrinsics = calibrator
            .calibrate(arena, pattern)
            .map_err(|e| AgentError::Pipeline(e.to_string()))?;
        intrinsics.resolution = arena.resolution();

        let path = self.export_path(session, ArtifactKind::Calibration);
        std::fs::create_dir_all(&self.settings.export_dir)?;
        intrinsics.write_json(&path).map_err(AgentError::Export)?;
        Ok(path)
    }
}

fn seconds(since: Instant) -> String {
    format!("{:.4}", since.elapsed().as_secs_f64())
}

fn parse<T: FromStr>(field: &'static str, value: &str) -> Result<T, AgentError> {
    value.parse().map_err(|_| AgentError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_delay(value: &str) -> Result<Duration, AgentError> {
    let seconds: f64 = parse("Record Delay", value)?;
    Duration::try_from_secs_f64(seconds.max(0.0)).map_err(|_| AgentError::InvalidValue {
        field: "Record Delay",
        value: value.to_string(),
    })
}

struct Channel<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Channel<'_, R, W> {
    fn handshake(&mut self) -> Result<(SessionId, CaptureConfig), AgentError> {
        let session: SessionId = parse("Session ID", &self.prompt_one(Prompt::SessionId)?)?;

        let [width, height] = self.prompt_two(Prompt::Resolution)?;
        let resolution = Resolution::new(parse("Resolution", &width)?, parse("Resolution", &height)?);
        let frame_rate = parse("Frame Rate", &self.prompt_one(Prompt::FrameRate)?)?;
        let max_recording = parse("Max Recording", &self.prompt_one(Prompt::MaxRecording)?)?;
        let iso = parse("ISO", &self.prompt_one(Prompt::Iso)?)?;
        let shutter_speed = parse("Shutter Speed", &self.prompt_one(Prompt::ShutterSpeed)?)?;
        let awb_mode = self.prompt_one(Prompt::AwbMode)?;
        let [red, blue] = self.prompt_two(Prompt::AwbGains)?;
        let awb_gains = AwbGains {
            red: parse("AWB Gains", &red)?,
            blue: parse("AWB Gains", &blue)?,
        };

        let config = CaptureConfig {
            resolution,
            frame_rate,
            max_recording,
            iso,
            shutter_speed,
            awb_mode,
            awb_gains,
        };
        Ok((session, config))
    }

    fn prompt_one(&mut self, prompt: Prompt) -> Result<String, AgentError> {
        self.send(prompt.as_str())?;
        self.read_value(prompt)
    }

    fn prompt_two(&mut self, prompt: Prompt) -> Result<[String; 2], AgentError> {
        self.send(prompt.as_str())?;
        Ok([self.read_value(prompt)?, self.read_value(prompt)?])
    }

    fn telemetry(&mut self, label: &str, value: impl std::fmt::Display) -> Result<(), AgentError> {
        self.send(&format_telemetry_line(label, value))
    }

    fn send(&mut self, line: &str) -> Result<(), AgentError> {
        writeln!(self.output, "{line}")?;
        self.output.flush()?;
        Ok(())
    }

    /// Next non-blank line.
    fn read_value(&mut self, prompt: Prompt) -> Result<String, AgentError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(AgentError::Disconnected {
                    field: prompt.as_str(),
                });
            }
            let value = line.trim();
            if !value.is_empty() {
                return Ok(value.to_string());
            }
        }
    }
}

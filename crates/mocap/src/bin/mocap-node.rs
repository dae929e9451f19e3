//! mocap-node: answer one coordinator session on stdin/stdout.
//!
//! Frames are replayed from a directory of packed RGB files; stdout carries
//! the session protocol, so logs go to stderr.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use mocap::node::{
    AgentSettings, CaptureAgent, ColorCentroidIdentifier, PackedRgbDecoder, ReplaySource,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "mocap-node")]
#[command(about = "Capture node agent: serve one session over stdin/stdout")]
#[command(version)]
struct Cli {
    /// Host name used in exported file names.
    #[arg(long)]
    host: String,

    /// Directory receiving `<host>_<sessionID>` exports.
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Directory of raw packed RGB frames, replayed in file name order.
    #[arg(long)]
    frames: PathBuf,

    /// Detection worker threads (default: available cores).
    #[arg(long)]
    workers: Option<usize>,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    mocap::core::init_with_level(level)?;

    let source = ReplaySource::from_dir(&cli.frames)
        .map_err(|e| format!("{}: {e}", cli.frames.display()))?;
    info!("{}: {} frame(s) to replay", cli.host, source.len());

    let mut agent = CaptureAgent::new(
        AgentSettings {
            host: cli.host,
            export_dir: cli.export_dir,
            workers: cli.workers,
        },
        Box::new(source),
        Arc::new(PackedRgbDecoder),
        Arc::new(ColorCentroidIdentifier::default()),
    );
    let report = agent.serve(io::stdin().lock(), io::stdout().lock())?;
    info!(
        "session {}: {} frame(s), {} failed, exported {}",
        report.session,
        report.frames,
        report.failed_frames.len(),
        report.export_path.display()
    );
    Ok(())
}

//! mocap CLI: run capture and calibration sessions, solve recorded sessions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use mocap::session::{NodeConfig, SessionReport, SshConnector};
use mocap::{
    install_calibrations, solve_session, CameraStore, Coordinator, FrameCountPolicy, MocapConfig,
    SessionId,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "mocap")]
#[command(about = "Synchronized multi-camera motion capture: record sessions and triangulate markers")]
#[command(version)]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit JSON log events.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a capture session on every configured node, then solve it.
    Record(CliRecordArgs),

    /// Record a calibration session and install the resulting lens calibrations.
    Calibrate(CliCalibrateArgs),

    /// Triangulate a session whose node results are already in its workspace.
    Solve(CliSolveArgs),

    /// Write a configuration file with default values.
    InitConfig(CliInitConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct CliRecordArgs {
    /// Deployment configuration (JSON).
    #[arg(long, default_value = "mocap.json")]
    config: PathBuf,

    /// Stop after the node results are retrieved.
    #[arg(long)]
    no_solve: bool,
}

#[derive(Debug, Clone, Args)]
struct CliCalibrateArgs {
    /// Deployment configuration (JSON).
    #[arg(long, default_value = "mocap.json")]
    config: PathBuf,

    /// Interior corners per chessboard row.
    #[arg(long)]
    cols: u32,

    /// Interior corners per chessboard column.
    #[arg(long)]
    rows: u32,
}

#[derive(Debug, Clone, Args)]
struct CliSolveArgs {
    /// Session to solve.
    #[arg(long)]
    session: String,

    /// Deployment configuration (JSON); flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding one workspace per session.
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Directory holding `<host>.calibration` and `<host>.pose` files.
    #[arg(long)]
    cameras: Option<PathBuf>,

    /// Handling of nodes that recorded more frames than the shortest one.
    #[arg(long, value_enum)]
    frame_count_policy: Option<CliFrameCountPolicy>,
}

#[derive(Debug, Clone, Args)]
struct CliInitConfigArgs {
    /// Where to write the configuration.
    #[arg(long, default_value = "mocap.json")]
    out: PathBuf,

    /// Node host names.
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFrameCountPolicy {
    Truncate,
    Warn,
}

impl From<CliFrameCountPolicy> for FrameCountPolicy {
    fn from(value: CliFrameCountPolicy) -> Self {
        match value {
            CliFrameCountPolicy::Truncate => FrameCountPolicy::Truncate,
            CliFrameCountPolicy::Warn => FrameCountPolicy::Warn,
        }
    }
}

/// `RUST_LOG` drives the filter; `--verbose` only applies to the plain logger.
#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    let _ = tracing_log::LogTracer::init();
    mocap::core::init_tracing(cli.json_logs);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    mocap::core::init_with_level(level)?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Record(args) => run_record(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Solve(args) => run_solve(&args),
        Commands::InitConfig(args) => run_init_config(&args),
    }
}

fn load_config(path: &Path) -> CliResult<MocapConfig> {
    MocapConfig::load_json(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

fn print_report(report: &SessionReport) {
    println!(
        "  start lead:     {:.3} s (latency spread {:.1} ms{})",
        report.sync.lead_time.as_secs_f64(),
        report.sync.latency_spread.as_secs_f64() * 1e3,
        if report.sync.within_tolerance {
            ""
        } else {
            ", over tolerance"
        }
    );
    for (host, telemetry) in &report.telemetry {
        println!(
            "  {host}: {} frame(s), buffered {:.2} s, processed {:.2} s",
            telemetry.frames, telemetry.buffer_seconds, telemetry.processing_seconds
        );
    }
    for failure in &report.excluded {
        println!("  {}: excluded ({})", failure.host, failure.error);
    }
}

// ── record ────────────────────────────────────────────────────────────

fn run_record(args: &CliRecordArgs) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let coordinator = Coordinator::new(config.coordinator.clone());
    let mut session = coordinator.create_session(None, &mut rand::thread_rng());
    let links = coordinator.connect_all(&SshConnector::default())?;

    let report = coordinator.run(&mut session, links)?;
    println!("session {} retrieved", session.id);
    print_report(&report);

    if args.no_solve {
        return Ok(());
    }
    let cameras = CameraStore::new(&config.cameras_dir);
    let summary = solve_session(
        &config.coordinator.workspace_root,
        &session.id,
        &cameras,
        &config.solver,
    )?;
    println!(
        "wrote {}: {} point(s) over {} frame(s)",
        summary.output.display(),
        summary.points,
        summary.frames
    );
    Ok(())
}

// ── calibrate ─────────────────────────────────────────────────────────

fn run_calibrate(args: &CliCalibrateArgs) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let coordinator = Coordinator::new(config.coordinator.clone());
    let mut session =
        coordinator.create_session(Some((args.cols, args.rows)), &mut rand::thread_rng());
    let links = coordinator.connect_all(&SshConnector::default())?;

    let report = coordinator.run(&mut session, links)?;
    println!("calibration session {} retrieved", session.id);
    print_report(&report);

    let store = CameraStore::new(&config.cameras_dir);
    for (host, archived) in install_calibrations(&report.artifacts, &store)? {
        match archived {
            Some(previous) => println!(
                "  {host}: installed {} (previous kept as {})",
                store.calibration_path(&host).display(),
                previous.display()
            ),
            None => println!("  {host}: installed {}", store.calibration_path(&host).display()),
        }
    }
    Ok(())
}

// ── solve ─────────────────────────────────────────────────────────────

fn run_solve(args: &CliSolveArgs) -> CliResult<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => MocapConfig::default(),
    };
    if let Some(root) = &args.workspace_root {
        config.coordinator.workspace_root = root.clone();
    }
    if let Some(cameras) = &args.cameras {
        config.cameras_dir = cameras.clone();
    }
    if let Some(policy) = args.frame_count_policy {
        config.solver.frame_count_policy = policy.into();
    }

    let session: SessionId = args.session.parse()?;
    let cameras = CameraStore::new(&config.cameras_dir);
    let summary = solve_session(
        &config.coordinator.workspace_root,
        &session,
        &cameras,
        &config.solver,
    )?;

    println!(
        "wrote {}: {} point(s) over {} frame(s)",
        summary.output.display(),
        summary.points,
        summary.frames
    );
    println!("  cameras:        {}", summary.cameras.join(", "));
    for (host, reason) in &summary.excluded {
        println!("  {host}: excluded ({reason})");
    }
    for (host, dropped) in &summary.dropped_frames {
        println!("  {host}: {dropped} frame(s) past the shortest node dropped");
    }
    Ok(())
}

// ── init-config ───────────────────────────────────────────────────────

fn run_init_config(args: &CliInitConfigArgs) -> CliResult<()> {
    if args.out.exists() && !args.force {
        return Err(format!("{} exists (use --force to overwrite)", args.out.display()).into());
    }
    let mut config = MocapConfig::default();
    config.coordinator.nodes = args.hosts.iter().map(NodeConfig::new).collect();
    config.write_json(&args.out)?;
    println!("wrote {}", args.out.display());
    Ok(())
}

use facegate::{
    AuthOutcome,
    camera::{Camera, DirectoryFrameSource, FrameSource},
    cli::{DebugFrameSaver, TerminalPreview},
    common::{Config, DevMode, FaceGateError},
    core::{DefaultFaceGate, LbphBuilder, ModelRegistry, ModelTrainer, StopSignal},
    storage::{FsSampleStore, Identifier},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face enrollment, training and authentication gate")]
struct Cli {
    /// Enable development mode (data under ./dev_data, verbose logs, annotated frames)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (default: configs/facegate.toml, or built-in defaults if absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Replay frames from a directory instead of opening the camera
    #[arg(long, global = true)]
    frames: Option<PathBuf>,

    /// Print the outcome as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Disable the terminal preview
    #[arg(long, global = true)]
    no_preview: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples for an identifier
    Enroll {
        #[arg(short, long)]
        id: String,
    },
    /// Retrain the recognizer from every stored sample
    Train,
    /// Enroll then train, in one go
    Register {
        #[arg(short, long)]
        id: String,
    },
    /// Check a live face against a claimed identifier
    Authenticate {
        #[arg(short, long)]
        id: String,
    },
    /// List cameras and the one auto-detection would pick
    DetectCamera,
}

#[derive(Serialize)]
struct AuthReport<'a> {
    identifier: Identifier,
    accepted: bool,
    outcome: &'a AuthOutcome,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let dev_mode = DevMode::new(cli.dev)?;

    match &cli.command {
        Commands::Enroll { id } => {
            let identifier: Identifier = id.parse()?;
            let gate = DefaultFaceGate::from_config(&config, &dev_mode)?;
            enroll(&cli, &config, &dev_mode, &gate, identifier)?;
        }
        Commands::Train => {
            train(&cli, &config, &dev_mode)?;
        }
        Commands::Register { id } => {
            let identifier: Identifier = id.parse()?;
            let gate = DefaultFaceGate::from_config(&config, &dev_mode)?;
            enroll(&cli, &config, &dev_mode, &gate, identifier)?;
            let report = gate.train()?;
            emit(&cli, &report, || {
                format!("Model trained on {} sample(s) across {} identities.", report.samples, report.identities)
            })?;
        }
        Commands::Authenticate { id } => {
            let identifier: Identifier = id.parse()?;
            let gate = DefaultFaceGate::from_config(&config, &dev_mode)?;
            let stop = StopSignal::new();
            let mut observer = observers(&cli, &config, &dev_mode, &stop, "auth");

            let outcome = authenticate_with_source(cli.frames.as_deref(), &config, |source| {
                gate.authenticate(source, identifier, &stop, &mut observer)
            });
            drop(observer);

            let report = AuthReport { identifier, accepted: outcome.is_accepted(), outcome: &outcome };
            emit(&cli, &report, || match &outcome {
                AuthOutcome::Accepted { .. } => "Welcome!".to_string(),
                AuthOutcome::TimedOut => "Authentication timed out.".to_string(),
                AuthOutcome::Rejected => "Authentication cancelled.".to_string(),
                AuthOutcome::Failed { reason } => format!("Authentication failed: {}", reason),
            })?;

            if !outcome.is_accepted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::DetectCamera => {
            detect_camera(&cli)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn enroll(
    cli: &Cli,
    config: &Config,
    dev_mode: &DevMode,
    gate: &DefaultFaceGate,
    identifier: Identifier,
) -> Result<()> {
    let stop = StopSignal::new();
    let mut observer = observers(cli, config, dev_mode, &stop, "enroll");

    let outcome = with_frame_source(cli.frames.as_deref(), config, |source| {
        gate.enroll(source, identifier, &stop, &mut observer)
    })?;
    drop(observer);

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(FaceGateError::Capture { samples_written, reason }) => {
            anyhow::bail!(
                "Failed to capture images ({} sample(s) kept): {}. Try again.",
                samples_written, reason
            );
        }
        Err(e) => return Err(e.into()),
    };

    emit(cli, &outcome, || {
        if outcome.completed {
            format!("Enrollment complete: {} samples captured for {}.", outcome.samples_written, identifier)
        } else {
            format!("Enrollment stopped early: {} sample(s) captured for {}.", outcome.samples_written, identifier)
        }
    })
}

fn train(cli: &Cli, config: &Config, dev_mode: &DevMode) -> Result<()> {
    let store = FsSampleStore::new(dev_mode.dataset_dir(&config.storage))?;
    let builder = LbphBuilder::new(config.recognizer);
    let registry = ModelRegistry::load(&builder, dev_mode.model_path(&config.storage))?;

    let report = match ModelTrainer::new(&store, &builder).train(&registry) {
        Err(FaceGateError::NoTrainingData) => {
            anyhow::bail!("No valid images found to train the model. Capture faces first.");
        }
        other => other?,
    };

    emit(cli, &report, || {
        format!(
            "Model trained and saved: {} sample(s), {} identities, {} skipped.",
            report.samples, report.identities, report.skipped
        )
    })
}

fn detect_camera(cli: &Cli) -> Result<()> {
    let cameras = Camera::list_all_cameras()?;

    if cli.json {
        let listing: Vec<_> = cameras
            .iter()
            .map(|c| serde_json::json!({
                "index": c.index,
                "name": c.name,
                "features": c.features,
                "likely_ir": c.likely_ir,
            }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if cameras.is_empty() {
        println!("No cameras found. Check that /dev/video* exists and is readable.");
        return Ok(());
    }

    for camera in &cameras {
        println!("/dev/video{}: {}{}", camera.index, camera.name,
            if camera.likely_ir { " (likely IR)" } else { "" });
        for feature in &camera.features {
            println!("   - {}", feature);
        }
    }
    println!("\nAuto-detect (device_index = 999) would use /dev/video{}", Camera::detect_ir_camera()?);
    Ok(())
}

fn with_frame_source<T>(
    frames: Option<&Path>,
    config: &Config,
    run: impl FnOnce(&mut dyn FrameSource) -> T,
) -> Result<T> {
    match frames {
        Some(dir) => {
            let mut source = DirectoryFrameSource::open(dir)
                .with_context(|| format!("Opening frame directory {}", dir.display()))?;
            Ok(run(&mut source))
        }
        None => {
            let mut camera = Camera::new(&config.camera)?;
            let mut session = camera.start_session()?;
            Ok(run(&mut session))
        }
    }
}

/// A frame source that cannot be opened fails the session like any later
/// frame failure, so `--json` callers always get an outcome.
fn authenticate_with_source(
    frames: Option<&Path>,
    config: &Config,
    run: impl FnOnce(&mut dyn FrameSource) -> AuthOutcome,
) -> AuthOutcome {
    with_frame_source(frames, config, run).unwrap_or_else(|e| {
        tracing::warn!("Frame source unavailable: {:#}", e);
        AuthOutcome::Failed { reason: format!("{:#}", e) }
    })
}

fn observers(
    cli: &Cli,
    config: &Config,
    dev_mode: &DevMode,
    stop: &StopSignal,
    prefix: &'static str,
) -> (Option<TerminalPreview>, Option<DebugFrameSaver>) {
    let preview = (config.preview.enabled && !cli.no_preview && !cli.json).then(|| {
        TerminalPreview::new(config.preview.width, config.preview.height, stop.clone())
    });
    let saver = dev_mode
        .is_enabled()
        .then(|| DebugFrameSaver::new(dev_mode.clone(), prefix, 50));
    (preview, saver)
}

fn emit<T: Serialize>(cli: &Cli, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}

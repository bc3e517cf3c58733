use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facetag_core::{OnnxFaceEncoder, RecognitionSession, ResizeFactor, StoreError};
use facetag_hw::{Camera, CaptureSource, StillSource};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod engine;
mod overlay;

use config::Config;
use console::Command;
use engine::{EngineError, EngineHandle, EngineOptions};

#[derive(Parser)]
#[command(
    name = "facetag",
    about = "Label faces in a camera stream against a directory of reference photos"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run live recognition with an operator console on stdin
    Run {
        #[command(flatten)]
        recognition: RecognitionArgs,
        /// V4L2 device to capture from
        #[arg(short, long)]
        device: Option<String>,
        /// Replay a still image instead of opening a camera
        #[arg(long, value_name = "IMAGE")]
        replay: Option<PathBuf>,
        /// Rewrite an annotated PNG of the latest frame at this path
        #[arg(long, value_name = "PNG")]
        snapshot: Option<PathBuf>,
        /// Capture rate in frames per second
        #[arg(long)]
        fps: Option<f64>,
        /// Start with recognition enabled
        #[arg(long)]
        autostart: bool,
    },
    /// Label the faces in one image and print them as JSON
    Identify {
        image: PathBuf,
        #[command(flatten)]
        recognition: RecognitionArgs,
    },
    /// Load the reference directory and print the registered names
    List {
        #[command(flatten)]
        recognition: RecognitionArgs,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct RecognitionArgs {
    /// Directory of reference images, one person per file
    #[arg(short, long, value_name = "DIR")]
    images: Option<PathBuf>,
    /// Downscale factor applied before detection (0 < factor)
    #[arg(long)]
    factor: Option<f64>,
    /// Maximum descriptor distance that still counts as a match
    #[arg(long)]
    tolerance: Option<f32>,
}

impl RecognitionArgs {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(images) = self.images {
            config.images_dir = images;
        }
        if let Some(factor) = self.factor {
            config.resize_factor = ResizeFactor::new(factor)?;
        }
        if let Some(tolerance) = self.tolerance {
            anyhow::ensure!(
                crate::config::is_valid_tolerance(tolerance),
                "--tolerance must be finite and >= 0, got {tolerance}"
            );
            config.tolerance = Some(tolerance);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Run {
            recognition,
            device,
            replay,
            snapshot,
            fps,
            autostart,
        } => {
            recognition.apply(&mut config)?;
            if let Some(device) = device {
                config.camera_device = device;
            }
            if let Some(fps) = fps {
                anyhow::ensure!(fps.is_finite() && fps > 0.0, "--fps must be positive, got {fps}");
                config.fps = fps;
            }
            config.autostart |= autostart;
            run(config, replay, snapshot).await?;
        }
        Commands::Identify { image, recognition } => {
            recognition.apply(&mut config)?;
            let mut session = open_session(&config)?;
            let frame = image::open(&image)
                .with_context(|| format!("failed to decode {}", image.display()))?
                .to_luma8();
            let faces = session.process(&frame, true)?;
            let output = serde_json::json!({ "image": image, "faces": faces });
            println!("{}", serde_json::to_string(&output)?);
        }
        Commands::List { recognition } => {
            recognition.apply(&mut config)?;
            let session = open_session(&config)?;
            for name in session.store().names() {
                println!("{name}");
            }
            eprintln!(
                "{} reference descriptor(s) from {}",
                session.store().len(),
                config.images_dir.display()
            );
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

/// Load the models and register the reference directory.
///
/// A missing reference directory leaves the store empty; every face is
/// then reported as unknown until images are added.
fn open_session(config: &Config) -> Result<RecognitionSession<OnnxFaceEncoder>> {
    let encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let mut session = match config.tolerance {
        Some(tolerance) => {
            RecognitionSession::with_tolerance(encoder, config.resize_factor, tolerance)
        }
        None => RecognitionSession::new(encoder, config.resize_factor),
    };

    match session.load_references(&config.images_dir) {
        Ok(_) => {}
        Err(StoreError::InvalidPath(path)) => {
            tracing::warn!(
                path = %path.display(),
                "reference directory not found, starting with an empty store"
            );
        }
        Err(err) => return Err(err.into()),
    }
    Ok(session)
}

fn open_source(config: &Config, replay: Option<&Path>) -> Result<Box<dyn CaptureSource + Send>> {
    if let Some(path) = replay {
        return Ok(Box::new(StillSource::open(path)?));
    }

    let mut camera = Camera::open(&config.camera_device)?;
    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        for _ in 0..config.warmup_frames {
            let _ = camera.next_frame();
        }
    }
    Ok(Box::new(camera))
}

async fn run(config: Config, replay: Option<PathBuf>, snapshot: Option<PathBuf>) -> Result<()> {
    let session = open_session(&config)?;
    let source = open_source(&config, replay.as_deref())?;
    let options = EngineOptions {
        fps: config.fps,
        images_dir: config.images_dir.clone(),
        enabled: config.autostart,
        snapshot,
    };
    let (handle, mut reports, thread) = engine::spawn_engine(source, session, options)?;

    let writer = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(err) => {
                    tracing::warn!(frame = report.frame, error = %err, "failed to serialize report")
                }
            }
        }
    });

    eprintln!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    // Keep running headless until interrupted.
                    stdin_open = false;
                    continue;
                };
                match Command::parse(&line) {
                    None => {}
                    Some(Err(err)) => eprintln!("{err}"),
                    Some(Ok(command)) => {
                        if !dispatch(&handle, command).await? {
                            break;
                        }
                    }
                }
            }
        }
    }

    handle.shutdown().await.ok();
    drop(handle);
    tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;
    writer.await?;
    Ok(())
}

/// Execute one operator command. Returns `false` when the console should exit.
async fn dispatch(handle: &EngineHandle, command: Command) -> Result<bool> {
    match command {
        Command::Start => {
            handle.start().await?;
            eprintln!("recognition on");
        }
        Command::Stop => {
            handle.stop().await?;
            eprintln!("recognition off");
        }
        Command::Add(path) => match handle.add_image(path).await {
            Ok(copied) => eprintln!("added {}", copied.display()),
            Err(EngineError::Store(err)) => eprintln!("add failed: {err}"),
            Err(err) => return Err(err.into()),
        },
        Command::Status => {
            let status = handle.status().await?;
            eprintln!("{}", serde_json::to_string(&status)?);
        }
        Command::Help => eprintln!("{}", console::HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

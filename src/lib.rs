pub mod ai;
pub mod capture;
pub mod controller;
pub mod encode;
pub mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};

use ai::AgentClient;
use capture::{CameraDevice, CaptureOptions, FileCamera, ImageCapture};
use controller::{AnalyzeOutcome, Notifier, ScreenController, TerminalNotifier};
use encode::{JpegImageEncoder, Transform};
use settings::{jpeg_quality, Settings, SettingsError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} already exists (use --force to overwrite)")]
    ConfigExists(PathBuf),
    #[error("no config directory found; pass --config")]
    NoConfigDir,
    #[error("built without the `screen` feature")]
    ScreenUnavailable,
}

#[derive(Parser)]
#[command(name = "plate-reader")]
#[command(about = "Photograph a plate and list the food on it")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to <config dir>/plate-reader/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Analysis endpoint; overrides the settings file and environment
    #[arg(long, global = true)]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a picture from an image file and analyze it once
    Analyze {
        image: PathBuf,
        /// Crop applied in the edit step, as X,Y,WIDTH,HEIGHT
        #[arg(long, value_parser = parse_crop)]
        crop: Option<Transform>,
    },
    /// Interactive screen: take pictures and analyze them repeatedly
    Shell,
    /// Write the current settings to the settings file
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Take a picture of the primary monitor and analyze it (feature `screen`)
    Screen {
        #[arg(long, default_value_t = 1024)]
        max_width: u32,
    },
}

fn parse_crop(s: &str) -> Result<Transform, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid crop {s:?}: {e}"))?;
    match parts[..] {
        [x, y, width, height] => Ok(Transform::Crop {
            x,
            y,
            width,
            height,
        }),
        _ => Err(format!("invalid crop {s:?}: expected X,Y,WIDTH,HEIGHT")),
    }
}

/// Wire the screen controller from settings and a camera.
pub fn build_controller(
    settings: &Settings,
    camera: Box<dyn CameraDevice>,
    notifier: Box<dyn Notifier>,
) -> ScreenController {
    let capture = ImageCapture::new(
        camera,
        CaptureOptions {
            allows_editing: settings.allows_editing,
            quality: settings.capture_quality,
        },
    );
    let encoder = JpegImageEncoder::new(jpeg_quality(settings.compress_quality));
    let client = AgentClient::new(&settings.endpoint).with_api_key(&settings.api_key);
    ScreenController::new(
        capture,
        Box::new(encoder),
        Box::new(client),
        notifier,
        &settings.instruction,
    )
}

pub async fn run() -> Result<ExitCode, AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
        settings.validate()?;
    }
    log::info!("Analysis endpoint: {}", settings.endpoint);

    match cli.command {
        Commands::Analyze { image, crop } => {
            let camera = FileCamera::in_temp_dir();
            let selector = camera.selector();
            let controller = build_controller(&settings, Box::new(camera), Box::new(TerminalNotifier));
            selector.select(image, crop);
            analyze_once(&controller).await
        }
        Commands::Shell => {
            let camera = FileCamera::in_temp_dir();
            let selector = camera.selector();
            let controller = build_controller(&settings, Box::new(camera), Box::new(TerminalNotifier));
            shell(&controller, &selector).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig { force } => {
            let path = cli
                .config
                .or_else(settings::default_config_path)
                .ok_or(AppError::NoConfigDir)?;
            if path.exists() && !force {
                return Err(AppError::ConfigExists(path));
            }
            settings.save(&path)?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "screen")]
        Commands::Screen { max_width } => {
            let camera = capture::ScreenCamera::in_temp_dir(max_width);
            let controller = build_controller(&settings, Box::new(camera), Box::new(TerminalNotifier));
            analyze_once(&controller).await
        }
        #[cfg(not(feature = "screen"))]
        Commands::Screen { .. } => Err(AppError::ScreenUnavailable),
    }
}

async fn analyze_once(controller: &ScreenController) -> Result<ExitCode, AppError> {
    match controller.take_picture().await {
        Ok(capture::CaptureOutcome::Captured(_)) => {}
        Ok(capture::CaptureOutcome::Cancelled) => {
            log::info!("Nothing captured");
            return Ok(ExitCode::SUCCESS);
        }
        // Already alerted.
        Err(_) => return Ok(ExitCode::FAILURE),
    }

    match controller.analyze().await {
        AnalyzeOutcome::Completed(_) => {
            print!("{}", controller.snapshot());
            Ok(ExitCode::SUCCESS)
        }
        AnalyzeOutcome::Failed(_)
        | AnalyzeOutcome::Discarded(_)
        | AnalyzeOutcome::NoImage
        | AnalyzeOutcome::Ignored => Ok(ExitCode::FAILURE),
    }
}

const SHELL_HELP: &str = "\
commands:
  take [PATH [X,Y,W,H]]   take a picture (no path cancels)
  analyze                 analyze the current picture
  show                    print the screen
  help                    this text
  quit                    leave";

async fn shell(
    controller: &ScreenController,
    selector: &capture::file::FileSelector,
) -> Result<(), AppError> {
    println!("{SHELL_HELP}");
    print!("{}", controller.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("take") => {
                if let Some(path) = words.next() {
                    let crop = match words.next().map(parse_crop).transpose() {
                        Ok(crop) => crop,
                        Err(e) => {
                            eprintln!("{e}");
                            continue;
                        }
                    };
                    selector.select(path, crop);
                }
                // Errors were alerted by the controller.
                let _ = controller.take_picture().await;
            }
            Some("analyze") => match controller.analyze().await {
                AnalyzeOutcome::NoImage => eprintln!("Take a picture first."),
                AnalyzeOutcome::Ignored => eprintln!("Already analyzing."),
                AnalyzeOutcome::Discarded(_) => eprintln!("Picture changed; result dropped."),
                AnalyzeOutcome::Completed(_) | AnalyzeOutcome::Failed(_) => {}
            },
            Some("show") => {}
            Some("help") => {
                println!("{SHELL_HELP}");
                continue;
            }
            Some("quit") | Some("exit") => break,
            Some(other) => {
                eprintln!("unknown command {other:?}; try `help`");
                continue;
            }
            None => continue,
        }
        print!("{}", controller.snapshot());
    }
    Ok(())
}

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use moodmirror::{config, mapper, tracker, ui};
use moodmirror_vision::{Analyzer, Camera, DetectorOptions, ModelSet};

#[derive(Parser)]
#[command(name = "moodmirror")]
#[command(
    version,
    about = "Live webcam expression viewer - emoji and caption for the face in front of the camera"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the viewer window
    Run {
        /// Camera device path (overrides config)
        #[arg(short, long)]
        camera: Option<String>,
        /// Caption language, pt or en (overrides config)
        #[arg(short, long)]
        locale: Option<String>,
        /// Poll interval in milliseconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Detect once from the camera and print the dominant expression
    Check {
        /// Camera device path (overrides config)
        #[arg(short, long)]
        camera: Option<String>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(None)?;

    match cli.command {
        Commands::Run {
            camera,
            locale,
            interval,
        } => {
            if let Some(camera) = camera {
                cfg.camera = camera;
            }
            if let Some(locale) = locale {
                cfg.locale = locale.parse()?;
            }
            if let Some(interval) = interval {
                cfg.interval_ms = interval;
            }
            run(&cfg)
        }
        Commands::Check { camera } => {
            if let Some(camera) = camera {
                cfg.camera = camera;
            }
            check(&cfg)
        }
        Commands::Config => open_config(),
    }
}

fn run(cfg: &config::Config) -> Result<()> {
    let shared = Arc::new(tracker::SharedView::new());

    // Camera or model failures leave the feature unusable; the window
    // still opens and shows why instead of dying silently.
    let app = match start_tracker(cfg, shared.clone()) {
        Ok(handle) => {
            ui::ViewerApp::new(shared, handle, cfg.locale, cfg.failure_warn_threshold)
        }
        Err(err) => {
            log::error!("{err:#}");
            ui::ViewerApp::startup_failed(format!("{err:#}"))
        }
    };
    ui::run(app)
}

fn start_tracker(
    cfg: &config::Config,
    shared: Arc<tracker::SharedView>,
) -> Result<tracker::TrackerHandle> {
    // Models first: the loop must not exist before all three are ready.
    let models = ModelSet::load(&cfg.model_dir).context("Failed to load models")?;
    let analyzer = Analyzer::new(
        models,
        DetectorOptions {
            score_threshold: cfg.score_threshold,
            iou_threshold: cfg.iou_threshold,
        },
    );
    let camera = Camera::open(&cfg.camera).context("Failed to open camera")?;

    let tracker = tracker::Tracker::new(
        camera,
        analyzer,
        shared,
        Duration::from_millis(cfg.interval_ms),
    );
    tracker.spawn()
}

fn check(cfg: &config::Config) -> Result<()> {
    let models = ModelSet::load(&cfg.model_dir).context("Failed to load models")?;
    let mut analyzer = Analyzer::new(
        models,
        DetectorOptions {
            score_threshold: cfg.score_threshold,
            iou_threshold: cfg.iou_threshold,
        },
    );

    info!("Opening camera: {}", cfg.camera);
    let mut camera = Camera::open(&cfg.camera).context("Failed to open camera")?;

    let max_attempts = 30;
    for i in 0..max_attempts {
        let frame = camera.frame().context("Failed to capture frame")?;
        let img = image::DynamicImage::ImageRgb8(frame);

        match analyzer.detect_single_face(&img) {
            Ok(Some(analysis)) => {
                let (expression, confidence) = analysis.expressions.dominant();
                let label = expression.as_label();
                info!(
                    "Face detected with score {:.3}",
                    analysis.detection.score
                );
                println!(
                    "{} {} ({:.0}%)",
                    mapper::emoji_for(label).unwrap_or("?"),
                    mapper::caption_for(label, cfg.locale),
                    confidence * 100.0
                );
                return Ok(());
            }
            Ok(None) => info!("Frame {}: no face", i + 1),
            Err(e) => warn!("Frame {}: {}", i + 1, e),
        }

        // Small delay between frames
        std::thread::sleep(Duration::from_millis(100));
    }

    anyhow::bail!("No face detected. Please ensure your face is visible and well-lit.")
}

fn open_config() -> Result<()> {
    let config_path = *config::CONFIG_PATH;
    if !config_path.exists() {
        config::save_config(&config::Config::default(), None)
            .context("Failed to write default config")?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path.as_os_str())
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use air_sketch::gesture::default_patterns;
use air_sketch::source::{BlankFrameSource, FingerStateReader, FrameSource, ImageSequenceSource};
use air_sketch::{utils, App, FrameEvent, GeminiClient, RecognitionBackend, ReplayReader, SketchConfig};

#[derive(Debug, Parser)]
#[command(name = "air-sketch")]
#[command(about = "Draw in the air with hand gestures")]
struct Cli {
    /// JSON config file; missing file means defaults
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the drawing loop over recorded frames and detector output
    Run(RunArgs),
    /// Write a config file with every default spelled out
    InitConfig { path: PathBuf },
    /// List the gesture table in use
    Gestures,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Directory of frame images, read in file-name order
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Video file or capture device
    #[cfg(feature = "camera")]
    #[arg(long)]
    video: Option<String>,
    /// Capture from the configured camera_index
    #[cfg(feature = "camera")]
    #[arg(long, conflicts_with = "video")]
    camera: bool,
    /// Detector output recorded as JSON lines
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Write every composited frame here
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write the session report on exit; without a value it goes to
    /// session_report_<start time>.json
    #[arg(long, num_args = 0..=1)]
    report: Option<Option<PathBuf>>,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Frame rate assumed when the replay carries no timestamps
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Frame size when replaying without camera footage
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = utils::load_config(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::new()
        .filter_level(config.log_filter())
        .parse_default_env()
        .init();

    if cli.config.exists() {
        log::debug!("Loaded config from {}", cli.config.display());
    } else {
        log::info!("No config at {}, using defaults", cli.config.display());
    }

    match cli.command {
        Commands::Run(args) => run(config, args),
        Commands::InitConfig { path } => {
            utils::save_config(&config, &path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Gestures => {
            let patterns = if config.gestures.is_empty() {
                default_patterns()
            } else {
                config.gestures.clone()
            };
            for pattern in patterns {
                println!(
                    "{:<10} {}  {}",
                    pattern.label, pattern.fingers, pattern.description
                );
            }
            Ok(())
        }
    }
}

fn run(config: SketchConfig, args: RunArgs) -> Result<()> {
    config.validate().context("invalid config")?;
    let backend = build_backend(&config, args.api_key.as_deref());
    let mut replay = args
        .replay
        .as_deref()
        .map(ReplayReader::from_path)
        .transpose()
        .context("failed to load replay")?;
    let mut source = open_source(&args, &config, replay.as_ref())?;

    if replay.is_none() {
        log::warn!("No detector recording given; every frame will read as no hand");
    }
    if let Some(dir) = &args.output {
        utils::ensure_output_dir(dir);
    }

    let mut app = App::start(config, backend)?;
    let start = Instant::now();
    let frame_period = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let mut index: u32 = 0;

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::error!("Camera failed: {}", e);
                break;
            }
        };
        if replay.as_ref().is_some_and(ReplayReader::is_finished) {
            break;
        }

        let now = match replay.as_ref().and_then(ReplayReader::next_timestamp_ms) {
            Some(ms) => start + Duration::from_secs_f64(ms.max(0.0) / 1000.0),
            None => start + frame_period * index,
        };
        let reading = replay.as_mut().and_then(|r| r.read(&frame));

        let output = app.process_frame(&frame, reading.as_ref(), now);
        for event in &output.events {
            report_event(event);
        }

        if let Some(dir) = &args.output {
            let path = dir.join(format!("frame_{index:05}.png"));
            if let Err(e) = output.composite.save(&path) {
                log::warn!("Failed to write {}: {}", path.display(), e);
            }
        }
        index += 1;
    }

    log::info!("Processed {} frames", index);
    let report_path = args
        .report
        .map(|path| path.unwrap_or_else(|| PathBuf::from(app.analytics().report_filename())));
    let report = app.finish(report_path.as_deref())?;
    println!(
        "{} gestures, most used: {}",
        report.gesture_analytics.total_gestures, report.gesture_analytics.most_used_gesture
    );
    Ok(())
}

fn build_backend(config: &SketchConfig, api_key: Option<&str>) -> Option<Box<dyn RecognitionBackend>> {
    let key = api_key?;
    match GeminiClient::new(key, Some(&config.model), Some(config.request_timeout_sec)) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            log::warn!("Recognition disabled: {}", e);
            None
        }
    }
}

#[cfg_attr(not(feature = "camera"), allow(unused_variables))]
fn open_source(
    args: &RunArgs,
    config: &SketchConfig,
    replay: Option<&ReplayReader>,
) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.frames {
        return Ok(Box::new(ImageSequenceSource::open(dir)?));
    }
    #[cfg(feature = "camera")]
    if let Some(video) = &args.video {
        return Ok(Box::new(air_sketch::video::VideoFrameSource::open(video)?));
    }
    #[cfg(feature = "camera")]
    if args.camera {
        let device = config.camera_device();
        return Ok(Box::new(air_sketch::video::VideoFrameSource::open(&device)?));
    }
    match replay {
        Some(r) => Ok(Box::new(BlankFrameSource::new(args.width, args.height, Some(r.len()))?)),
        None => bail!("nothing to run: pass --frames or --replay"),
    }
}

fn report_event(event: &FrameEvent) {
    match event {
        FrameEvent::CanvasInitialized { width, height } => {
            log::debug!("Canvas ready ({}x{})", width, height)
        }
        FrameEvent::Cleared => println!("Canvas cleared"),
        FrameEvent::Saved(path) => println!("Drawing saved: {}", path.display()),
        FrameEvent::AutoSaved(path) => println!("Auto-saved: {}", path.display()),
        FrameEvent::SaveFailed(message) => println!("Save failed: {}", message),
        FrameEvent::Recognition(outcome) => println!("AI: {}", outcome.display_text()),
    }
}

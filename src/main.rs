use anyhow::{Context, Result};
use clap::Parser;
use selfie_booth::capture::{FrameSource, StillSource};
use selfie_booth::catalog::{self, BackgroundCatalog, FilterCatalog};
use selfie_booth::command::{self, Controller};
use selfie_booth::export::{CaptureExporter, DirectoryShare, ShareMetadata, ShareTarget, Unhosted};
use selfie_booth::output::OutputSink;
use selfie_booth::segmentation::{self, SegmentationOracle, WorkerOracle};
use selfie_booth::session::{LogNotifier, Session, SessionHandle};
use selfie_booth::{BoothError, Compositor, DisplaySurface, RenderLoop};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Use a still image as the camera feed instead of a webcam
    #[arg(long)]
    still: Option<PathBuf>,

    /// Output v4l2loopback device path
    /// If not provided, nothing is written to a virtual camera
    #[arg(short, long)]
    output_device: Option<String>,

    /// Output surface width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Output surface height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Path to segmentation model (ONNX file)
    /// If not provided, the person fills the frame and no background shows
    #[arg(long)]
    model: Option<String>,

    /// JSON file with backgrounds and filters
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Initial background index
    #[arg(long, default_value_t = 0)]
    background: usize,

    /// Initial filter id
    #[arg(long)]
    filter: Option<String>,

    /// Share captures into this directory
    /// If not provided, sharing is unavailable
    #[arg(long)]
    share_dir: Option<PathBuf>,

    /// Caption attached to shared captures
    #[arg(long)]
    caption: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Selfie booth starting");
    tracing::info!("Output: {}x{}", args.width, args.height);
    tracing::info!("Target FPS: {}", args.fps);

    let (backgrounds, filters) = match &args.catalog {
        Some(path) => catalog::load_catalogs(path)?,
        None => (BackgroundCatalog::builtin(), FilterCatalog::builtin()),
    };

    let mut session = Session::new(Arc::new(backgrounds), Arc::new(filters));
    session.select_background(args.background)?;
    if let Some(id) = &args.filter {
        session.select_filter(id)?;
    }
    let session = SessionHandle::new(session, Arc::new(LogNotifier));

    // Camera failure is fatal; there is no degraded mode
    let source = open_source(&args).map_err(|e| BoothError::Setup(format!("{e:#}")))?;

    let mut output = open_output(&args)?;

    let oracle: Option<Box<dyn SegmentationOracle>> = if let Some(model_path) = &args.model {
        tracing::info!("Loading segmentation model from {}", model_path);
        let model = segmentation::create_default_model(model_path)
            .context("Failed to load segmentation model")?;
        tracing::info!("Segmentation model loaded successfully");
        Some(Box::new(WorkerOracle::spawn(model)?))
    } else {
        tracing::info!("Running without segmentation (person fills the frame)");
        None
    };

    let display = DisplaySurface::new();
    let mut render_loop = RenderLoop::new(
        source,
        oracle,
        Compositor::new(args.width, args.height),
        session.clone(),
        Arc::clone(&display),
    );

    let target: Box<dyn ShareTarget> = match &args.share_dir {
        Some(dir) => Box::new(DirectoryShare::new(dir)),
        None => Box::new(Unhosted),
    };
    let mut exporter = CaptureExporter::new(session.clone(), display);
    if let Some(caption) = &args.caption {
        exporter = exporter.with_metadata(ShareMetadata {
            title: caption.clone(),
            ..ShareMetadata::default()
        });
    }
    let mut controller = Controller::new(
        session.clone(),
        exporter,
        target,
        render_loop.stop_handle(),
    );

    let commands = command::spawn_stdin_reader().context("Failed to start command reader")?;
    tracing::info!("Commands: filter <id> | bg <n> | capture | share | reset | list | quit");

    let sink = output
        .as_mut()
        .map(|sink| sink.as_mut() as &mut dyn OutputSink);
    render_loop.run(args.fps, sink, || controller.drain(&commands))?;

    Ok(())
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &args.still {
        return Ok(Box::new(StillSource::open(path)?));
    }
    open_camera(args)
}

#[cfg(feature = "camera")]
fn open_camera(args: &Args) -> Result<Box<dyn FrameSource>> {
    let capture = selfie_booth::capture::WebcamCapture::new(args.input_device, args.width, args.height)
        .context("Failed to initialize webcam capture")?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "camera"))]
fn open_camera(args: &Args) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "cannot open webcam {}: built without the `camera` feature (use --still)",
        args.input_device
    )
}

#[cfg(feature = "loopback")]
fn open_output(args: &Args) -> Result<Option<Box<dyn OutputSink>>> {
    let Some(device) = &args.output_device else {
        return Ok(None);
    };
    let output: Box<dyn OutputSink> = Box::new(
        selfie_booth::output::V4L2Output::new(device, args.width, args.height)
            .context("Failed to initialize v4l2loopback output")?,
    );
    Ok(Some(output))
}

#[cfg(not(feature = "loopback"))]
fn open_output(args: &Args) -> Result<Option<Box<dyn OutputSink>>> {
    if let Some(device) = &args.output_device {
        anyhow::bail!("cannot open {}: built without the `loopback` feature", device);
    }
    Ok(None)
}

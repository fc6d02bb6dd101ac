//! framesink: renders a test pattern and streams it through the capture bridge.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use framesink::bridge::{BridgeOptions, FrameSinkBridge};
use framesink::config::{parse_size, Config, ConfigWatcher};
use framesink::frame::{FrameImage, Texture};
use framesink::host::{FpsCounter, FrameHook, RenderLoop};
use framesink::sink::shared::{ReceiveResult, ReceivedFrame};
use framesink::sink::{FrameReceiver, MirrorMode, ResizeMode, SharedMemorySink};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Stream rendered frames to a capture sink.
#[derive(Parser, Debug)]
#[command(name = "framesink")]
#[command(about = "Render a test pattern and hand every frame to a capture sink")]
struct Args {
    /// YAML config file, reloaded when it changes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Render height
    #[arg(long, default_value = "720")]
    height: u32,

    /// Target frames per second (0 = unthrottled)
    #[arg(long)]
    fps: Option<u32>,

    /// Pace to the display refresh rate
    #[arg(long)]
    vsync: bool,

    /// What the capture device does on a size mismatch
    #[arg(long, value_enum)]
    resize: Option<ResizeMode>,

    /// Mirror the captured image horizontally
    #[arg(long)]
    mirror: bool,

    /// Trade one frame of latency for smoother throughput
    #[arg(long)]
    double_buffering: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Do not start the in-process consumer
    #[arg(long)]
    no_receiver: bool,

    /// Consumer output size as WIDTHxHEIGHT (defaults to the render size)
    #[arg(long)]
    receiver_size: Option<String>,

    /// Write the last consumed frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

/// Applies command line flags on top of a loaded config.
fn apply_overrides(args: &Args, mut config: Config) -> Config {
    if let Some(fps) = args.fps {
        config.render.target_frame_rate = fps;
    }
    if args.vsync {
        config.render.vsync = true;
    }
    if let Some(resize) = args.resize {
        config.capture.resize_mode = resize;
    }
    if args.mirror {
        config.capture.mirror_mode = MirrorMode::Horizontal;
    }
    if args.double_buffering {
        config.capture.double_buffering = true;
    }
    config
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = apply_overrides(&args, file_config.clone());
    let mut watcher = args
        .config
        .clone()
        .and_then(|path| ConfigWatcher::new(path, file_config));

    let receiver_size = match &args.receiver_size {
        Some(size) => parse_size(size)?,
        None => (args.width, args.height),
    };

    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let sink = SharedMemorySink::new();
    let consumer = if args.no_receiver {
        info!("No consumer attached, the sink will report itself inactive");
        None
    } else {
        Some(spawn_consumer(sink.receiver(), receiver_size, running.clone())?)
    };

    let options = BridgeOptions {
        suppress_repeats: config.suppress_repeats,
    };
    let mut bridge = FrameSinkBridge::with_options(sink, config.capture, options);
    let mut render_loop = RenderLoop::new(&config.render);
    let mut fps = FpsCounter::default();

    info!(
        "Rendering {}x{} test pattern (target {} fps, vsync {})",
        args.width, args.height, config.render.target_frame_rate, config.render.vsync
    );
    bridge.on_start();

    while running.load(Ordering::SeqCst)
        && args.frames.map_or(true, |n| render_loop.frames_rendered() < n)
    {
        let index = render_loop.begin_frame();

        if let Some(new_config) = watcher.as_mut().and_then(|w| w.check_for_changes()) {
            let new_config = apply_overrides(&args, new_config);
            bridge.set_config(new_config.capture);
            render_loop.apply(&new_config.render);
        }

        let texture = Texture::test_pattern(args.width, args.height, index);
        bridge.on_frame_rendered(&FrameImage::Cpu(&texture));

        if let Some(rate) = fps.update() {
            debug!("[Perf] Rendering at {:.2} FPS", rate);
        }
        render_loop.end_frame();
    }

    bridge.on_stop();
    let stats = bridge.stats();
    info!(
        "Rendered {} frames: {} accepted, {} warnings, {} errors",
        stats.submitted, stats.accepted, stats.warnings, stats.errors
    );

    running.store(false, Ordering::SeqCst);
    if let Some(handle) = consumer {
        let last_frame = handle
            .join()
            .map_err(|_| anyhow!("consumer thread panicked"))?;
        if let Some(path) = &args.snapshot {
            match last_frame {
                Some(frame) => write_snapshot(&frame, path)?,
                None => warn!("No frame was consumed, snapshot not written"),
            }
        }
    }

    Ok(())
}

/// Runs the consumer end on its own thread, the way a capture device polls.
fn spawn_consumer(
    mut receiver: FrameReceiver,
    (width, height): (u32, u32),
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<Option<ReceivedFrame>>> {
    let handle = thread::Builder::new()
        .name("capture-consumer".to_string())
        .spawn(move || {
            let mut last_frame = None;
            let mut fps = FpsCounter::default();
            let mut reported_mismatch = false;

            while running.load(Ordering::SeqCst) {
                match receiver.receive(width, height) {
                    ReceiveResult::Inactive => debug!("Consumer waiting for the first frame"),
                    ReceiveResult::NewFrame(frame) => {
                        if frame.mismatch && !reported_mismatch {
                            warn!(
                                "Consumer output is {}x{} but frames are {}x{}, showing placeholder",
                                width, height, frame.source_size.0, frame.source_size.1
                            );
                            reported_mismatch = true;
                        }
                        if let Some(rate) = fps.update() {
                            info!("Consumer: {:.2} FPS", rate);
                        }
                        last_frame = Some(frame);
                    }
                    ReceiveResult::OldFrame(frame) => last_frame = Some(frame),
                }
            }

            info!("Consumer received {} frames", receiver.frames_received());
            last_frame
        })
        .context("failed to spawn consumer thread")?;
    Ok(handle)
}

/// Saves a BGR24 frame as PNG.
fn write_snapshot(frame: &ReceivedFrame, path: &Path) -> Result<()> {
    let mut rgb = frame.data.clone();
    for px in rgb.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    let img = image::RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
    img.save(path)
        .with_context(|| format!("failed to write snapshot {:?}", path))?;
    info!("Snapshot written to {:?}", path);
    Ok(())
}

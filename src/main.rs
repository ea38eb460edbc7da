use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use glc_viewer::config::Configuration;
use glc_viewer::host;
use glc_viewer::render::surface::MemorySurface;
use glc_viewer::session::SessionRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "glc-viewer",
    version,
    about = "Orbit a color-cube histogram of an image"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Initial hue rotation in degrees, [0, 360)
    #[arg(long, value_name = "DEGREES")]
    angle: Option<f32>,
    /// Render one frame to this PNG instead of opening a window
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,
    /// Snapshot size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH", default_value = "800x600", value_parser = parse_size)]
    size: (u32, u32),
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Image to load at startup
    #[arg(value_name = "IMAGE")]
    image: Option<PathBuf>,
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{raw}`"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".into());
    }
    Ok((w, h))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("glc_viewer={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn load_config(args: &Args) -> Result<Configuration> {
    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(angle) = args.angle {
        cfg.host.initial_angle = angle;
    }
    cfg.validated().context("validating configuration")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    let cfg = load_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("glc-worker")
        .build()
        .context("failed to build tokio runtime")?;

    let registry = SessionRegistry::new(cfg, runtime.handle().clone());
    if let Some(out) = args.snapshot.as_ref() {
        return runtime.block_on(snapshot(registry, args.image.clone(), out.clone(), args.size));
    }

    let cancel = CancellationToken::new();
    runtime.spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; closing window");
                cancel.cancel();
            }
        }
    });

    info!("opening viewer window");
    host::run_windowed(registry, runtime.handle().clone(), cancel, args.image)?;
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

/// Headless run: bind an off-screen surface, wait for the scene, save a frame.
async fn snapshot(
    registry: SessionRegistry,
    image_path: Option<PathBuf>,
    out: PathBuf,
    (width, height): (u32, u32),
) -> Result<()> {
    let surface = MemorySurface::new(width, height);
    let session = registry.bind("snapshot", surface.clone())?;
    session.set_transform_angle(registry.config().host.initial_angle)?;
    session.start()?;

    let has_image = match image_path {
        Some(path) => {
            let info = host::upload_file(&session, &path).await?;
            info!(source = %info.source, width = info.width, height = info.height, "image loaded");
            true
        }
        None => false,
    };

    let ready = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let scene_ready = !has_image || session.scene().image.is_some();
            if scene_ready && surface.frames_presented() > 0 {
                // one more frame so the published scene is on screen
                let seen = surface.frames_presented();
                while surface.frames_presented() <= seen {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    session.stop();
    if ready.is_err() {
        bail!("timed out waiting for a frame");
    }

    let Some(frame) = surface.last_frame() else {
        bail!("no frame was presented");
    };
    let (w, h) = frame.dimensions();
    let out_for_task = out.clone();
    tokio::task::spawn_blocking(move || {
        image::save_buffer(&out_for_task, frame.as_bytes(), w, h, image::ExtendedColorType::Rgba8)
    })
    .await
    .context("snapshot writer task failed")?
    .with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), width = w, height = h, "snapshot written");
    Ok(())
}

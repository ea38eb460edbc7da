//! Desktop host: one winit window bound to one session.
//!
//! The window plays the part of the UI shell. It tracks drags, forwards
//! deltas, turns dropped files into uploads and maps arrow keys to hue
//! nudges. Frames are composed on the runtime by the session's render loop
//! and only blitted here.

mod drag;
mod presenter;
mod window_surface;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes, WindowId},
};

pub use drag::DragTracker;
pub use window_surface::{FrameNotifier, FrameSlot, HostEvent, WindowSurface};

use crate::config::HostOptions;
use crate::events::{ImageInfo, SessionEvent};
use crate::session::{SessionRegistry, SurfaceSession};
use presenter::Presenter;

pub const WINDOW_SURFACE_ID: &str = "main-window";

/// Read `path` on the blocking pool and upload it into `session`.
pub async fn upload_file(session: &SurfaceSession, path: &Path) -> Result<ImageInfo> {
    let source = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let owned = path.to_path_buf();
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(owned))
        .await
        .context("file read task failed")?
        .with_context(|| format!("reading {}", path.display()))?;
    let info = session
        .upload(source, bytes)
        .await
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(info)
}

fn spawn_upload(runtime: &Handle, session: Arc<SurfaceSession>, path: PathBuf) {
    runtime.spawn(async move {
        if let Err(err) = upload_file(&session, &path).await {
            warn!(error = ?err, "upload failed");
        }
    });
}

struct HostApp {
    options: HostOptions,
    registry: SessionRegistry,
    runtime: Handle,
    cancel: CancellationToken,
    proxy: EventLoopProxy<HostEvent>,
    initial_image: Option<PathBuf>,
    window: Option<Arc<Window>>,
    presenter: Option<Presenter>,
    slot: FrameSlot,
    session: Option<Arc<SurfaceSession>>,
    drag: DragTracker,
    modifier: bool,
}

impl HostApp {
    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default()
            .with_title(self.options.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.options.window_width,
                self.options.window_height,
            ));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create host window");
                None
            }
        }
    }

    fn bind_session(&mut self) -> Result<()> {
        let (width, height) = self
            .presenter
            .as_ref()
            .map_or((1, 1), Presenter::size);
        self.slot.resize(width, height);

        let surface = WindowSurface::new(self.slot.clone(), self.proxy.clone());
        let session = Arc::new(self.registry.bind(WINDOW_SURFACE_ID, surface)?);
        if let Err(err) = session.set_transform_angle(self.options.initial_angle) {
            warn!(%err, "ignoring initial hue angle");
        }
        session.start()?;
        if let Some(path) = self.initial_image.take() {
            spawn_upload(&self.runtime, Arc::clone(&session), path);
        }
        self.session = Some(session);
        Ok(())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(presenter) = self.presenter.as_mut() {
            presenter.resize(new_size);
        }
        self.slot
            .resize(new_size.width.max(1), new_size.height.max(1));
    }

    fn handle_key(&mut self, key: &Key, event_loop: &ActiveEventLoop) {
        let step = match key {
            Key::Named(NamedKey::ArrowLeft) => -self.options.angle_step_degrees,
            Key::Named(NamedKey::ArrowRight) => self.options.angle_step_degrees,
            Key::Named(NamedKey::Escape) => {
                self.shutdown(event_loop);
                return;
            }
            _ => return,
        };
        if let Some(session) = self.session.as_ref() {
            let params = session.nudge_transform_angle(step);
            debug!(angle = params.angle(), "hue angle nudged");
        }
    }

    fn drain_session_events(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        for event in session.take_events() {
            match event {
                SessionEvent::SurfaceLost(err) => {
                    error!(%err, "render loop lost its surface");
                    self.shutdown(event_loop);
                    return;
                }
                SessionEvent::UploadRejected { source, error } => {
                    info!(%source, %error, "keeping previous image");
                }
                SessionEvent::InputReady(info) => {
                    if let Some(window) = self.window.as_ref() {
                        window.set_title(&format!("{}: {}", self.options.title, info.source));
                    }
                }
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.slot.close();
        event_loop.exit();
    }
}

impl ApplicationHandler<HostEvent> for HostApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.presenter.is_none() {
            match Presenter::new(window) {
                Ok(presenter) => self.presenter = Some(presenter),
                Err(err) => {
                    error!(error = ?err, "failed to initialize GPU state");
                    event_loop.exit();
                    return;
                }
            }
        }

        if self.session.is_none() {
            if let Err(err) = self.bind_session() {
                error!(error = ?err, "failed to bind the window surface");
                self.shutdown(event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("host window close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(new_size) => self.handle_resize(new_size),
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::RedrawRequested => {
                let (Some(presenter), Some(frame)) = (self.presenter.as_mut(), self.slot.take())
                else {
                    return;
                };
                if let Err(err) = presenter.draw(&frame) {
                    error!(error = ?err, "presentation failed; exiting");
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifier = modifiers.state().shift_key();
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.drag.press(),
                ElementState::Released => self.drag.release(),
            },
            WindowEvent::CursorLeft { .. } => self.drag.release(),
            WindowEvent::CursorMoved { position, .. } => {
                if let (Some((dx, dy)), Some(session)) =
                    (self.drag.moved(position.x, position.y), self.session.as_ref())
                {
                    session.apply_delta(dx, dy, self.modifier);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                self.handle_key(&event.logical_key, event_loop);
            }
            WindowEvent::DroppedFile(path) => {
                if let Some(session) = self.session.as_ref() {
                    info!(path = %path.display(), "file dropped");
                    spawn_upload(&self.runtime, Arc::clone(session), path);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_session_events(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        match event {
            HostEvent::FrameReady => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            HostEvent::Cancelled => {
                info!("host received cancellation event");
                self.shutdown(event_loop);
            }
        }
    }
}

/// Open the window and run until it closes or `cancel` fires.
///
/// Must be called on the main thread; `runtime` hosts the render loop and
/// all decode/transform work.
pub fn run_windowed(
    registry: SessionRegistry,
    runtime: Handle,
    cancel: CancellationToken,
    initial_image: Option<PathBuf>,
) -> Result<()> {
    let event_loop = EventLoop::<HostEvent>::with_user_event()
        .build()
        .context("failed to build host event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        let proxy = proxy.clone();
        runtime.spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(HostEvent::Cancelled);
        })
    };

    let mut app = HostApp {
        options: registry.config().host.clone(),
        registry,
        runtime,
        cancel,
        proxy,
        initial_image,
        window: None,
        presenter: None,
        slot: FrameSlot::default(),
        session: None,
        drag: DragTracker::default(),
        modifier: false,
    };
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();
    drop(app);

    run_result.context("host event loop failed")
}

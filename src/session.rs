//! Per-surface composition root.
//!
//! A [`SurfaceSession`] owns the camera pose, transform parameters, current
//! input image and the render loop for exactly one surface. UI-facing methods
//! take `&self`, return immediately and never wait on a decode or transform.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::camera::{CameraController, CameraPose};
use crate::codec;
use crate::config::Configuration;
use crate::error::{DecodeError, InvalidParameterError, SessionConflictError, StartError};
use crate::events::{ImageInfo, SessionEvent};
use crate::pixels::PixelBuffer;
use crate::processing::hue::{self, TransformParameters};
use crate::render::frame_loop::{LoopInputs, RenderLoop, RunGate, RunState};
use crate::render::raster::{Rasterizer, SceneFrame};
use crate::render::surface::Surface;
use crate::scene::{ColorCube, ColorCubeSettings};

/// Hands out sessions and enforces one session per surface id.
#[derive(Clone)]
pub struct SessionRegistry {
    bound: Arc<Mutex<HashSet<String>>>,
    config: Arc<Configuration>,
    runtime: Handle,
}

impl SessionRegistry {
    pub fn new(config: Configuration, runtime: Handle) -> Self {
        Self {
            bound: Arc::new(Mutex::new(HashSet::new())),
            config: Arc::new(config),
            runtime,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn is_bound(&self, surface_id: &str) -> bool {
        self.bound.lock().contains(surface_id)
    }

    /// Create the session for `surface_id`, initially Stopped.
    ///
    /// The id stays claimed until the session is stopped from Running or
    /// dropped.
    ///
    /// # Errors
    /// [`SessionConflictError`] when the id already has a bound session; that
    /// session is left untouched.
    pub fn bind<S: Surface>(
        &self,
        surface_id: impl Into<String>,
        surface: S,
    ) -> Result<SurfaceSession, SessionConflictError> {
        let surface_id = surface_id.into();
        if !self.bound.lock().insert(surface_id.clone()) {
            warn!(surface = %surface_id, "surface already bound");
            return Err(SessionConflictError { surface_id });
        }
        info!(surface = %surface_id, "session bound");
        Ok(SurfaceSession::new(
            surface_id,
            Box::new(surface),
            Arc::clone(&self.bound),
            &self.config,
            self.runtime.clone(),
        ))
    }
}

struct Inputs {
    transform: TransformParameters,
    image: Option<Arc<PixelBuffer>>,
}

/// State shared with blocking transform jobs.
struct ScenePublisher {
    scene: watch::Sender<SceneFrame>,
    cube: ColorCubeSettings,
    gate: RunGate,
    /// Last requested scene.
    requested: AtomicU64,
    /// Generation currently visible to the loop.
    published: AtomicU64,
}

impl ScenePublisher {
    fn build(&self, image: Option<&PixelBuffer>, params: TransformParameters) -> SceneFrame {
        match image {
            Some(image) => {
                let transformed = hue::apply(image, params);
                let cube = ColorCube::from_image(&self.cube, &transformed);
                SceneFrame {
                    image: Some(Arc::new(transformed)),
                    cube: Arc::new(cube),
                }
            }
            None => SceneFrame::empty(ColorCube::uniform(&self.cube)),
        }
    }

    /// Swap in `frame` unless a newer request exists or the loop is stopped.
    fn publish(&self, generation: u64, frame: SceneFrame) -> bool {
        self.gate
            .while_running(|| {
                if self.requested.load(Ordering::Acquire) != generation {
                    return false;
                }
                self.scene.send_replace(frame);
                self.published.store(generation, Ordering::Release);
                true
            })
            .unwrap_or(false)
    }

    fn is_current(&self) -> bool {
        self.requested.load(Ordering::Acquire) == self.published.load(Ordering::Acquire)
    }
}

pub struct SurfaceSession {
    surface_id: String,
    registry: Arc<Mutex<HashSet<String>>>,
    /// Whether this session holds `surface_id` in the registry.
    claimed: Mutex<bool>,
    controller: CameraController,
    pose: watch::Sender<CameraPose>,
    inputs: Mutex<Inputs>,
    publisher: Arc<ScenePublisher>,
    render_loop: RenderLoop,
    upload_ticket: AtomicU64,
    decode_limit: u32,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    runtime: Handle,
}

impl SurfaceSession {
    fn new(
        surface_id: String,
        surface: Box<dyn Surface>,
        registry: Arc<Mutex<HashSet<String>>>,
        config: &Configuration,
        runtime: Handle,
    ) -> Self {
        let controller = CameraController::new(&config.camera);
        let initial_pose = controller.clamp(config.initial_pose.to_pose());
        let (pose_tx, pose_rx) = watch::channel(initial_pose);
        let (scene_tx, scene_rx) =
            watch::channel(SceneFrame::empty(ColorCube::uniform(&config.color_cube)));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let render_loop = RenderLoop::new(
            surface_id.clone(),
            surface,
            LoopInputs {
                pose: pose_rx,
                scene: scene_rx,
            },
            Rasterizer::new(config.render),
            config.frame_period(),
            events_tx.clone(),
            runtime.clone(),
        );
        let publisher = Arc::new(ScenePublisher {
            scene: scene_tx,
            cube: config.color_cube,
            gate: render_loop.gate(),
            requested: AtomicU64::new(0),
            published: AtomicU64::new(0),
        });

        Self {
            surface_id,
            registry,
            claimed: Mutex::new(true),
            controller,
            pose: pose_tx,
            inputs: Mutex::new(Inputs {
                transform: TransformParameters::IDENTITY,
                image: None,
            }),
            publisher,
            render_loop,
            upload_ticket: AtomicU64::new(0),
            decode_limit: config.decode.max_dimension,
            events_tx,
            events_rx: Mutex::new(events_rx),
            runtime,
        }
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    /// Stopped → Running. Starting a running session is a no-op.
    ///
    /// # Errors
    /// [`StartError`] when no surface is bound, either because the host
    /// destroyed it or because `stop()` released it. See [`Self::rebind`].
    pub fn start(&self) -> Result<(), StartError> {
        self.render_loop.start()?;
        if !self.publisher.is_current() {
            // inputs changed while stopped, or a result was dropped at stop
            self.refresh_scene();
        }
        Ok(())
    }

    /// Running → Stopped. Cancels ticking and releases the surface binding,
    /// freeing the surface id for other sessions. Pose, transform and input
    /// image are kept.
    ///
    /// Idempotent; a no-op when already Stopped. No frame is presented after
    /// it returns.
    pub fn stop(&self) {
        let mut claimed = self.claimed.lock();
        if self.render_loop.stop() {
            self.release_claim(&mut claimed);
        }
    }

    /// Bind a (possibly recreated) surface to this session so it can start
    /// again after `stop()` or a surface loss.
    ///
    /// # Errors
    /// [`SessionConflictError`] when another session bound the id after this
    /// one released it.
    pub fn rebind<S: Surface>(&self, surface: S) -> Result<(), SessionConflictError> {
        let mut claimed = self.claimed.lock();
        if !*claimed {
            if !self.registry.lock().insert(self.surface_id.clone()) {
                warn!(surface = %self.surface_id, "surface already bound");
                return Err(SessionConflictError {
                    surface_id: self.surface_id.clone(),
                });
            }
            *claimed = true;
        }
        self.render_loop.attach(Box::new(surface));
        info!(surface = %self.surface_id, "session rebound");
        Ok(())
    }

    fn release_claim(&self, claimed: &mut bool) {
        if *claimed {
            *claimed = false;
            self.registry.lock().remove(&self.surface_id);
            info!(surface = %self.surface_id, "surface binding released");
        }
    }

    pub fn run_state(&self) -> RunState {
        self.render_loop.state()
    }

    pub fn frames_presented(&self) -> u64 {
        self.render_loop.frames_presented()
    }

    pub fn pose(&self) -> CameraPose {
        *self.pose.borrow()
    }

    pub fn transform(&self) -> TransformParameters {
        self.inputs.lock().transform
    }

    /// Scene the next tick will draw.
    pub fn scene(&self) -> SceneFrame {
        self.publisher.scene.borrow().clone()
    }

    /// Fold one pointer delta into the pose and return the result.
    pub fn apply_delta(&self, dx: f32, dy: f32, modifier: bool) -> CameraPose {
        let mut next = CameraPose::default();
        self.pose.send_modify(|pose| {
            *pose = self.controller.apply_delta(*pose, dx, dy, modifier);
            next = *pose;
        });
        trace!(yaw = next.yaw, pitch = next.pitch, dolly = next.dolly, "pose updated");
        next
    }

    /// Set the hue angle from the slider feed.
    ///
    /// # Errors
    /// [`InvalidParameterError`] for NaN or values outside `[0, 360)`; the
    /// previous angle stays in effect.
    pub fn set_transform_angle(&self, angle: f32) -> Result<(), InvalidParameterError> {
        let params = TransformParameters::new(angle).inspect_err(|err| {
            debug!(surface = %self.surface_id, %err, "rejected transform angle");
        })?;
        self.set_transform(params);
        Ok(())
    }

    /// Rotate the hue angle by `delta` degrees, wrapping at 360.
    pub fn nudge_transform_angle(&self, delta: f32) -> TransformParameters {
        let params = self.transform().rotated_by(delta);
        self.set_transform(params);
        params
    }

    fn set_transform(&self, params: TransformParameters) {
        {
            let mut inputs = self.inputs.lock();
            if inputs.transform == params {
                return;
            }
            inputs.transform = params;
        }
        debug!(surface = %self.surface_id, angle = params.angle(), "transform updated");
        self.refresh_scene();
    }

    /// Replace the input image; the transformed scene follows asynchronously.
    pub fn set_input_image(&self, image: PixelBuffer) {
        let (width, height) = image.dimensions();
        self.inputs.lock().image = Some(Arc::new(image));
        debug!(surface = %self.surface_id, width, height, "input image replaced");
        self.refresh_scene();
    }

    /// Decode `bytes` off the async executor and make them the input image.
    ///
    /// When several uploads overlap, the most recently requested one wins;
    /// older ones still report their decoded size but are not applied.
    ///
    /// # Errors
    /// The [`DecodeError`] from the codec; the previous input stays in use and
    /// an [`SessionEvent::UploadRejected`] is queued.
    pub async fn upload(
        &self,
        source: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<ImageInfo, DecodeError> {
        let source = source.into();
        let ticket = self.upload_ticket.fetch_add(1, Ordering::AcqRel) + 1;
        let limit = self.decode_limit;
        let decoded = self
            .runtime
            .spawn_blocking(move || codec::decode_with_limit(&bytes, limit))
            .await
            .unwrap_or_else(|err| Err(DecodeError::Malformed(format!("decode task failed: {err}"))));

        let image = match decoded {
            Ok(image) => image,
            Err(error) => {
                warn!(surface = %self.surface_id, %source, %error, "upload rejected");
                let _ = self.events_tx.send(SessionEvent::UploadRejected {
                    source,
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        let info = ImageInfo {
            source,
            width: image.width(),
            height: image.height(),
        };
        if self.upload_ticket.load(Ordering::Acquire) != ticket {
            debug!(surface = %self.surface_id, source = %info.source, "upload superseded");
            return Ok(info);
        }
        info!(
            surface = %self.surface_id,
            source = %info.source,
            width = info.width,
            height = info.height,
            "upload decoded"
        );
        self.set_input_image(image);
        let _ = self.events_tx.send(SessionEvent::InputReady(info.clone()));
        Ok(info)
    }

    /// Drain queued notifications.
    pub fn take_events(&self) -> Vec<SessionEvent> {
        let mut rx = self.events_rx.lock();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Recompute the scene from the current inputs on the blocking pool.
    fn refresh_scene(&self) {
        let (generation, image, params) = {
            let inputs = self.inputs.lock();
            let generation = self.publisher.requested.fetch_add(1, Ordering::AcqRel) + 1;
            (generation, inputs.image.clone(), inputs.transform)
        };
        if !self.publisher.gate.is_running() {
            trace!(surface = %self.surface_id, generation, "stopped; scene refresh deferred");
            return;
        }

        let publisher = Arc::clone(&self.publisher);
        let surface_id = self.surface_id.clone();
        self.runtime.spawn_blocking(move || {
            if publisher.requested.load(Ordering::Acquire) != generation {
                return;
            }
            let frame = publisher.build(image.as_deref(), params);
            if publisher.publish(generation, frame) {
                trace!(surface = %surface_id, generation, "scene published");
            } else {
                debug!(surface = %surface_id, generation, "discarded stale scene");
            }
        });
    }
}

impl Drop for SurfaceSession {
    fn drop(&mut self) {
        let mut claimed = self.claimed.lock();
        self.render_loop.stop();
        self.release_claim(&mut claimed);
        drop(claimed);
        debug!(surface = %self.surface_id, "session dropped");
    }
}

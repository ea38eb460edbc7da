//! Cancellable per-session tick subscription.
//!
//! A single tokio task ticks at the display cadence. Each tick reads the latest
//! pose and scene from `watch` channels, rasterizes at the surface size and
//! presents. Missed ticks are skipped rather than queued, so a slow frame never
//! builds a backlog.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::CameraPose;
use crate::error::{StartError, SurfaceLostError};
use crate::events::SessionEvent;
use crate::pixels::PixelBuffer;
use crate::render::raster::{Rasterizer, SceneFrame};
use crate::render::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// Surface ownership plus the running flag. Presenting and stopping both
/// take this lock, which is what makes `stop()` a hard barrier.
struct Binding {
    surface: Option<Box<dyn Surface>>,
    running: bool,
    /// Set when the surface reported loss; cleared by `attach`.
    lost: bool,
}

/// Read-only view of a loop's running flag for producers that publish into
/// the loop's inputs.
#[derive(Clone)]
pub struct RunGate {
    binding: Arc<Mutex<Binding>>,
}

impl RunGate {
    pub fn is_running(&self) -> bool {
        self.binding.lock().running
    }

    /// Run `f` only while the loop is running, holding off any concurrent
    /// `stop()` until it returns.
    pub fn while_running<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let binding = self.binding.lock();
        binding.running.then(f)
    }
}

/// Channels a loop reads every tick.
pub struct LoopInputs {
    pub pose: watch::Receiver<CameraPose>,
    pub scene: watch::Receiver<SceneFrame>,
}

pub struct RenderLoop {
    surface_id: String,
    binding: Arc<Mutex<Binding>>,
    cancel: Mutex<Option<CancellationToken>>,
    period: Duration,
    rasterizer: Arc<Rasterizer>,
    inputs: LoopInputs,
    events: mpsc::UnboundedSender<SessionEvent>,
    presented: Arc<AtomicU64>,
    runtime: Handle,
}

impl RenderLoop {
    pub fn new(
        surface_id: String,
        surface: Box<dyn Surface>,
        inputs: LoopInputs,
        rasterizer: Rasterizer,
        period: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
        runtime: Handle,
    ) -> Self {
        Self {
            surface_id,
            binding: Arc::new(Mutex::new(Binding {
                surface: Some(surface),
                running: false,
                lost: false,
            })),
            cancel: Mutex::new(None),
            period: period.max(Duration::from_millis(1)),
            rasterizer: Arc::new(rasterizer),
            inputs,
            events,
            presented: Arc::new(AtomicU64::new(0)),
            runtime,
        }
    }

    pub fn state(&self) -> RunState {
        if self.binding.lock().running {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn gate(&self) -> RunGate {
        RunGate {
            binding: Arc::clone(&self.binding),
        }
    }

    /// Frames successfully handed to the surface since creation.
    pub fn frames_presented(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }

    /// Bind `surface`, replacing any previous one. Clears a recorded loss.
    pub fn attach(&self, surface: Box<dyn Surface>) {
        let mut binding = self.binding.lock();
        binding.surface = Some(surface);
        binding.lost = false;
        debug!(surface = %self.surface_id, "surface attached");
    }

    /// Begin ticking. A no-op when already running.
    ///
    /// # Errors
    /// [`StartError::Lost`] once the surface has been lost and
    /// [`StartError::Released`] after `stop()`; the loop never rebinds on its
    /// own, see [`RenderLoop::attach`].
    pub fn start(&self) -> Result<(), StartError> {
        let mut cancel_slot = self.cancel.lock();
        {
            let mut binding = self.binding.lock();
            if binding.running {
                return Ok(());
            }
            if binding.surface.is_none() {
                let surface_id = self.surface_id.clone();
                return Err(if binding.lost {
                    StartError::Lost(SurfaceLostError { surface_id })
                } else {
                    StartError::Released { surface_id }
                });
            }
            binding.running = true;
        }

        if let Some(stale) = cancel_slot.take() {
            stale.cancel();
        }
        let cancel = CancellationToken::new();
        *cancel_slot = Some(cancel.clone());

        let ticker = Ticker {
            surface_id: self.surface_id.clone(),
            binding: Arc::clone(&self.binding),
            rasterizer: Arc::clone(&self.rasterizer),
            pose: self.inputs.pose.clone(),
            scene: self.inputs.scene.clone(),
            events: self.events.clone(),
            presented: Arc::clone(&self.presented),
            frame: PixelBuffer::default(),
        };
        self.runtime.spawn(run(ticker, self.period, cancel));
        info!(surface = %self.surface_id, period = ?self.period, "render loop started");
        Ok(())
    }

    /// Cancel ticking and release the surface. Once this returns no further
    /// frame reaches the surface.
    ///
    /// A no-op when already stopped; returns whether the loop was running.
    pub fn stop(&self) -> bool {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        let released = {
            let mut binding = self.binding.lock();
            if !binding.running {
                return false;
            }
            binding.running = false;
            binding.surface.take()
        };
        // surface teardown runs after the lock is released
        drop(released);
        info!(surface = %self.surface_id, "render loop stopped; surface released");
        true
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(mut ticker: Ticker, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !ticker.tick() {
                    break;
                }
            }
        }
    }
    debug!(surface = %ticker.surface_id, "tick task exited");
}

struct Ticker {
    surface_id: String,
    binding: Arc<Mutex<Binding>>,
    rasterizer: Arc<Rasterizer>,
    pose: watch::Receiver<CameraPose>,
    scene: watch::Receiver<SceneFrame>,
    events: mpsc::UnboundedSender<SessionEvent>,
    presented: Arc<AtomicU64>,
    /// Reused between ticks; surfaces copy what they keep.
    frame: PixelBuffer,
}

impl Ticker {
    /// One frame. Returns `false` once the loop should exit.
    fn tick(&mut self) -> bool {
        let (width, height) = {
            let binding = self.binding.lock();
            match (binding.running, binding.surface.as_ref()) {
                (true, Some(surface)) => surface.size(),
                _ => return false,
            }
        };

        let pose = *self.pose.borrow();
        let scene = self.scene.borrow().clone();
        self.rasterizer
            .render_into(&scene, &pose, width, height, &mut self.frame);

        let mut binding = self.binding.lock();
        if !binding.running {
            return false;
        }
        let Some(surface) = binding.surface.as_mut() else {
            return false;
        };
        match surface.present(&self.frame) {
            Ok(()) => {
                self.presented.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(_) => {
                binding.running = false;
                binding.lost = true;
                let lost = binding.surface.take();
                drop(binding);
                drop(lost);
                let err = SurfaceLostError {
                    surface_id: self.surface_id.clone(),
                };
                warn!(surface = %self.surface_id, "surface lost; render loop stopped");
                let _ = self.events.send(SessionEvent::SurfaceLost(err));
                false
            }
        }
    }
}

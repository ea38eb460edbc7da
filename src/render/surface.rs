//! The drawable target a render loop presents to. Surfaces are created and
//! destroyed by the host; the core only binds to them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::pixels::PixelBuffer;

/// Returned by [`Surface::present`] once the host has destroyed the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceUnavailable;

pub trait Surface: Send + 'static {
    /// Drawable size in physical pixels.
    fn size(&self) -> (u32, u32);

    /// Show a fully composed frame.
    fn present(&mut self, frame: &PixelBuffer) -> Result<(), SurfaceUnavailable>;
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn present(&mut self, frame: &PixelBuffer) -> Result<(), SurfaceUnavailable> {
        (**self).present(frame)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    width: u32,
    height: u32,
    presented: u64,
    last: Option<PixelBuffer>,
    destroyed: bool,
}

/// Off-screen surface that keeps the most recent frame.
///
/// Clones share state, so one handle can be bound while another inspects
/// presented frames or simulates the host tearing the surface down.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                width,
                height,
                ..MemoryState::default()
            })),
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.state.lock().presented
    }

    pub fn last_frame(&self) -> Option<PixelBuffer> {
        self.state.lock().last.clone()
    }

    /// Make every later `present` fail.
    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
    }

    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
    }
}

impl Surface for MemorySurface {
    fn size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    fn present(&mut self, frame: &PixelBuffer) -> Result<(), SurfaceUnavailable> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(SurfaceUnavailable);
        }
        state.presented += 1;
        state.last = Some(frame.clone());
        Ok(())
    }
}

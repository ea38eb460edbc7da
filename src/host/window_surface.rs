use std::sync::Arc;

use parking_lot::Mutex;
use winit::event_loop::EventLoopProxy;

use crate::pixels::PixelBuffer;
use crate::render::surface::{Surface, SurfaceUnavailable};

#[derive(Debug)]
pub enum HostEvent {
    /// A new frame is waiting in the slot.
    FrameReady,
    /// The async runtime asked the window to close.
    Cancelled,
}

#[derive(Debug, Default)]
struct Slot {
    width: u32,
    height: u32,
    frame: Option<PixelBuffer>,
    closed: bool,
}

/// Window-side half of a [`WindowSurface`]: owned by the event loop, which
/// resizes it, drains frames and closes it.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Slot>>,
}

impl FrameSlot {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                width,
                height,
                ..Slot::default()
            })),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        let mut slot = self.inner.lock();
        slot.width = width;
        slot.height = height;
    }

    /// Most recent frame not yet drawn.
    pub fn take(&self) -> Option<PixelBuffer> {
        self.inner.lock().frame.take()
    }

    /// Every later present fails; the bound session sees the surface as lost.
    pub fn close(&self) {
        let mut slot = self.inner.lock();
        slot.closed = true;
        slot.frame = None;
    }
}

/// Wakes whoever draws the slot. Fails once nobody is listening.
pub trait FrameNotifier: Send + 'static {
    fn frame_ready(&self) -> Result<(), SurfaceUnavailable>;
}

impl FrameNotifier for EventLoopProxy<HostEvent> {
    fn frame_ready(&self) -> Result<(), SurfaceUnavailable> {
        self.send_event(HostEvent::FrameReady)
            .map_err(|_| SurfaceUnavailable)
    }
}

/// Session-side half: the loop renders on the runtime and parks frames here,
/// then wakes the event loop to draw them.
pub struct WindowSurface<N = EventLoopProxy<HostEvent>> {
    slot: FrameSlot,
    notifier: N,
}

impl<N: FrameNotifier> WindowSurface<N> {
    pub fn new(slot: FrameSlot, notifier: N) -> Self {
        Self { slot, notifier }
    }
}

impl<N: FrameNotifier> Surface for WindowSurface<N> {
    fn size(&self) -> (u32, u32) {
        let slot = self.slot.inner.lock();
        (slot.width, slot.height)
    }

    fn present(&mut self, frame: &PixelBuffer) -> Result<(), SurfaceUnavailable> {
        {
            let mut slot = self.slot.inner.lock();
            if slot.closed {
                return Err(SurfaceUnavailable);
            }
            // an undrawn frame is simply replaced
            slot.frame = Some(frame.clone());
        }
        self.notifier.frame_ready()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct CountingNotifier {
        wakes: Arc<AtomicUsize>,
        gone: Arc<AtomicBool>,
    }

    impl FrameNotifier for CountingNotifier {
        fn frame_ready(&self) -> Result<(), SurfaceUnavailable> {
            if self.gone.load(Ordering::Acquire) {
                return Err(SurfaceUnavailable);
            }
            self.wakes.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }
    }

    fn frame(value: u8) -> PixelBuffer {
        PixelBuffer::filled(2, 1, [value, value, value, 255]).unwrap()
    }

    #[test]
    fn present_parks_the_latest_frame_and_wakes_the_window() {
        let slot = FrameSlot::new(2, 1);
        let notifier = CountingNotifier::default();
        let mut surface = WindowSurface::new(slot.clone(), notifier.clone());
        assert_eq!(surface.size(), (2, 1));

        surface.present(&frame(1)).unwrap();
        surface.present(&frame(2)).unwrap();
        assert_eq!(notifier.wakes.load(Ordering::Acquire), 2);
        assert_eq!(slot.take().unwrap().pixel(0, 0), Some([2, 2, 2, 255]));
        assert!(slot.take().is_none());

        slot.resize(3, 4);
        assert_eq!(surface.size(), (3, 4));
    }

    #[test]
    fn closed_slot_reports_the_surface_unavailable() {
        let slot = FrameSlot::new(2, 1);
        let notifier = CountingNotifier::default();
        let mut surface = WindowSurface::new(slot.clone(), notifier.clone());
        surface.present(&frame(7)).unwrap();

        slot.close();
        assert!(slot.take().is_none());
        assert_eq!(surface.present(&frame(8)), Err(SurfaceUnavailable));
        assert!(slot.take().is_none());
        assert_eq!(notifier.wakes.load(Ordering::Acquire), 1);
    }

    #[test]
    fn exited_event_loop_reports_the_surface_unavailable() {
        let slot = FrameSlot::new(2, 1);
        let notifier = CountingNotifier::default();
        let mut surface = WindowSurface::new(slot, notifier.clone());
        notifier.gone.store(true, Ordering::Release);
        assert_eq!(surface.present(&frame(3)), Err(SurfaceUnavailable));
    }
}

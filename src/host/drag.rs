/// Press/move/release bookkeeping that turns cursor positions into deltas.
///
/// Only moves while the primary button is held produce a delta; the first
/// move after a press just records the anchor.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DragTracker {
    pressed: bool,
    last: Option<(f64, f64)>,
}

impl DragTracker {
    pub fn press(&mut self) {
        self.pressed = true;
    }

    pub fn release(&mut self) {
        self.pressed = false;
        self.last = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.pressed
    }

    /// Record a cursor position; returns `(dx, dy)` while dragging.
    pub fn moved(&mut self, x: f64, y: f64) -> Option<(f32, f32)> {
        let previous = self.last.replace((x, y));
        if !self.pressed {
            return None;
        }
        let (px, py) = previous?;
        let (dx, dy) = ((x - px) as f32, (y - py) as f32);
        (dx != 0.0 || dy != 0.0).then_some((dx, dy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hover_produces_no_delta() {
        let mut drag = DragTracker::default();
        assert_eq!(drag.moved(10.0, 10.0), None);
        assert_eq!(drag.moved(20.0, 10.0), None);
    }

    #[test]
    fn press_then_move_reports_relative_motion() {
        let mut drag = DragTracker::default();
        drag.moved(10.0, 10.0);
        drag.press();
        assert_eq!(drag.moved(15.0, 8.0), Some((5.0, -2.0)));
        assert_eq!(drag.moved(15.0, 8.0), None);
        assert_eq!(drag.moved(14.0, 9.0), Some((-1.0, 1.0)));
    }

    #[test]
    fn release_forgets_anchor() {
        let mut drag = DragTracker::default();
        drag.press();
        assert_eq!(drag.moved(0.0, 0.0), None);
        drag.release();
        assert!(!drag.is_dragging());
        drag.press();
        // first move after a new press only anchors
        assert_eq!(drag.moved(100.0, 100.0), None);
        assert_eq!(drag.moved(101.0, 100.0), Some((1.0, 0.0)));
    }
}

use std::time::Instant;

use mirror_types::{geometry::CanvasPoint, gesture::PointerEvent};

/// Edge-detects a polled mouse button into press/release cycles.
///
/// Only the in-flight press is retained; nothing survives a completed cycle.
#[derive(Debug, Default)]
pub struct PointerTracker {
    pressed: Option<(CanvasPoint, Instant)>,
    button_was_down: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed.is_some()
    }

    /// Feeds one poll of the button state. Yields an event on release.
    ///
    /// A press that starts outside the window is ignored, and a release outside
    /// the window abandons the cycle.
    pub fn sample(
        &mut self,
        button_down: bool,
        position: Option<CanvasPoint>,
        at: Instant,
    ) -> Option<PointerEvent> {
        let was_down = std::mem::replace(&mut self.button_was_down, button_down);
        match (was_down, button_down) {
            (false, true) => {
                self.pressed = position.map(|point| (point, at));
                None
            }
            (true, false) => {
                let (down, down_at) = self.pressed.take()?;
                let up = position?;
                Some(PointerEvent {
                    down,
                    up,
                    down_at,
                    up_at: at,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn press_release_yields_single_event() {
        let mut tracker = PointerTracker::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(150);

        assert!(tracker
            .sample(true, Some(CanvasPoint::new(10.0, 20.0)), t0)
            .is_none());
        assert!(tracker.is_pressed());
        assert!(tracker
            .sample(true, Some(CanvasPoint::new(12.0, 25.0)), t0)
            .is_none());

        let event = tracker
            .sample(false, Some(CanvasPoint::new(15.0, 30.0)), t1)
            .expect("release completes the cycle");
        assert_eq!(event.down, CanvasPoint::new(10.0, 20.0));
        assert_eq!(event.up, CanvasPoint::new(15.0, 30.0));
        assert_eq!(event.duration(), Duration::from_millis(150));

        assert!(!tracker.is_pressed());
        assert!(tracker
            .sample(false, Some(CanvasPoint::new(15.0, 30.0)), t1)
            .is_none());
    }

    #[test]
    fn release_outside_window_discards_cycle() {
        let mut tracker = PointerTracker::new();
        let now = Instant::now();
        tracker.sample(true, Some(CanvasPoint::new(1.0, 1.0)), now);
        assert!(tracker.sample(false, None, now).is_none());
        assert!(!tracker.is_pressed());
    }

    #[test]
    fn press_outside_window_is_ignored() {
        let mut tracker = PointerTracker::new();
        let now = Instant::now();
        tracker.sample(true, None, now);
        assert!(tracker
            .sample(false, Some(CanvasPoint::new(5.0, 5.0)), now)
            .is_none());
    }
}

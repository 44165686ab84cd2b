use std::time::Duration;

use mirror_types::{
    config::GestureConfig,
    gesture::{Command, PointerEvent},
};
use tracing::info;

use crate::layout::CoordinateMapper;

/// Turns a press/release cycle into a tap or a swipe in device space.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    config: GestureConfig,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self { config }
    }

    /// Returns `None` when either endpoint falls outside the drawn image.
    pub fn classify(&self, event: &PointerEvent, mapper: &CoordinateMapper) -> Option<Command> {
        let from = mapper.view_to_device(event.down)?;
        let to = mapper.view_to_device(event.up)?;

        let duration = event.duration();
        let move_px = event.down.distance_to(&event.up);
        let move_pt = from.distance_to(&to);

        if self.is_tap(duration, move_px, move_pt) {
            info!(
                duration_ms = duration.as_millis() as u64,
                move_px, move_pt, "planned tap"
            );
            // Taps anchor on the press position.
            Some(Command::Tap { at: from })
        } else {
            info!(
                duration_ms = duration.as_millis() as u64,
                move_px, move_pt, "planned swipe"
            );
            Some(Command::Swipe {
                from,
                to,
                duration: self.config.clamp_swipe_duration(duration),
            })
        }
    }

    pub fn is_tap(&self, duration: Duration, move_px: f64, move_pt: f64) -> bool {
        if move_pt < self.config.swipe_min_pt {
            return true;
        }
        duration <= self.config.tap_time_max()
            && (move_px <= self.config.tap_move_max_px || move_pt <= self.config.tap_move_max_pt)
    }
}

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::geometry::{CanvasPoint, DevicePoint};

/// One completed press/release cycle in canvas space.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub down: CanvasPoint,
    pub up: CanvasPoint,
    pub down_at: Instant,
    pub up_at: Instant,
}

impl PointerEvent {
    pub fn duration(&self) -> Duration {
        self.up_at.saturating_duration_since(self.down_at)
    }
}

/// Touch command in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Tap {
        at: DevicePoint,
    },
    Swipe {
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Tap { .. } => "tap",
            Command::Swipe { .. } => "swipe",
        }
    }
}

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a source image or canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Point in rendered-canvas pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl CanvasPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &CanvasPoint) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Point in device point (pt) space, as reported by the device window size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

impl DevicePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &DevicePoint) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Device window size in pt. Fetched once per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSize {
    pub width: f64,
    pub height: f64,
}

impl DeviceSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

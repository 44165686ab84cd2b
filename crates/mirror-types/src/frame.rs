use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{geometry::Size, MirrorError, Result};

/// Which acquisition strategy produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameOrigin {
    Stream,
    Poll,
}

/// A decoded device screen image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer, `width * height * 4` bytes.
    pub data: Vec<u8>,
    pub origin: FrameOrigin,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, origin: FrameOrigin) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(MirrorError::Decode(format!(
                "frame buffer of {} bytes does not match {width}x{height} RGBA",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            origin,
            captured_at: Utc::now(),
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

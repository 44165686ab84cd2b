//! Frame acquisition: MJPEG streaming with screenshot polling as fallback.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use mirror_device::WdaClient;
use mirror_types::{
    frame::{Frame, FrameOrigin},
    MirrorError, Result,
};
use tokio::sync::watch;

pub mod mjpeg;
pub mod poll;
pub mod source;
pub mod stream;

pub use source::{CaptureHandle, FrameSource};

/// Single-slot latest-frame buffer. Later frames overwrite earlier ones.
///
/// The lock only guards a pointer swap, so readers get either the previous or
/// the newest complete frame.
#[derive(Clone)]
pub struct FrameSlot {
    frame: Arc<Mutex<Option<Arc<Frame>>>>,
    generation: Arc<watch::Sender<u64>>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        let (generation, _rx) = watch::channel(0);
        Self {
            frame: Arc::new(Mutex::new(None)),
            generation: Arc::new(generation),
        }
    }

    /// Stores `frame` and returns its generation number.
    pub fn publish(&self, frame: Frame) -> u64 {
        let frame = Arc::new(frame);
        let mut guard = match self.frame.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(frame);
        let mut published = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            published = *generation;
        });
        published
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        match self.frame.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of frames published so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Waits up to `timeout` for a frame newer than generation `seen`.
    pub async fn wait_for_newer(&self, seen: u64, timeout: Duration) -> bool {
        let mut rx = self.generation.subscribe();
        // Bound to a local so the watch borrow ends before `rx` drops.
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|generation| *generation > seen)).await,
            Ok(Ok(_))
        );
        reached
    }
}

/// Single-shot encoded screenshots.
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    async fn fetch_screenshot(&self) -> Result<Vec<u8>>;
}

/// Persistent multipart JPEG body, as raw chunks.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open_stream(&self) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
}

#[async_trait]
impl ScreenshotSource for WdaClient {
    async fn fetch_screenshot(&self) -> Result<Vec<u8>> {
        self.screenshot().await
    }
}

#[async_trait]
impl StreamSource for WdaClient {
    async fn open_stream(&self) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        WdaClient::open_stream(self).await
    }
}

/// Decodes PNG/JPEG bytes into an RGBA frame off the async workers.
pub async fn decode_frame(bytes: Vec<u8>, origin: FrameOrigin) -> Result<Frame> {
    tokio::task::spawn_blocking(move || decode_image(&bytes, origin))
        .await
        .map_err(|err| capture_error(format!("decode task failed: {err}")))?
}

pub fn decode_image(bytes: &[u8], origin: FrameOrigin) -> Result<Frame> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| MirrorError::Decode(format!("image decode failed: {err}")))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Frame::from_rgba(width, height, rgba.into_raw(), origin)
}

pub fn capture_error(message: impl Into<String>) -> MirrorError {
    MirrorError::Capture(message.into())
}

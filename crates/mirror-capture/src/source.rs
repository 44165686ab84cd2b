//! Startup policy tying the two acquisition strategies to one frame slot.

use std::sync::Arc;

use mirror_ops::StopSignal;
use mirror_types::config::CaptureConfig;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{poll::run_polling, stream::run_stream, FrameSlot, ScreenshotSource, StreamSource};

pub struct FrameSource<S> {
    source: Arc<S>,
    slot: FrameSlot,
    stop: StopSignal,
    config: CaptureConfig,
}

/// Running acquisition tasks.
pub struct CaptureHandle {
    tasks: Vec<JoinHandle<()>>,
    polling: bool,
}

impl CaptureHandle {
    pub fn polling_started(&self) -> bool {
        self.polling
    }

    /// Waits for the acquisition tasks after the stop signal was raised.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "capture task panicked");
            }
        }
    }
}

impl<S> FrameSource<S>
where
    S: StreamSource + ScreenshotSource + 'static,
{
    pub fn new(source: Arc<S>, slot: FrameSlot, stop: StopSignal, config: CaptureConfig) -> Self {
        Self {
            source,
            slot,
            stop,
            config,
        }
    }

    /// Starts the stream first; if it yields nothing within the grace window,
    /// polling starts alongside it without cancelling the stream.
    pub async fn start(self) -> CaptureHandle {
        let mut handle = CaptureHandle {
            tasks: Vec::with_capacity(2),
            polling: false,
        };

        if !self.config.prefer_stream {
            self.spawn_polling(&mut handle);
            return handle;
        }

        let seen = self.slot.generation();
        handle.tasks.push(tokio::spawn(run_stream(
            self.source.clone(),
            self.slot.clone(),
            self.stop.clone(),
        )));

        let grace = self.config.stream_grace();
        if self.slot.wait_for_newer(seen, grace).await {
            info!("streaming capture active");
        } else if !self.stop.is_stopped() {
            info!(
                grace_ms = grace.as_millis() as u64,
                "no streamed frame within grace window; starting screenshot polling"
            );
            self.spawn_polling(&mut handle);
        }
        handle
    }

    fn spawn_polling(&self, handle: &mut CaptureHandle) {
        handle.tasks.push(tokio::spawn(run_polling(
            self.source.clone(),
            self.slot.clone(),
            self.stop.clone(),
            self.config.poll_interval(),
        )));
        handle.polling = true;
    }
}

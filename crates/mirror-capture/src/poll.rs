//! Polling acquisition strategy.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use mirror_ops::StopSignal;
use mirror_types::{
    frame::{Frame, FrameOrigin},
    Result,
};
use tracing::{debug, info};

use crate::{decode_frame, FrameSlot, ScreenshotSource};

/// Fetches a screenshot every `interval` until stopped.
///
/// A cycle that overruns the interval starts the next one immediately.
/// Network and decode failures are retried on the next cycle.
pub async fn run_polling<S>(source: Arc<S>, slot: FrameSlot, stop: StopSignal, interval: Duration)
where
    S: ScreenshotSource + ?Sized,
{
    info!(interval_ms = interval.as_millis() as u64, "screenshot polling started");
    let mut failures = 0u64;
    let mut published = 0u64;

    while !stop.is_stopped() {
        let started = Instant::now();
        let result = tokio::select! {
            _ = stop.stopped() => break,
            result = poll_once(source.as_ref()) => result,
        };
        match result {
            Ok(frame) => {
                if published == 0 {
                    info!(width = frame.width, height = frame.height, "first polled frame");
                }
                slot.publish(frame);
                published += 1;
                failures = 0;
            }
            Err(err) => {
                failures += 1;
                debug!(error = %err, failures, "screenshot poll failed");
            }
        }

        let elapsed = started.elapsed();
        if elapsed < interval && !stop.sleep(interval - elapsed).await {
            break;
        }
    }
    info!(published, "screenshot polling stopped");
}

async fn poll_once<S>(source: &S) -> Result<Frame>
where
    S: ScreenshotSource + ?Sized,
{
    let bytes = source.fetch_screenshot().await?;
    decode_frame(bytes, FrameOrigin::Poll).await
}

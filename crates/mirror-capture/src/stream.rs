//! Streaming acquisition strategy.

use std::sync::Arc;

use futures::StreamExt;
use mirror_ops::StopSignal;
use mirror_types::frame::FrameOrigin;
use tracing::{debug, info, warn};

use crate::{decode_frame, mjpeg::jpeg_frames, FrameSlot, StreamSource};

/// Publishes every decoded stream image until stopped or the stream ends.
///
/// Never fails: an unavailable or finished stream simply returns, and the
/// caller notices the missing frames.
pub async fn run_stream<S>(source: Arc<S>, slot: FrameSlot, stop: StopSignal)
where
    S: StreamSource + ?Sized,
{
    let opened = tokio::select! {
        _ = stop.stopped() => {
            debug!("stopped while the frame stream was opening");
            return;
        }
        opened = source.open_stream() => opened,
    };
    let chunks = match opened {
        Ok(chunks) => chunks,
        Err(err) => {
            info!(error = %err, "frame stream unavailable");
            return;
        }
    };
    info!("frame stream connected");

    let mut frames = Box::pin(jpeg_frames(chunks));
    let mut published = 0u64;
    loop {
        let next = tokio::select! {
            _ = stop.stopped() => break,
            next = frames.next() => next,
        };
        let jpeg = match next {
            Some(Ok(jpeg)) => jpeg,
            Some(Err(err)) => {
                warn!(error = %err, "frame stream interrupted");
                break;
            }
            None => {
                info!("frame stream ended");
                break;
            }
        };

        match decode_frame(jpeg, FrameOrigin::Stream).await {
            Ok(frame) => {
                if published == 0 {
                    info!(width = frame.width, height = frame.height, "first streamed frame");
                }
                slot.publish(frame);
                published += 1;
            }
            Err(err) => debug!(error = %err, "dropping undecodable stream frame"),
        }
    }
    debug!(published, "stream capture finished");
}

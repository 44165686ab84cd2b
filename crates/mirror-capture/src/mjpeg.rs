//! Splits a multipart JPEG body into individual images.

use futures::stream::{BoxStream, Stream};
use mirror_types::Result;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const SCAN_LIMIT: usize = 64 * 1024;
const MAX_PENDING: usize = 16 * 1024 * 1024;

/// Accumulates body chunks and cuts complete JPEG images on SOI/EOI markers,
/// skipping multipart boundaries and headers in between.
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buffer: Vec<u8>,
    /// Offset up to which the pending image was already searched for EOI.
    scanned: usize,
}

impl MjpegSplitter {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buffer, &SOI) else {
            self.scanned = 0;
            if self.buffer.len() > SCAN_LIMIT {
                // Keep a trailing 0xFF in case the marker straddles chunks.
                let keep = self.buffer.len() - 1;
                self.buffer.drain(..keep);
            }
            return None;
        };
        if start > 0 {
            self.buffer.drain(..start);
            self.scanned = 0;
        }

        let from = self.scanned.max(SOI.len());
        let Some(end) = find_marker(&self.buffer[from..], &EOI) else {
            if self.buffer.len() > MAX_PENDING {
                self.buffer.clear();
                self.scanned = 0;
            } else {
                // Rescan the last byte next time; it may be the 0xFF of a split EOI.
                self.scanned = (self.buffer.len() + 1).saturating_sub(EOI.len()).max(SOI.len());
            }
            return None;
        };
        let frame_end = from + end + EOI.len();
        self.scanned = 0;
        Some(self.buffer.drain(..frame_end).collect())
    }

    /// Returns only the newest complete image, discarding older ones.
    pub fn drain_latest(&mut self) -> Option<Vec<u8>> {
        let mut latest = None;
        while let Some(frame) = self.next_frame() {
            latest = Some(frame);
        }
        latest
    }
}

fn find_marker(buffer: &[u8], marker: &[u8]) -> Option<usize> {
    buffer
        .windows(marker.len())
        .position(|window| window == marker)
}

/// Adapts a chunked body into a stream of the newest JPEG per chunk.
pub fn jpeg_frames(
    mut chunks: BoxStream<'static, Result<Vec<u8>>>,
) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
    async_stream::try_stream! {
        let mut splitter = MjpegSplitter::default();
        while let Some(chunk) = futures::StreamExt::next(&mut chunks).await {
            let chunk = chunk?;
            splitter.push(&chunk);
            if let Some(jpeg) = splitter.drain_latest() {
                yield jpeg;
            }
        }
    }
}

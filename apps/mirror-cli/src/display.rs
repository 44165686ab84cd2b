use std::time::Instant;

use anyhow::{anyhow, Result};
use image::{imageops, ImageBuffer, Rgba};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, ScaleMode, Window, WindowOptions};
use mirror_capture::FrameSlot;
use mirror_dispatch::CommandSender;
use mirror_gesture::{CoordinateMapper, GestureClassifier, Layout, PointerTracker};
use mirror_ops::StopSignal;
use mirror_types::{
    config::DisplayConfig,
    frame::Frame,
    geometry::{CanvasPoint, Size},
};
use tracing::{debug, info};

/// Initial window size: `source` fitted inside the display bounds, never upscaled.
pub fn fit_canvas(source: Size, max_width: u32, max_height: u32) -> Size {
    if source.is_empty() {
        return Size::new(max_width.max(1), max_height.max(1));
    }
    let scale = (f64::from(max_width) / f64::from(source.width))
        .min(f64::from(max_height) / f64::from(source.height))
        .min(1.0);
    Size::new(
        ((f64::from(source.width) * scale).round() as u32).max(1),
        ((f64::from(source.height) * scale).round() as u32).max(1),
    )
}

/// Render/input loop. Returns when the window closes, a quit key is pressed or
/// the stop signal is raised.
pub fn run(
    config: &DisplayConfig,
    initial: Size,
    mut mapper: CoordinateMapper,
    slot: FrameSlot,
    classifier: GestureClassifier,
    sender: CommandSender,
    stop: &StopSignal,
) -> Result<()> {
    let mut window = Window::new(
        &config.title,
        initial.width as usize,
        initial.height as usize,
        WindowOptions {
            resize: true,
            scale_mode: ScaleMode::UpperLeft,
            ..WindowOptions::default()
        },
    )
    .map_err(|err| anyhow!("failed to open window: {err}"))?;
    window.set_target_fps(config.target_fps);

    let mut canvas = Canvas::default();
    let mut tracker = PointerTracker::new();

    while window.is_open() && !stop.is_stopped() {
        if window.is_key_down(Key::Escape) || window.is_key_pressed(Key::Q, KeyRepeat::No) {
            info!("quit requested");
            break;
        }

        let (width, height) = window.get_size();
        let size = Size::new(width as u32, height as u32);
        if size.is_empty() {
            window.update();
            continue;
        }

        // Generation first: the frame read after it is at least that new.
        let generation = slot.generation();
        let frame = slot.latest();
        if let Some(frame) = &frame {
            mapper.update(frame.size(), size);
        }
        canvas.draw(size, frame.as_deref().map(|f| (generation, f)), mapper.layout());

        let position = window
            .get_mouse_pos(MouseMode::Discard)
            .map(|(x, y)| CanvasPoint::new(f64::from(x), f64::from(y)));
        let pressed = window.get_mouse_down(MouseButton::Left);
        if let Some(event) = tracker.sample(pressed, position, Instant::now()) {
            match classifier.classify(&event, &mapper) {
                Some(command) => {
                    sender.submit(command);
                }
                None => debug!("pointer released outside the mirrored screen"),
            }
        }

        window
            .update_with_buffer(canvas.pixels(), width, height)
            .map_err(|err| anyhow!("failed to present frame: {err}"))?;
    }
    Ok(())
}

/// 0RGB pixel buffer for the window, redrawn only when the frame or size changes.
#[derive(Default)]
pub struct Canvas {
    size: Size,
    pixels: Vec<u32>,
    drawn: Option<u64>,
}

impl Canvas {
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn draw(&mut self, size: Size, frame: Option<(u64, &Frame)>, layout: Option<&Layout>) {
        let generation = frame.map(|(generation, _)| generation);
        if size == self.size && generation == self.drawn {
            return;
        }
        self.size = size;
        self.drawn = generation;
        self.pixels.clear();
        self.pixels
            .resize(size.width as usize * size.height as usize, 0);

        let (Some((_, frame)), Some(layout)) = (frame, layout) else {
            return;
        };
        if layout.canvas != size || layout.source != frame.size() {
            return;
        }
        let Some(source) = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(
            frame.width,
            frame.height,
            frame.data.as_slice(),
        ) else {
            return;
        };
        let scaled = imageops::resize(
            &source,
            layout.drawn_width,
            layout.drawn_height,
            imageops::FilterType::Triangle,
        );

        let stride = size.width as usize;
        for (y, row) in scaled.rows().enumerate() {
            let start = (layout.offset_y as usize + y) * stride + layout.offset_x as usize;
            for (x, pixel) in row.enumerate() {
                let [r, g, b, _] = pixel.0;
                self.pixels[start + x] = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
            }
        }
    }
}

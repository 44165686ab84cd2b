//! Letterbox fitting and the capture px -> canvas px -> device pt transforms.

use mirror_types::geometry::{CanvasPoint, DevicePoint, DeviceSize, Size};
use serde::{Deserialize, Serialize};

/// Placement of a source image inside a canvas, aspect preserved and centered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub source: Size,
    pub canvas: Size,
    /// Canvas pixels per source pixel.
    pub scale: f64,
    pub offset_x: u32,
    pub offset_y: u32,
    pub drawn_width: u32,
    pub drawn_height: u32,
}

impl Layout {
    /// Fits `source` inside `canvas` without cropping. `None` until both sizes are known.
    pub fn fit(source: Size, canvas: Size) -> Option<Self> {
        if source.is_empty() || canvas.is_empty() {
            return None;
        }
        let scale = (f64::from(canvas.width) / f64::from(source.width))
            .min(f64::from(canvas.height) / f64::from(source.height));
        let drawn_width = ((f64::from(source.width) * scale).round() as u32).min(canvas.width);
        let drawn_height = ((f64::from(source.height) * scale).round() as u32).min(canvas.height);

        Some(Self {
            source,
            canvas,
            scale,
            offset_x: (canvas.width - drawn_width) / 2,
            offset_y: (canvas.height - drawn_height) / 2,
            drawn_width,
            drawn_height,
        })
    }

    fn effective_scale(&self) -> f64 {
        if self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }

    /// Canvas point to source pixel coordinates; `None` inside the letterbox padding.
    pub fn view_to_source(&self, point: CanvasPoint) -> Option<(f64, f64)> {
        let scale = self.effective_scale();
        let x = (point.x - f64::from(self.offset_x)) / scale;
        let y = (point.y - f64::from(self.offset_y)) / scale;
        let inside = (0.0..=f64::from(self.source.width)).contains(&x)
            && (0.0..=f64::from(self.source.height)).contains(&y);
        inside.then_some((x, y))
    }

    pub fn source_to_view(&self, x: f64, y: f64) -> CanvasPoint {
        let scale = self.effective_scale();
        CanvasPoint::new(
            x * scale + f64::from(self.offset_x),
            y * scale + f64::from(self.offset_y),
        )
    }
}

/// Holds the cached layout and the device window size for one run.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    device: DeviceSize,
    layout: Option<Layout>,
}

impl CoordinateMapper {
    pub fn new(device: DeviceSize) -> Self {
        Self {
            device,
            layout: None,
        }
    }

    pub fn device_size(&self) -> DeviceSize {
        self.device
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Recomputes the layout only when the source or canvas size changed.
    pub fn update(&mut self, source: Size, canvas: Size) -> Option<&Layout> {
        let stale = match &self.layout {
            Some(layout) => layout.source != source || layout.canvas != canvas,
            None => true,
        };
        if stale {
            self.layout = Layout::fit(source, canvas);
        }
        self.layout.as_ref()
    }

    pub fn view_to_device(&self, point: CanvasPoint) -> Option<DevicePoint> {
        let layout = self.layout.as_ref()?;
        if self.device.width <= 0.0 || self.device.height <= 0.0 {
            return None;
        }
        let (x, y) = layout.view_to_source(point)?;
        Some(DevicePoint::new(
            x / f64::from(layout.source.width) * self.device.width,
            y / f64::from(layout.source.height) * self.device.height,
        ))
    }

    /// Inverse of the source -> device scaling.
    pub fn device_to_source(&self, point: DevicePoint) -> Option<(f64, f64)> {
        let layout = self.layout.as_ref()?;
        if self.device.width <= 0.0 || self.device.height <= 0.0 {
            return None;
        }
        Some((
            point.x / self.device.width * f64::from(layout.source.width),
            point.y / self.device.height * f64::from(layout.source.height),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [u32; 9] = [1, 2, 7, 100, 375, 640, 828, 1179, 2556];

    #[test]
    fn fit_stays_inside_canvas_for_all_sizes() {
        for &sw in &SIZES {
            for &sh in &SIZES {
                for &dw in &SIZES {
                    for &dh in &SIZES {
                        let layout = Layout::fit(Size::new(sw, sh), Size::new(dw, dh))
                            .expect("non-empty sizes fit");
                        assert!(layout.scale > 0.0);
                        assert!(layout.drawn_width <= dw);
                        assert!(layout.drawn_height <= dh);
                        assert!(layout.offset_x + layout.drawn_width <= dw);
                        assert!(layout.offset_y + layout.drawn_height <= dh);
                    }
                }
            }
        }
    }

    #[test]
    fn fit_centers_portrait_source_in_square_canvas() {
        let layout = Layout::fit(Size::new(1170, 2532), Size::new(900, 900)).expect("layout");
        assert_eq!(layout.drawn_height, 900);
        assert_eq!(layout.drawn_width, 416);
        assert_eq!(layout.offset_x, (900 - 416) / 2);
        assert_eq!(layout.offset_y, 0);
    }

    #[test]
    fn fit_requires_known_sizes() {
        assert!(Layout::fit(Size::new(0, 100), Size::new(100, 100)).is_none());
        assert!(Layout::fit(Size::new(100, 100), Size::new(100, 0)).is_none());
    }

    #[test]
    fn zero_scale_does_not_divide_by_zero() {
        let mut layout = Layout::fit(Size::new(100, 200), Size::new(100, 200)).expect("layout");
        layout.scale = 0.0;
        let (x, y) = layout
            .view_to_source(CanvasPoint::new(10.0, 20.0))
            .expect("inside");
        assert_eq!((x, y), (10.0, 20.0));
    }

    #[test]
    fn padding_clicks_map_to_none() {
        let mut mapper = CoordinateMapper::new(DeviceSize::new(390.0, 844.0));
        mapper.update(Size::new(1170, 2532), Size::new(900, 900));
        let layout = *mapper.layout().expect("layout");

        assert!(mapper
            .view_to_device(CanvasPoint::new(f64::from(layout.offset_x) - 1.0, 450.0))
            .is_none());
        let right_edge = f64::from(layout.offset_x + layout.drawn_width) + 2.0;
        assert!(mapper
            .view_to_device(CanvasPoint::new(right_edge, 450.0))
            .is_none());
        assert!(mapper
            .view_to_device(CanvasPoint::new(450.0, 450.0))
            .is_some());
    }

    #[test]
    fn unknown_dimensions_map_to_none() {
        let mapper = CoordinateMapper::new(DeviceSize::new(390.0, 844.0));
        assert!(mapper.view_to_device(CanvasPoint::new(1.0, 1.0)).is_none());

        let mut mapper = CoordinateMapper::new(DeviceSize::new(390.0, 844.0));
        assert!(mapper.update(Size::new(0, 0), Size::new(900, 900)).is_none());
        assert!(mapper.view_to_device(CanvasPoint::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn update_recomputes_only_on_change() {
        let mut mapper = CoordinateMapper::new(DeviceSize::new(390.0, 844.0));
        let first = *mapper
            .update(Size::new(1170, 2532), Size::new(600, 1200))
            .expect("layout");
        let same = *mapper
            .update(Size::new(1170, 2532), Size::new(600, 1200))
            .expect("layout");
        assert_eq!(first, same);

        let resized = *mapper
            .update(Size::new(1170, 2532), Size::new(300, 1200))
            .expect("layout");
        assert_ne!(first, resized);
        assert_eq!(resized.canvas, Size::new(300, 1200));
    }

    #[test]
    fn canvas_device_round_trip_reproduces_source_point() {
        let mut mapper = CoordinateMapper::new(DeviceSize::new(390.0, 844.0));
        mapper.update(Size::new(1170, 2532), Size::new(700, 1100));
        let layout = *mapper.layout().expect("layout");

        for step_x in 1..10 {
            for step_y in 1..10 {
                let x = f64::from(layout.offset_x)
                    + f64::from(layout.drawn_width) * f64::from(step_x) / 10.0;
                let y = f64::from(layout.offset_y)
                    + f64::from(layout.drawn_height) * f64::from(step_y) / 10.0;
                let canvas = CanvasPoint::new(x, y);

                let source = layout.view_to_source(canvas).expect("inside drawn region");
                let device = mapper.view_to_device(canvas).expect("inside drawn region");
                let back = mapper.device_to_source(device).expect("known sizes");
                assert!((back.0 - source.0).abs() < 1e-6);
                assert!((back.1 - source.1).abs() < 1e-6);

                let view = layout.source_to_view(back.0, back.1);
                assert!((view.x - x).abs() < 1e-6);
                assert!((view.y - y).abs() < 1e-6);
            }
        }
    }
}

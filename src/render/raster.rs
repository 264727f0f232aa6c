//! Software Rasterizer
//!
//! Replays a [`DrawBuffer`] into an RGBA8 [`Bitmap`]. Coverage is binary
//! (pixel centre inside or outside the shape) with source-over blending,
//! which is enough for the flat wiring-diagram artwork.

use kurbo::{Point, Rect, Vec2};

use super::bitmap::{Bitmap, BYTES_PER_PIXEL};
use super::draw::{DrawBuffer, DrawCommand, Rgba};
use crate::error::{Error, Result};

/// Largest bitmap edge the rasterizer accepts
pub const MAX_RASTER_DIMENSION: u32 = 4096;

/// Rasterize `buffer` into a `width` x `height` bitmap.
///
/// Logical coordinates are scaled from the buffer bounds to the target size.
pub fn rasterize(buffer: &DrawBuffer, key: &str, (width, height): (u32, u32)) -> Result<Bitmap> {
    if width == 0 || height == 0 {
        return Err(Error::Rasterize {
            key: key.to_string(),
            reason: format!("degenerate target {}x{}", width, height),
        });
    }
    if width > MAX_RASTER_DIMENSION || height > MAX_RASTER_DIMENSION {
        return Err(Error::Rasterize {
            key: key.to_string(),
            reason: format!(
                "target {}x{} exceeds {}px",
                width, height, MAX_RASTER_DIMENSION
            ),
        });
    }

    let bounds = buffer.bounds();
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return Err(Error::Rasterize {
            key: key.to_string(),
            reason: "empty logical bounds".to_string(),
        });
    }

    let mut canvas = Canvas {
        bitmap: Bitmap::filled(width, height, Rgba::TRANSPARENT.0),
        scale: Vec2::new(width as f64 / bounds.width, height as f64 / bounds.height),
    };

    for command in buffer.commands() {
        canvas.apply(command);
    }

    Ok(canvas.bitmap)
}

struct Canvas {
    bitmap: Bitmap,
    scale: Vec2,
}

impl Canvas {
    fn apply(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::Clear(color) => {
                for px in self.bitmap.pixels_mut().chunks_exact_mut(BYTES_PER_PIXEL) {
                    px.copy_from_slice(&color.0);
                }
            }
            DrawCommand::FillRect { rect, color } => {
                let r = self.to_device_rect(*rect);
                self.fill_where(r, *color, |p| r.contains(p));
            }
            DrawCommand::StrokeLine {
                from,
                to,
                width,
                color,
            } => self.stroke_segment(*from, *to, *width, *color),
            DrawCommand::FillCircle {
                center,
                radius,
                color,
            } => {
                let c = self.to_device(*center);
                let rx = radius * self.scale.x;
                let ry = radius * self.scale.y;
                let bbox = Rect::new(c.x - rx, c.y - ry, c.x + rx, c.y + ry);
                self.fill_where(bbox, *color, |p| {
                    let d = Vec2::new((p.x - c.x) / rx, (p.y - c.y) / ry);
                    d.hypot2() <= 1.0
                });
            }
            DrawCommand::StrokePath {
                points,
                width,
                color,
            } => {
                for pair in points.windows(2) {
                    self.stroke_segment(pair[0], pair[1], *width, *color);
                }
            }
        }
    }

    fn to_device(&self, p: Point) -> Point {
        Point::new(p.x * self.scale.x, p.y * self.scale.y)
    }

    fn to_device_rect(&self, r: Rect) -> Rect {
        Rect::from_points(self.to_device(r.origin()), self.to_device(Point::new(r.x1, r.y1)))
    }

    fn stroke_segment(&mut self, from: Point, to: Point, width: f64, color: Rgba) {
        let a = self.to_device(from);
        let b = self.to_device(to);
        let half = (width * self.scale.x.min(self.scale.y) / 2.0).max(0.5);
        let bbox = Rect::from_points(a, b).inflate(half, half);
        self.fill_where(bbox, color, |p| distance_to_segment(p, a, b) <= half);
    }

    /// Blend `color` into every pixel whose centre lies in `bbox` and
    /// satisfies `inside`.
    fn fill_where(&mut self, bbox: Rect, color: Rgba, inside: impl Fn(Point) -> bool) {
        let width = self.bitmap.width();
        let height = self.bitmap.height();
        let x0 = bbox.x0.floor().max(0.0) as u32;
        let y0 = bbox.y0.floor().max(0.0) as u32;
        let x1 = (bbox.x1.ceil().max(0.0) as u32).min(width);
        let y1 = (bbox.y1.ceil().max(0.0) as u32).min(height);

        let pixels = self.bitmap.pixels_mut();
        for y in y0..y1 {
            for x in x0..x1 {
                let centre = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if !inside(centre) {
                    continue;
                }
                let i = (y as usize * width as usize + x as usize) * BYTES_PER_PIXEL;
                blend(&mut pixels[i..i + BYTES_PER_PIXEL], color);
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Source-over blend of straight-alpha colours
fn blend(dst: &mut [u8], src: Rgba) {
    let [sr, sg, sb, sa] = src.0;
    if sa == 255 {
        dst.copy_from_slice(&src.0);
        return;
    }
    if sa == 0 {
        return;
    }

    let sa_f = sa as f32 / 255.0;
    let da_f = dst[3] as f32 / 255.0;
    let out_a = sa_f + da_f * (1.0 - sa_f);
    if out_a <= 0.0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }

    for (channel, s) in [sr, sg, sb].into_iter().enumerate() {
        let d = dst[channel] as f32 / 255.0;
        let s = s as f32 / 255.0;
        let out = (s * sa_f + d * da_f * (1.0 - sa_f)) / out_a;
        dst[channel] = (out * 255.0).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Size;

    fn square(size: f64) -> Size {
        Size::new(size, size)
    }

    #[test]
    fn test_clear_and_fill_rect() {
        let buffer = DrawBuffer::builder(square(10.0))
            .clear(Rgba::WHITE)
            .fill_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Rgba::BLACK)
            .finish();

        let bitmap = rasterize(&buffer, "rect", (10, 10)).unwrap();
        assert_eq!(bitmap.pixel(2, 2), Some(Rgba::BLACK.0));
        assert_eq!(bitmap.pixel(7, 7), Some(Rgba::WHITE.0));
    }

    #[test]
    fn test_scaling_to_target() {
        let buffer = DrawBuffer::builder(square(10.0))
            .fill_rect(Rect::new(5.0, 5.0, 10.0, 10.0), Rgba::BLACK)
            .finish();

        let bitmap = rasterize(&buffer, "scaled", (20, 20)).unwrap();
        assert_eq!(bitmap.dimensions(), (20, 20));
        assert_eq!(bitmap.pixel(15, 15), Some(Rgba::BLACK.0));
        assert_eq!(bitmap.pixel(5, 5), Some(Rgba::TRANSPARENT.0));
    }

    #[test]
    fn test_circle_and_line() {
        let red = Rgba::rgb(255, 0, 0);
        let buffer = DrawBuffer::builder(square(20.0))
            .fill_circle(Point::new(10.0, 10.0), 4.0, red)
            .stroke_line(Point::new(0.0, 1.0), Point::new(20.0, 1.0), 2.0, Rgba::BLACK)
            .finish();

        let bitmap = rasterize(&buffer, "shapes", (20, 20)).unwrap();
        assert_eq!(bitmap.pixel(10, 10), Some(red.0));
        assert_eq!(bitmap.pixel(10, 1), Some(Rgba::BLACK.0));
        assert_eq!(bitmap.pixel(10, 18), Some(Rgba::TRANSPARENT.0));
    }

    #[test]
    fn test_half_alpha_blend() {
        let mut px = [0u8, 0, 255, 255];
        blend(&mut px, Rgba([255, 0, 0, 128]));
        assert_eq!(px[3], 255);
        assert!(px[0] > 120 && px[0] < 136);
        assert!(px[2] > 120 && px[2] < 136);
    }

    #[test]
    fn test_degenerate_target_rejected() {
        let buffer = DrawBuffer::builder(square(10.0)).finish();
        assert!(rasterize(&buffer, "zero", (0, 10)).is_err());
        assert!(rasterize(&buffer, "huge", (MAX_RASTER_DIMENSION + 1, 10)).is_err());
    }

    #[test]
    fn test_empty_bounds_rejected() {
        let buffer = DrawBuffer::builder(Size::ZERO).finish();
        assert!(rasterize(&buffer, "empty", (4, 4)).is_err());
    }
}

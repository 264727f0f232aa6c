//! Retained Draw-Command Buffers
//!
//! A [`DrawBuffer`] is a replayable list of vector drawing operations in
//! logical coordinates. Recording once and replaying (or rasterizing) it is
//! cheaper than re-issuing the drawing calls every frame.

use kurbo::{Point, Rect, Size};

/// Straight RGBA8 colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);

    /// Opaque colour from components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 255])
    }
}

/// One retained drawing operation
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Fill the whole target
    Clear(Rgba),
    /// Fill an axis-aligned rectangle
    FillRect { rect: Rect, color: Rgba },
    /// Stroke a straight segment
    StrokeLine {
        from: Point,
        to: Point,
        width: f64,
        color: Rgba,
    },
    /// Fill a circle
    FillCircle {
        center: Point,
        radius: f64,
        color: Rgba,
    },
    /// Stroke a polyline
    StrokePath {
        points: Vec<Point>,
        width: f64,
        color: Rgba,
    },
}

impl DrawCommand {
    /// Rough heap footprint, used for accounting only
    fn estimated_bytes(&self) -> usize {
        let base = std::mem::size_of::<DrawCommand>();
        match self {
            DrawCommand::StrokePath { points, .. } => {
                base + points.len() * std::mem::size_of::<Point>()
            }
            _ => base,
        }
    }
}

/// Recorded list of draw commands with its logical bounds
#[derive(Debug, Clone, PartialEq)]
pub struct DrawBuffer {
    commands: Vec<DrawCommand>,
    bounds: Size,
}

impl DrawBuffer {
    /// Start recording a buffer covering `bounds`
    pub fn builder(bounds: Size) -> DrawBufferBuilder {
        DrawBufferBuilder {
            commands: Vec::new(),
            bounds,
        }
    }

    /// Recorded commands in replay order
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Logical size the commands were recorded against
    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Rough memory footprint of the recorded commands
    pub fn estimated_bytes(&self) -> usize {
        self.commands.iter().map(DrawCommand::estimated_bytes).sum()
    }
}

/// Recorder for a [`DrawBuffer`]
#[derive(Debug)]
pub struct DrawBufferBuilder {
    commands: Vec<DrawCommand>,
    bounds: Size,
}

impl DrawBufferBuilder {
    pub fn clear(mut self, color: Rgba) -> Self {
        self.commands.push(DrawCommand::Clear(color));
        self
    }

    pub fn fill_rect(mut self, rect: Rect, color: Rgba) -> Self {
        self.commands.push(DrawCommand::FillRect { rect, color });
        self
    }

    pub fn stroke_line(mut self, from: Point, to: Point, width: f64, color: Rgba) -> Self {
        self.commands.push(DrawCommand::StrokeLine {
            from,
            to,
            width,
            color,
        });
        self
    }

    pub fn fill_circle(mut self, center: Point, radius: f64, color: Rgba) -> Self {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            color,
        });
        self
    }

    pub fn stroke_path(mut self, points: Vec<Point>, width: f64, color: Rgba) -> Self {
        self.commands.push(DrawCommand::StrokePath {
            points,
            width,
            color,
        });
        self
    }

    /// Append an arbitrary command
    pub fn push(mut self, command: DrawCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Finish recording
    pub fn finish(self) -> DrawBuffer {
        DrawBuffer {
            commands: self.commands,
            bounds: self.bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_in_order() {
        let buffer = DrawBuffer::builder(Size::new(100.0, 50.0))
            .clear(Rgba::WHITE)
            .fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Rgba::BLACK)
            .stroke_path(
                vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
                2.0,
                Rgba::rgb(200, 0, 0),
            )
            .finish();

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.commands()[0], DrawCommand::Clear(Rgba::WHITE));
        assert_eq!(buffer.bounds(), Size::new(100.0, 50.0));
        assert!(buffer.estimated_bytes() > 0);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = DrawBuffer::builder(Size::new(1.0, 1.0)).finish();
        assert!(buffer.is_empty());
        assert_eq!(buffer.estimated_bytes(), 0);
    }
}

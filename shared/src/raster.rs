//! Deterministic software raster surface.
//!
//! Both sides of the protocol rasterize canonical ops through this surface, so
//! "two clients that applied the same op sequence" can be checked for
//! pixel-identical buffers. Rendering depends only on `{tool, from, to,
//! color}`; there is no timing or anti-aliasing involved.

use crate::{parse_color, LogEntry, Point, Tool};

pub const BACKGROUND: u32 = 0xFFFFFF;

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Raster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; width * height],
        }
    }

    /// A surface matching the shared canvas dimensions.
    pub fn canvas() -> Self {
        Self::new(crate::CANVAS_WIDTH as usize, crate::CANVAS_HEIGHT as usize)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }

    fn plot(&mut self, x: i64, y: i64, color: u32) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.pixels[y as usize * self.width + x as usize] = color;
        }
    }

    /// Radius-1 round dot, the unit of the pen's round caps and joins.
    fn stamp(&mut self, x: i64, y: i64, color: u32) {
        self.plot(x, y, color);
        self.plot(x + 1, y, color);
        self.plot(x - 1, y, color);
        self.plot(x, y + 1, color);
        self.plot(x, y - 1, color);
    }

    pub fn draw_line(&mut self, from: Point, to: Point, color: u32) {
        let mut x0 = from.x.round() as i64;
        let mut y0 = from.y.round() as i64;
        let x1 = to.x.round() as i64;
        let y1 = to.y.round() as i64;

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.stamp(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Unfilled outline. Negative extents are normalized, not rejected.
    pub fn draw_rect(&mut self, from: Point, to: Point, color: u32) {
        let x0 = from.x.round() as i64;
        let y0 = from.y.round() as i64;
        let x1 = to.x.round() as i64;
        let y1 = to.y.round() as i64;
        let (left, right) = (x0.min(x1), x0.max(x1));
        let (top, bottom) = (y0.min(y1), y0.max(y1));

        for x in left..=right {
            self.stamp(x, top, color);
            self.stamp(x, bottom, color);
        }
        for y in top..=bottom {
            self.stamp(left, y, color);
            self.stamp(right, y, color);
        }
    }

    /// Renders one stroke. Points are clamped to the surface-independent
    /// canvas bounds; an unparseable color renders nothing.
    pub fn draw(&mut self, tool: Tool, from: Point, to: Point, color: &str) {
        let Some(color) = parse_color(color) else {
            return;
        };
        let from = from.clamped();
        let to = to.clamped();
        match tool {
            Tool::Pen => self.draw_line(from, to, color),
            Tool::Rectangle => self.draw_rect(from, to, color),
        }
    }

    /// Applies one canonical log entry.
    pub fn apply(&mut self, entry: &LogEntry) {
        match entry {
            LogEntry::Draw(op) => self.draw(op.tool, op.from, op.to, &op.color),
            LogEntry::Clear { .. } => self.clear(),
        }
    }
}

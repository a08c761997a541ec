use serde::{Deserialize, Serialize};

pub mod protocol;
pub mod raster;

pub use protocol::{decode, encode, DecodeError, Message};
pub use raster::Raster;

pub const CANVAS_WIDTH: f32 = 800.0;
pub const CANVAS_HEIGHT: f32 = 600.0;
pub const MAX_CHAT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Out-of-range coordinates are clamped to the canvas, never rejected.
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, CANVAS_WIDTH),
            y: self.y.clamp(0.0, CANVAS_HEIGHT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Rectangle,
}

/// One atomic stroke segment or shape, immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOp {
    pub seq: u64,
    pub user_id: String,
    pub tool: Tool,
    pub color: String,
    pub from: Point,
    pub to: Point,
}

/// A canonical log entry. Serialized with the same `"type"` tag as live wire
/// messages so `sync_response` batches are self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    Draw(DrawOp),
    Clear { seq: u64 },
}

impl LogEntry {
    pub fn seq(&self) -> u64 {
        match self {
            LogEntry::Draw(op) => op.seq,
            LogEntry::Clear { seq } => *seq,
        }
    }
}

/// Parses a `#RRGGBB` color string into a packed 0xRRGGBB pixel value.
pub fn parse_color(color: &str) -> Option<u32> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

pub fn is_valid_color(color: &str) -> bool {
    parse_color(color).is_some()
}

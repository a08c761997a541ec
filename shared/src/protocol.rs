//! Wire protocol codec: one JSON object per frame, discriminated by `"type"`.

use crate::{LogEntry, Point, Tool};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an inbound frame could not be decoded.
///
/// A decode failure is never fatal to the connection: the frame is dropped
/// and logged by the caller.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Invalid UTF-8 or invalid JSON.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The `"type"` tag is missing or not one we speak.
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    /// Known tag, but a required field is missing or has the wrong shape.
    #[error("invalid field in '{kind}' message: {detail}")]
    InvalidField { kind: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First frame from a client. The id is a hint, not authoritative.
    Join {
        #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Server confirmation carrying the authoritative id and current log head.
    Welcome {
        #[serde(rename = "userId")]
        user_id: String,
        seq: u64,
    },
    /// `seq` is absent when sent by a client and router-assigned on broadcast.
    Draw {
        #[serde(rename = "userId")]
        user_id: String,
        tool: Tool,
        color: String,
        from: Point,
        to: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    Clear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    Cursor {
        #[serde(rename = "userId")]
        user_id: String,
        x: f32,
        y: f32,
    },
    /// Cursor-removal notice broadcast when a peer disconnects.
    CursorGone {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Chat {
        #[serde(rename = "userId")]
        user_id: String,
        message: String,
        timestamp: String,
    },
    SyncRequest {
        #[serde(rename = "sinceSeq")]
        since_seq: u64,
    },
    SyncResponse { ops: Vec<LogEntry> },
    /// Validation-rejection notice sent back to the offending sender only.
    Error { message: String },
}

impl Message {
    /// The wire tag, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::Welcome { .. } => "welcome",
            Message::Draw { .. } => "draw",
            Message::Clear { .. } => "clear",
            Message::Cursor { .. } => "cursor",
            Message::CursorGone { .. } => "cursor_gone",
            Message::Chat { .. } => "chat",
            Message::SyncRequest { .. } => "sync_request",
            Message::SyncResponse { .. } => "sync_response",
            Message::Error { .. } => "error",
        }
    }
}

const KNOWN_TYPES: &[&str] = &[
    "join",
    "welcome",
    "draw",
    "clear",
    "cursor",
    "cursor_gone",
    "chat",
    "sync_request",
    "sync_response",
    "error",
];

pub fn encode(message: &Message) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decodes one frame. Binary frames are treated as UTF-8 text before parsing.
pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    let text =
        std::str::from_utf8(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DecodeError::UnknownType("<missing>".to_string()))?
        .to_string();
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidField {
        kind,
        detail: e.to_string(),
    })
}

//! Client-side state reconciliation.
//!
//! The reconciler is a pure reducer: `(state, event) -> outbound messages`,
//! with no transport or clock of its own, so every synchronization scenario
//! can be unit tested deterministically. Local strokes are applied to the
//! raster immediately (optimistic rendering hides the round trip) and
//! confirmed later by the relay's echo; canonical ops apply strictly in seq
//! order against the `applied_seq` watermark, and any gap triggers a resync.

use log::{debug, warn};
use shared::{DrawOp, LogEntry, Message, Point, Raster, Tool};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const MAX_CHAT_HISTORY: usize = 256;

/// Everything the UI layer or transport can feed into the core.
#[derive(Debug, Clone)]
pub enum CanvasEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    SetTool(Tool),
    SetColor(String),
    ClearRequested,
    /// The timestamp comes from the caller's clock (ISO 8601).
    ChatSent { text: String, timestamp: String },
    ServerMessage(Message),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub user_id: String,
    pub message: String,
    pub timestamp: String,
}

pub struct Reconciler {
    user_id: String,
    /// Highest canonical seq applied to the raster.
    applied_seq: u64,
    raster: Raster,
    /// Ops received ahead of the watermark, awaiting backfill.
    buffered: BTreeMap<u64, LogEntry>,
    /// True between issuing a sync_request and receiving its response.
    sync_pending: bool,
    /// Last recorded point while the pointer is down.
    last_point: Option<Point>,
    tool: Tool,
    color: String,
    /// Latest known cursor position per peer; last write wins.
    cursors: HashMap<String, Point>,
    chat: VecDeque<ChatEntry>,
}

impl Reconciler {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            applied_seq: 0,
            raster: Raster::canvas(),
            buffered: BTreeMap::new(),
            sync_pending: false,
            last_point: None,
            tool: Tool::Pen,
            color: "#000000".to_string(),
            cursors: HashMap::new(),
            chat: VecDeque::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_pending
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn cursors(&self) -> &HashMap<String, Point> {
        &self.cursors
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatEntry> {
        self.chat.iter()
    }

    /// Processes one event and returns the messages to put on the wire.
    pub fn handle(&mut self, event: CanvasEvent) -> Vec<Message> {
        match event {
            CanvasEvent::PointerDown(point) => {
                self.last_point = Some(point.clamped());
                Vec::new()
            }
            CanvasEvent::PointerMove(point) => self.pointer_move(point.clamped()),
            CanvasEvent::PointerUp => {
                self.last_point = None;
                Vec::new()
            }
            CanvasEvent::SetTool(tool) => {
                self.tool = tool;
                Vec::new()
            }
            CanvasEvent::SetColor(color) => {
                self.color = color;
                Vec::new()
            }
            CanvasEvent::ClearRequested => {
                // Optimistic, like a stroke: wipe now, confirm via echo
                self.raster.clear();
                vec![Message::Clear { seq: None }]
            }
            CanvasEvent::ChatSent { text, timestamp } => vec![Message::Chat {
                user_id: self.user_id.clone(),
                message: text,
                timestamp,
            }],
            CanvasEvent::ServerMessage(message) => self.server_message(message),
        }
    }

    fn pointer_move(&mut self, point: Point) -> Vec<Message> {
        let mut outbound = vec![Message::Cursor {
            user_id: self.user_id.clone(),
            x: point.x,
            y: point.y,
        }];
        if let Some(from) = self.last_point {
            // Optimistic apply: render before the relay confirms
            self.raster.draw(self.tool, from, point, &self.color);
            outbound.push(Message::Draw {
                user_id: self.user_id.clone(),
                tool: self.tool,
                color: self.color.clone(),
                from,
                to: point,
                seq: None,
            });
            self.last_point = Some(point);
        }
        outbound
    }

    fn server_message(&mut self, message: Message) -> Vec<Message> {
        match message {
            Message::Welcome { user_id, seq } => {
                debug!("Joined as '{}' (relay log head {})", user_id, seq);
                self.user_id = user_id;
                self.applied_seq = 0;
                self.sync_pending = true;
                // Late-join catch-up: replay everything still relevant
                vec![Message::SyncRequest { since_seq: 0 }]
            }
            Message::Draw {
                user_id,
                tool,
                color,
                from,
                to,
                seq: Some(seq),
            } => self.canonical(LogEntry::Draw(DrawOp {
                seq,
                user_id,
                tool,
                color,
                from,
                to,
            })),
            Message::Clear { seq: Some(seq) } => self.canonical(LogEntry::Clear { seq }),
            Message::Draw { seq: None, .. } | Message::Clear { seq: None } => {
                warn!("Ignoring broadcast op without a sequence number");
                Vec::new()
            }
            Message::Cursor { user_id, x, y } => {
                if user_id != self.user_id {
                    self.cursors.insert(user_id, Point::new(x, y));
                }
                Vec::new()
            }
            Message::CursorGone { user_id } => {
                self.cursors.remove(&user_id);
                Vec::new()
            }
            Message::Chat {
                user_id,
                message,
                timestamp,
            } => {
                self.chat.push_back(ChatEntry {
                    user_id,
                    message,
                    timestamp,
                });
                if self.chat.len() > MAX_CHAT_HISTORY {
                    self.chat.pop_front();
                }
                Vec::new()
            }
            Message::SyncResponse { ops } => self.apply_sync(ops),
            Message::Error { message } => {
                warn!("Relay rejected an operation: {}", message);
                Vec::new()
            }
            other => {
                warn!("Unexpected '{}' message from relay", other.kind());
                Vec::new()
            }
        }
    }

    /// One canonical op off the live broadcast stream.
    fn canonical(&mut self, entry: LogEntry) -> Vec<Message> {
        let seq = entry.seq();
        if seq <= self.applied_seq {
            // Duplicate of something already applied
            return Vec::new();
        }
        if self.sync_pending {
            self.buffered.insert(seq, entry);
            return Vec::new();
        }
        if seq == self.applied_seq + 1 {
            self.apply_entry(&entry);
            self.drain_contiguous();
            Vec::new()
        } else {
            // Gap: hold the op, ask the relay to backfill from our watermark
            debug!(
                "Sequence gap: got {} with watermark {}, requesting resync",
                seq, self.applied_seq
            );
            self.buffered.insert(seq, entry);
            self.sync_pending = true;
            vec![Message::SyncRequest {
                since_seq: self.applied_seq,
            }]
        }
    }

    fn apply_entry(&mut self, entry: &LogEntry) {
        // Self-echoed ops are re-applied; the redraw is idempotent and keeps
        // the raster converged even when a peer's clear landed in between.
        self.raster.apply(entry);
        self.applied_seq = entry.seq();
    }

    fn drain_contiguous(&mut self) {
        while let Some(entry) = self.buffered.remove(&(self.applied_seq + 1)) {
            self.apply_entry(&entry);
        }
        self.buffered.retain(|seq, _| *seq > self.applied_seq);
    }

    /// The backfill batch: applied in order, then any buffered ops above it,
    /// strictly increasing, duplicates discarded.
    fn apply_sync(&mut self, mut ops: Vec<LogEntry>) -> Vec<Message> {
        ops.sort_by_key(LogEntry::seq);
        for entry in &ops {
            if entry.seq() > self.applied_seq {
                self.apply_entry(entry);
            }
        }
        self.sync_pending = false;
        let buffered = std::mem::take(&mut self.buffered);
        for (seq, entry) in buffered {
            if seq > self.applied_seq {
                self.apply_entry(&entry);
            }
        }
        debug!("Resynced to seq {}", self.applied_seq);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::raster::BACKGROUND;

    fn draw_msg(user: &str, seq: u64, from: (f32, f32), to: (f32, f32), color: &str) -> Message {
        Message::Draw {
            user_id: user.to_string(),
            tool: Tool::Pen,
            color: color.to_string(),
            from: Point::new(from.0, from.1),
            to: Point::new(to.0, to.1),
            seq: Some(seq),
        }
    }

    fn joined(user: &str) -> Reconciler {
        let mut r = Reconciler::new(user);
        let out = r.handle(CanvasEvent::ServerMessage(Message::Welcome {
            user_id: user.to_string(),
            seq: 0,
        }));
        assert_eq!(out, vec![Message::SyncRequest { since_seq: 0 }]);
        let out = r.handle(CanvasEvent::ServerMessage(Message::SyncResponse {
            ops: Vec::new(),
        }));
        assert!(out.is_empty());
        r
    }

    #[test]
    fn test_optimistic_render_before_echo() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::SetColor("#FF0000".to_string()));
        r.handle(CanvasEvent::PointerDown(Point::new(10.0, 10.0)));
        let out = r.handle(CanvasEvent::PointerMove(Point::new(50.0, 50.0)));

        // Rendered locally before any server confirmation
        assert_eq!(r.raster().pixel(30, 30), Some(0xFF0000));
        assert_eq!(r.applied_seq(), 0);

        // Cursor update plus the unsequenced draw go on the wire
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Message::Cursor { user_id, .. } if user_id == "alice"));
        assert!(matches!(&out[1], Message::Draw { seq: None, .. }));
    }

    #[test]
    fn test_pointer_move_without_down_sends_cursor_only() {
        let mut r = joined("alice");
        let out = r.handle(CanvasEvent::PointerMove(Point::new(50.0, 50.0)));
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Message::Cursor { .. }));
        assert_eq!(*r.raster(), Raster::canvas());
    }

    #[test]
    fn test_echo_advances_watermark_without_divergence() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::SetColor("#FF0000".to_string()));
        r.handle(CanvasEvent::PointerDown(Point::new(10.0, 10.0)));
        r.handle(CanvasEvent::PointerMove(Point::new(50.0, 50.0)));
        let before = r.raster().clone();

        let out = r.handle(CanvasEvent::ServerMessage(draw_msg(
            "alice",
            1,
            (10.0, 10.0),
            (50.0, 50.0),
            "#FF0000",
        )));
        assert!(out.is_empty());
        assert_eq!(r.applied_seq(), 1);
        // Idempotent re-apply: pixels unchanged
        assert_eq!(*r.raster(), before);
    }

    #[test]
    fn test_gap_triggers_sync_request_and_buffers() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            1,
            (0.0, 0.0),
            (10.0, 0.0),
            "#000000",
        )));
        assert_eq!(r.applied_seq(), 1);

        // Seq 3 before seq 2
        let out = r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            3,
            (20.0, 0.0),
            (30.0, 0.0),
            "#000000",
        )));
        assert_eq!(out, vec![Message::SyncRequest { since_seq: 1 }]);
        assert!(r.is_syncing());
        // Not applied yet
        assert_eq!(r.applied_seq(), 1);

        // Backfill arrives; buffered seq 3 applies after it
        let out = r.handle(CanvasEvent::ServerMessage(Message::SyncResponse {
            ops: vec![LogEntry::Draw(DrawOp {
                seq: 2,
                user_id: "bob".to_string(),
                tool: Tool::Pen,
                color: "#000000".to_string(),
                from: Point::new(10.0, 0.0),
                to: Point::new(20.0, 0.0),
            })],
        }));
        assert!(out.is_empty());
        assert!(!r.is_syncing());
        assert_eq!(r.applied_seq(), 3);
    }

    #[test]
    fn test_out_of_order_converges_with_in_order() {
        let ops: Vec<Message> = vec![
            draw_msg("bob", 1, (10.0, 10.0), (50.0, 50.0), "#FF0000"),
            draw_msg("bob", 2, (50.0, 50.0), (90.0, 10.0), "#00FF00"),
            draw_msg("bob", 3, (90.0, 10.0), (130.0, 50.0), "#0000FF"),
        ];

        let mut in_order = joined("alice");
        for op in &ops {
            in_order.handle(CanvasEvent::ServerMessage(op.clone()));
        }

        let mut scrambled = joined("carol");
        scrambled.handle(CanvasEvent::ServerMessage(ops[0].clone()));
        // 3 arrives before 2
        let out = scrambled.handle(CanvasEvent::ServerMessage(ops[2].clone()));
        assert_eq!(out, vec![Message::SyncRequest { since_seq: 1 }]);
        scrambled.handle(CanvasEvent::ServerMessage(ops[1].clone()));
        // Relay answers with everything past the watermark
        scrambled.handle(CanvasEvent::ServerMessage(Message::SyncResponse {
            ops: vec![
                LogEntry::Draw(DrawOp {
                    seq: 2,
                    user_id: "bob".to_string(),
                    tool: Tool::Pen,
                    color: "#00FF00".to_string(),
                    from: Point::new(50.0, 50.0),
                    to: Point::new(90.0, 10.0),
                }),
                LogEntry::Draw(DrawOp {
                    seq: 3,
                    user_id: "bob".to_string(),
                    tool: Tool::Pen,
                    color: "#0000FF".to_string(),
                    from: Point::new(90.0, 10.0),
                    to: Point::new(130.0, 50.0),
                }),
            ],
        }));

        assert_eq!(scrambled.applied_seq(), in_order.applied_seq());
        assert_eq!(scrambled.raster(), in_order.raster());
    }

    #[test]
    fn test_duplicates_discarded() {
        let mut r = joined("alice");
        let op = draw_msg("bob", 1, (0.0, 0.0), (10.0, 10.0), "#000000");
        r.handle(CanvasEvent::ServerMessage(op.clone()));
        let before = r.raster().clone();
        let out = r.handle(CanvasEvent::ServerMessage(op));
        assert!(out.is_empty());
        assert_eq!(r.applied_seq(), 1);
        assert_eq!(*r.raster(), before);
    }

    #[test]
    fn test_late_join_renders_identical_red_line() {
        // Client A drew (10,10)-(50,50) in red, relay assigned seq 1
        let mut a = joined("a");
        a.handle(CanvasEvent::SetColor("#FF0000".to_string()));
        a.handle(CanvasEvent::PointerDown(Point::new(10.0, 10.0)));
        a.handle(CanvasEvent::PointerMove(Point::new(50.0, 50.0)));
        a.handle(CanvasEvent::ServerMessage(draw_msg(
            "a",
            1,
            (10.0, 10.0),
            (50.0, 50.0),
            "#FF0000",
        )));

        // Client B joins afterward and catches up from seq 0
        let mut b = Reconciler::new("b");
        let out = b.handle(CanvasEvent::ServerMessage(Message::Welcome {
            user_id: "b".to_string(),
            seq: 1,
        }));
        assert_eq!(out, vec![Message::SyncRequest { since_seq: 0 }]);
        b.handle(CanvasEvent::ServerMessage(Message::SyncResponse {
            ops: vec![LogEntry::Draw(DrawOp {
                seq: 1,
                user_id: "a".to_string(),
                tool: Tool::Pen,
                color: "#FF0000".to_string(),
                from: Point::new(10.0, 10.0),
                to: Point::new(50.0, 50.0),
            })],
        }));

        assert_eq!(b.raster().pixel(30, 30), Some(0xFF0000));
        assert_eq!(a.raster(), b.raster());
    }

    #[test]
    fn test_clear_wipes_optimistically_and_canonically() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            1,
            (0.0, 0.0),
            (100.0, 100.0),
            "#000000",
        )));
        let out = r.handle(CanvasEvent::ClearRequested);
        assert_eq!(out, vec![Message::Clear { seq: None }]);
        assert_eq!(*r.raster(), Raster::canvas());

        r.handle(CanvasEvent::ServerMessage(Message::Clear { seq: Some(2) }));
        assert_eq!(r.applied_seq(), 2);
        assert_eq!(*r.raster(), Raster::canvas());
    }

    #[test]
    fn test_ops_buffered_while_syncing_do_not_retrigger() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            2,
            (0.0, 0.0),
            (10.0, 0.0),
            "#000000",
        )));
        assert!(r.is_syncing());
        // A further out-of-order op while syncing stays quiet
        let out = r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            4,
            (0.0, 0.0),
            (10.0, 0.0),
            "#000000",
        )));
        assert!(out.is_empty());
    }

    #[test]
    fn test_cursor_overlay_last_write_wins() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::ServerMessage(Message::Cursor {
            user_id: "bob".to_string(),
            x: 10.0,
            y: 10.0,
        }));
        r.handle(CanvasEvent::ServerMessage(Message::Cursor {
            user_id: "bob".to_string(),
            x: 30.0,
            y: 40.0,
        }));
        assert_eq!(r.cursors().get("bob"), Some(&Point::new(30.0, 40.0)));

        // Own cursor echoes are not tracked as a peer overlay
        r.handle(CanvasEvent::ServerMessage(Message::Cursor {
            user_id: "alice".to_string(),
            x: 1.0,
            y: 1.0,
        }));
        assert!(!r.cursors().contains_key("alice"));

        r.handle(CanvasEvent::ServerMessage(Message::CursorGone {
            user_id: "bob".to_string(),
        }));
        assert!(r.cursors().is_empty());
    }

    #[test]
    fn test_chat_history_bounded() {
        let mut r = joined("alice");
        for i in 0..(MAX_CHAT_HISTORY + 10) {
            r.handle(CanvasEvent::ServerMessage(Message::Chat {
                user_id: "bob".to_string(),
                message: format!("message {}", i),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            }));
        }
        assert_eq!(r.chat().count(), MAX_CHAT_HISTORY);
        assert_eq!(r.chat().next().unwrap().message, "message 10");
    }

    #[test]
    fn test_chat_sent_carries_caller_timestamp() {
        let mut r = joined("alice");
        let out = r.handle(CanvasEvent::ChatSent {
            text: "hi there".to_string(),
            timestamp: "2026-08-25T12:00:00Z".to_string(),
        });
        assert_eq!(
            out,
            vec![Message::Chat {
                user_id: "alice".to_string(),
                message: "hi there".to_string(),
                timestamp: "2026-08-25T12:00:00Z".to_string(),
            }]
        );
    }

    #[test]
    fn test_welcome_confirms_disambiguated_id() {
        let mut r = Reconciler::new("alice");
        r.handle(CanvasEvent::ServerMessage(Message::Welcome {
            user_id: "alice-2".to_string(),
            seq: 0,
        }));
        assert_eq!(r.user_id(), "alice-2");
    }

    #[test]
    fn test_background_untouched_elsewhere() {
        let mut r = joined("alice");
        r.handle(CanvasEvent::ServerMessage(draw_msg(
            "bob",
            1,
            (10.0, 10.0),
            (20.0, 10.0),
            "#000000",
        )));
        assert_eq!(r.raster().pixel(400, 300), Some(BACKGROUND));
    }
}

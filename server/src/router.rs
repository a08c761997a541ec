//! Broadcast router: the single-writer core of the relay.
//!
//! One task owns the drawing log and the session registry and processes
//! `RouterCommand`s from the per-connection tasks, so appends are serialized
//! without any shared-memory locking. Draw and clear operations are validated,
//! appended, and fanned out to every joined session including the origin (the
//! self-echo carries the assigned seq so the origin can advance its
//! watermark). Cursor and chat traffic bypasses the log; cursor updates are
//! coalesced onto a flush interval.

use crate::drawing_log::{DrawingLog, DEFAULT_MAX_ENTRIES};
use crate::registry::SessionRegistry;
use log::{debug, info, warn};
use shared::{is_valid_color, Message, Point, MAX_CHAT_LEN};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

/// Relay-side input validation. A rejected operation is not appended and the
/// sender is notified; other clients are unaffected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("color must be a '#RRGGBB' string")]
    BadColor,
    #[error("chat message must be between 1 and 1000 characters")]
    BadChatLength,
}

#[derive(Debug)]
pub enum RouterCommand {
    /// A connection finished its handshake and wants to join.
    Connect {
        hint: Option<String>,
        outbound: mpsc::Sender<Message>,
        reply: oneshot::Sender<String>,
    },
    /// A decoded frame from a joined session.
    Inbound { user_id: String, message: Message },
    /// The connection closed or errored; not fatal to the router.
    Disconnect { user_id: String },
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Outbound queue depth per session before it is disconnected.
    pub queue_capacity: usize,
    /// Cursor coalescing flush interval.
    pub cursor_flush: Duration,
    /// Log entries retained before superseded history is compacted.
    pub max_log_entries: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            cursor_flush: Duration::from_millis(50),
            max_log_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

pub struct BroadcastRouter {
    log: DrawingLog,
    registry: SessionRegistry,
    rx: mpsc::Receiver<RouterCommand>,
    cursor_flush: Duration,
}

impl BroadcastRouter {
    pub fn new(config: &RouterConfig) -> (Self, mpsc::Sender<RouterCommand>) {
        let (tx, rx) = mpsc::channel(1024);
        (
            Self {
                log: DrawingLog::new(config.max_log_entries),
                registry: SessionRegistry::new(),
                rx,
                cursor_flush: config.cursor_flush,
            },
            tx,
        )
    }

    /// Main router loop: commands from connections plus the cursor flush tick.
    pub async fn run(mut self) {
        let mut flush = interval(self.cursor_flush);
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("Router shutting down");
                            break;
                        }
                    }
                },
                _ = flush.tick() => self.flush_cursors(),
            }
        }
    }

    pub fn handle_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Connect {
                hint,
                outbound,
                reply,
            } => {
                let user_id = self.registry.join(hint, outbound);
                self.send_to(
                    &user_id,
                    Message::Welcome {
                        user_id: user_id.clone(),
                        seq: self.log.head(),
                    },
                );
                let _ = reply.send(user_id);
            }
            RouterCommand::Inbound { user_id, message } => {
                self.handle_inbound(&user_id, message)
            }
            RouterCommand::Disconnect { user_id } => self.drop_session(&user_id),
        }
    }

    fn handle_inbound(&mut self, sender: &str, message: Message) {
        if !self.registry.contains(sender) {
            // Session was dropped (e.g. queue overflow) with frames in flight
            return;
        }
        match message {
            Message::Draw {
                tool,
                color,
                from,
                to,
                ..
            } => {
                if !is_valid_color(&color) {
                    self.reject(sender, ValidationError::BadColor);
                    return;
                }
                let from = from.clamped();
                let to = to.clamped();
                let seq =
                    self.log
                        .append_draw(sender.to_string(), tool, color.clone(), from, to);
                self.broadcast(
                    Message::Draw {
                        user_id: sender.to_string(),
                        tool,
                        color,
                        from,
                        to,
                        seq: Some(seq),
                    },
                    None,
                );
            }
            Message::Clear { .. } => {
                let seq = self.log.append_clear();
                debug!("'{}' cleared the canvas at seq {}", sender, seq);
                self.broadcast(Message::Clear { seq: Some(seq) }, None);
            }
            Message::Cursor { x, y, .. } => {
                // Coalesced: flushed to peers on the next tick, latest wins
                self.registry
                    .update_cursor(sender, Point::new(x, y).clamped());
            }
            Message::Chat {
                message, timestamp, ..
            } => {
                if message.is_empty() || message.chars().count() > MAX_CHAT_LEN {
                    self.reject(sender, ValidationError::BadChatLength);
                    return;
                }
                self.broadcast(
                    Message::Chat {
                        user_id: sender.to_string(),
                        message,
                        timestamp,
                    },
                    None,
                );
            }
            Message::SyncRequest { since_seq } => {
                let ops = self.log.replay_since(since_seq);
                debug!(
                    "Replaying {} ops since {} for '{}'",
                    ops.len(),
                    since_seq,
                    sender
                );
                self.send_to(sender, Message::SyncResponse { ops });
            }
            other => {
                warn!("Unexpected '{}' message from '{}'", other.kind(), sender);
            }
        }
    }

    fn reject(&mut self, sender: &str, error: ValidationError) {
        warn!("Rejected operation from '{}': {}", sender, error);
        self.send_to(
            sender,
            Message::Error {
                message: error.to_string(),
            },
        );
    }

    fn send_to(&mut self, user_id: &str, message: Message) {
        let Some(session) = self.registry.get(user_id) else {
            return;
        };
        if session.outbound.try_send(message).is_err() {
            warn!("Outbound queue for '{}' is full or closed, disconnecting", user_id);
            self.drop_session(user_id);
        }
    }

    /// Fans a message out to every joined session except `exclude`. Sessions
    /// whose bounded queue cannot accept the message are disconnected rather
    /// than allowed to grow without limit.
    fn broadcast(&mut self, message: Message, exclude: Option<&str>) {
        let mut dead = Vec::new();
        for session in self.registry.sessions() {
            if Some(session.user_id.as_str()) == exclude {
                continue;
            }
            if session.outbound.try_send(message.clone()).is_err() {
                dead.push(session.user_id.clone());
            }
        }
        for user_id in dead {
            warn!(
                "Outbound queue for '{}' is full or closed, disconnecting",
                user_id
            );
            self.drop_session(&user_id);
        }
    }

    fn drop_session(&mut self, user_id: &str) {
        if self.registry.leave(user_id) {
            self.broadcast(
                Message::CursorGone {
                    user_id: user_id.to_string(),
                },
                None,
            );
        }
    }

    fn flush_cursors(&mut self) {
        for (user_id, position) in self.registry.take_pending_cursors() {
            self.broadcast(
                Message::Cursor {
                    user_id: user_id.clone(),
                    x: position.x,
                    y: position.y,
                },
                Some(&user_id),
            );
        }
    }
}

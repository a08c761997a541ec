//! # Whiteboard Relay Library
//!
//! The authoritative relay for the collaborative whiteboard. Canonical canvas
//! state lives here, in an append-only log of draw and clear operations; every
//! client renders by replaying that log, so clients can crash, lag, or join
//! late without losing anything.
//!
//! ## Architecture
//!
//! A single router task owns the drawing log and the session registry and is
//! the only writer to either, which makes sequence assignment the one
//! serialization point in the system. Per-connection tasks do nothing but
//! decode inbound frames into router commands and drain a bounded outbound
//! queue back onto the socket. A session whose queue overflows is
//! disconnected, which bounds memory under slow consumers.
//!
//! Connections move through `Connecting -> Joined -> Closed`: a client must
//! present a `join` frame before anything is relayed, gets back a `welcome`
//! with its confirmed (collision-free) user id, and on disconnect peers
//! receive a `cursor_gone` notice so stale cursor overlays are dropped.
//!
//! Cursor updates are coalesced per user on a flush interval rather than
//! relayed per mouse-move; chat fans out directly and is never logged.

pub mod drawing_log;
pub mod network;
pub mod registry;
pub mod router;

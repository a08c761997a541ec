//! # Whiteboard Client Library
//!
//! Client-side synchronization core for the collaborative whiteboard. The
//! design splits cleanly in two:
//!
//! - [`reconciler`] is a pure reducer over canvas events: pointer input,
//!   local intents, and decoded relay messages go in; outbound wire messages
//!   come out, and the deterministic raster surface plus cursor overlay and
//!   chat history are updated as a side effect. It owns the `applied_seq`
//!   watermark that keeps canonical ops in total order, buffers ahead-of-gap
//!   ops, and drives resync when the stream skips.
//! - [`network`] binds that reducer to a real WebSocket connection and is the
//!   only place transport errors exist.
//!
//! Local strokes render optimistically before the relay confirms them, so
//! drawing feels immediate at any latency; the relay's sequenced echo then
//! confirms (or, after a gap and resync, corrects) the local picture. Nothing
//! of value is lost on disconnect because canonical state lives in the
//! relay's log: reconnecting is join + replay.

pub mod network;
pub mod reconciler;

pub use network::{CanvasClient, ClientError};
pub use reconciler::{CanvasEvent, ChatEntry, Reconciler};

//! WebSocket client wiring the reconciler to a live relay.

use crate::reconciler::{CanvasEvent, Reconciler};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{protocol, Message};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed by relay")]
    Closed,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A headless whiteboard client: the UI layer feeds it `CanvasEvent`s and
/// reads the reconciler's raster, cursor overlay, and chat history back out.
pub struct CanvasClient {
    sink: WsSink,
    stream: WsStream,
    reconciler: Reconciler,
}

impl CanvasClient {
    /// Connects and sends the join handshake. The name is a hint; the
    /// relay's `welcome` carries the confirmed id.
    pub async fn connect(url: &str, name: Option<String>) -> Result<Self, ClientError> {
        info!("Connecting to {}", url);
        let (ws, _) = connect_async(url).await?;
        let (mut sink, stream) = ws.split();
        let join = Message::Join {
            user_id: name.clone(),
        };
        sink.send(WsMessage::text(protocol::encode(&join)?)).await?;
        Ok(Self {
            sink,
            stream,
            reconciler: Reconciler::new(name.unwrap_or_default()),
        })
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Feeds a local intent through the reducer and sends whatever it emits.
    pub async fn apply(&mut self, event: CanvasEvent) -> Result<(), ClientError> {
        let outbound = self.reconciler.handle(event);
        self.send_all(outbound).await
    }

    /// Awaits the next inbound frame, runs it through the reducer (which may
    /// answer with a resync request), and returns the decoded message so the
    /// UI layer can re-render whatever changed.
    pub async fn next_message(&mut self) -> Result<Message, ClientError> {
        loop {
            let Some(frame) = self.stream.next().await else {
                return Err(ClientError::Closed);
            };
            let frame = frame?;
            if frame.is_close() {
                return Err(ClientError::Closed);
            }
            let payload = match frame {
                WsMessage::Text(text) => text.as_bytes().to_vec(),
                WsMessage::Binary(bytes) => bytes.to_vec(),
                _ => continue,
            };
            match protocol::decode(&payload) {
                Ok(message) => {
                    let outbound = self
                        .reconciler
                        .handle(CanvasEvent::ServerMessage(message.clone()));
                    self.send_all(outbound).await?;
                    return Ok(message);
                }
                // Dropped and logged, never fatal to the connection
                Err(e) => warn!("Dropping undecodable frame: {}", e),
            }
        }
    }

    async fn send_all(&mut self, outbound: Vec<Message>) -> Result<(), ClientError> {
        for message in outbound {
            self.sink
                .send(WsMessage::text(protocol::encode(&message)?))
                .await?;
        }
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.sink.close().await?;
        Ok(())
    }
}

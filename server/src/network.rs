//! WebSocket listener and per-connection tasks.
//!
//! Each accepted connection runs through the `Connecting -> Joined -> Closed`
//! lifecycle: it must present a `join` frame before anything else is relayed,
//! then a reader task forwards decoded frames to the router while a writer
//! task drains the session's bounded outbound queue. A connection failure
//! tears down that session only; the router keeps running.

use crate::router::{BroadcastRouter, RouterCommand, RouterConfig};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{protocol, Message};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

type ConnectionError = Box<dyn std::error::Error + Send + Sync>;

pub struct CanvasServer {
    listener: TcpListener,
    router: BroadcastRouter,
    router_tx: mpsc::Sender<RouterCommand>,
    queue_capacity: usize,
}

impl CanvasServer {
    pub async fn bind(addr: &str, config: RouterConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);
        let (router, router_tx) = BroadcastRouter::new(&config);
        Ok(Self {
            listener,
            router,
            router_tx,
            queue_capacity: config.queue_capacity,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the router task and accepts connections until the process ends.
    pub async fn run(self) {
        let CanvasServer {
            listener,
            router,
            router_tx,
            queue_capacity,
        } = self;

        tokio::spawn(router.run());

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let router_tx = router_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, addr, router_tx, queue_capacity).await
                        {
                            debug!("Connection {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("Accept failed: {}", e),
            }
        }
    }
}

/// Text and binary frames both carry the JSON payload; everything else
/// (ping/pong, close) is handled by the transport.
fn frame_payload(frame: WsMessage) -> Option<Vec<u8>> {
    match frame {
        WsMessage::Text(text) => Some(text.as_bytes().to_vec()),
        WsMessage::Binary(bytes) => Some(bytes.to_vec()),
        _ => None,
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router_tx: mpsc::Sender<RouterCommand>,
    queue_capacity: usize,
) -> Result<(), ConnectionError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    debug!("WebSocket handshake complete for {}", addr);
    let (mut sink, mut stream) = ws.split();

    // Connecting: nothing is relayed until the client joins
    let hint = loop {
        let Some(frame) = stream.next().await else {
            return Ok(());
        };
        let frame = frame?;
        if frame.is_close() {
            return Ok(());
        }
        let Some(payload) = frame_payload(frame) else {
            continue;
        };
        match protocol::decode(&payload) {
            Ok(Message::Join { user_id }) => break user_id,
            Ok(other) => warn!("{} sent '{}' before joining; dropped", addr, other.kind()),
            Err(e) => warn!("Dropping undecodable frame from {}: {}", addr, e),
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(queue_capacity);
    let (reply_tx, reply_rx) = oneshot::channel();
    router_tx
        .send(RouterCommand::Connect {
            hint,
            outbound: outbound_tx,
            reply: reply_tx,
        })
        .await?;
    let user_id = reply_rx.await?;
    info!("{} joined as '{}'", addr, user_id);

    // Joined: writer drains the bounded outbound queue
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match protocol::encode(&message) {
                Ok(json) => {
                    if sink.send(WsMessage::text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to encode outbound message: {}", e),
            }
        }
        let _ = sink.close().await;
    });

    // Reader: decode failures drop the frame, never the connection
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Transport error for '{}': {}", user_id, e);
                break;
            }
        };
        if frame.is_close() {
            break;
        }
        let Some(payload) = frame_payload(frame) else {
            continue;
        };
        match protocol::decode(&payload) {
            Ok(message) => {
                if router_tx
                    .send(RouterCommand::Inbound {
                        user_id: user_id.clone(),
                        message,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => warn!("Dropping undecodable frame from '{}': {}", user_id, e),
        }
    }

    // Closed
    let _ = router_tx
        .send(RouterCommand::Disconnect {
            user_id: user_id.clone(),
        })
        .await;
    writer.abort();
    info!("'{}' disconnected", user_id);
    Ok(())
}

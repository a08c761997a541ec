use chrono::Utc;
use clap::Parser;
use client::{CanvasClient, CanvasEvent, ClientError};
use log::{info, warn};
use shared::Message;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Display name (a hint; the relay may disambiguate it)
    #[arg(short = 'n', long)]
    name: Option<String>,
}

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Canonical state lives in the relay's log, so a dropped connection
    // costs nothing: reconnect, rejoin, and catch up via replay.
    loop {
        let mut canvas = match CanvasClient::connect(&args.server, args.name.clone()).await {
            Ok(canvas) => canvas,
            Err(e) => {
                warn!("Connect failed ({}), retrying in {:?}", e, RECONNECT_DELAY);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        info!("Connected. Type a line to chat; Ctrl-D to quit.");

        let reconnect = loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(text) if !text.trim().is_empty() => {
                        canvas.apply(CanvasEvent::ChatSent {
                            text: text.trim().to_string(),
                            timestamp: Utc::now().to_rfc3339(),
                        }).await?;
                    }
                    Some(_) => {}
                    None => break false,
                },
                message = canvas.next_message() => match message {
                    Ok(Message::Welcome { user_id, seq }) => {
                        info!("Joined as '{}' (relay log head {})", user_id, seq);
                    }
                    Ok(Message::Chat { user_id, message, .. }) => {
                        info!("[{}] {}", user_id, message);
                    }
                    Ok(Message::CursorGone { user_id }) => {
                        info!("'{}' left", user_id);
                    }
                    Ok(Message::Draw { user_id, seq, .. }) => {
                        info!(
                            "'{}' drew (seq {:?}, applied {})",
                            user_id, seq,
                            canvas.reconciler().applied_seq()
                        );
                    }
                    Ok(Message::Clear { seq }) => {
                        info!("Canvas cleared (seq {:?})", seq);
                    }
                    Ok(_) => {}
                    Err(ClientError::Closed) => {
                        warn!("Connection lost, reconnecting in {:?}", RECONNECT_DELAY);
                        break true;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        };

        if !reconnect {
            canvas.close().await?;
            return Ok(());
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

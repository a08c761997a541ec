use clap::Parser;
use server::network::CanvasServer;
use server::router::RouterConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Outbound queue depth per client before it is disconnected
    #[arg(long, default_value = "64")]
    queue_capacity: usize,

    /// Cursor coalescing flush interval in milliseconds
    #[arg(long, default_value = "50")]
    cursor_flush_ms: u64,

    /// Log entries retained before superseded history is compacted
    #[arg(long, default_value = "10000")]
    max_log_entries: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = RouterConfig {
        queue_capacity: args.queue_capacity,
        cursor_flush: Duration::from_millis(args.cursor_flush_ms),
        max_log_entries: args.max_log_entries,
    };

    let server = CanvasServer::bind(&format!("{}:{}", args.host, args.port), config).await?;
    server.run().await;

    Ok(())
}

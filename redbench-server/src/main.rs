use clap::Parser;
use redbench_server::{Server, ServerConfig};
use std::net::SocketAddr;
use redbench_common::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "redbench-server", about = "Canned-reply target for redbench")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:6379")]
    address: SocketAddr,

    /// Reply sent for every request, without the trailing CRLF.
    #[arg(long, default_value = "+OK")]
    reply: String,

    /// Close each connection after this many replies.
    #[arg(long)]
    close_after: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let mut reply = args.reply.into_bytes();
    reply.extend_from_slice(b"\r\n");

    let config = ServerConfig {
        address: args.address,
        reply,
        close_after: args.close_after,
    };

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            tracing::info!(%addr, "listening");
        }
    });

    Server::new(config).run(ready_tx).await
}

use redbench_common::FrameScanner;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

pub mod config;
use config::{DEFAULT_REPLY, READ_BUFFER_SIZE};

/// Where the target listens and how it answers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Bytes written back once per request frame. An empty reply never answers.
    pub reply: Vec<u8>,
    /// Close each connection after this many replies.
    pub close_after: Option<u64>,
}

impl ServerConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            reply: DEFAULT_REPLY.to_vec(),
            close_after: None,
        }
    }
}

/// Canned-reply target: answers every request frame on every connection with
/// the same reply, in order.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bind, report the bound address on `ready_tx`, then serve connections forever.
    pub async fn run(
        self,
        ready_tx: tokio::sync::oneshot::Sender<SocketAddr>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        ready_tx.send(local_addr).ok();

        let config = Arc::new(self.config);
        loop {
            let (stream, peer) = listener.accept().await?;
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                match serve_connection(stream, &config).await {
                    Ok(served) => debug!(%peer, served, "connection finished"),
                    Err(e) => debug!(%peer, error = %e, "connection failed"),
                }
            });
        }
    }
}

/// Answer request frames on `stream` until the peer disconnects or
/// `close_after` replies were written. Returns the number of replies written.
pub async fn serve_connection(mut stream: TcpStream, config: &ServerConfig) -> io::Result<u64> {
    stream.set_nodelay(true)?;
    let mut scanner = FrameScanner::new();
    let mut inbuf = Vec::with_capacity(READ_BUFFER_SIZE);
    let mut outbuf = Vec::new();
    let mut served: u64 = 0;

    loop {
        let limit = match config.close_after {
            Some(max) if served >= max => return Ok(served),
            Some(max) => usize::try_from(max - served).unwrap_or(usize::MAX),
            None => usize::MAX,
        };

        if stream.read_buf(&mut inbuf).await? == 0 {
            return Ok(served);
        }

        let scanned = scanner
            .scan(&inbuf, limit)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        inbuf.drain(..scanned.consumed);

        for _ in 0..scanned.frames {
            outbuf.extend_from_slice(&config.reply);
        }
        if !outbuf.is_empty() {
            stream.write_all(&outbuf).await?;
            outbuf.clear();
        }
        served += scanned.frames as u64;
    }
}

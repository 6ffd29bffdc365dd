// Socket report sink
// Best-effort delivery of episode reports to a single TCP peer

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::output::dispatcher::SinkError;

/// Reports buffered for a slow peer before new ones are dropped
pub const SOCKET_QUEUE: usize = 64;

/// Bind `addr` and wait for exactly one peer
pub async fn accept_peer(addr: &str) -> io::Result<TcpStream> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Waiting on connection at {}", listener.local_addr()?);

    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    log::info!("Report peer connected from {}", peer);
    Ok(stream)
}

/// Spawn the writer task for a connected peer.
/// The task ends when the sink is dropped or the peer goes away.
pub fn spawn_writer(mut stream: TcpStream) -> (SocketSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(SOCKET_QUEUE);

    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = stream.write_all(message.as_bytes()).await {
                log::warn!("Report peer write failed, dropping further reports: {}", e);
                break;
            }
        }
        let _ = stream.shutdown().await;
    });

    (SocketSink::new(tx), handle)
}

/// Non-blocking handle used from the ingestion loop
pub struct SocketSink {
    tx: mpsc::Sender<String>,
}

impl SocketSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        SocketSink { tx }
    }

    /// Queue `text` plus a newline; never waits for the peer
    pub fn send(&self, text: &str) -> Result<(), SinkError> {
        self.tx
            .try_send(format!("{}\n", text))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::QueueFull,
                TrySendError::Closed(_) => SinkError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = SocketSink::new(tx);

        assert!(sink.send("1").is_ok());
        assert!(matches!(sink.send("2"), Err(SinkError::QueueFull)));
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sink = SocketSink::new(tx);

        assert!(matches!(sink.send("0"), Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_reports_reach_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                received.push(line);
            }
            received
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (sink, writer) = spawn_writer(stream);
        sink.send("0").unwrap();
        sink.send("2").unwrap();
        drop(sink);
        writer.await.unwrap();

        assert_eq!(client.await.unwrap(), vec!["0".to_string(), "2".to_string()]);
    }
}

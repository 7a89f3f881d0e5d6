//! Raw-socket SCPI transport for LAN instruments
//!
//! The 34410A/11A accept SCPI on a plain TCP socket (port 5025). Commands are
//! newline terminated and each query produces exactly one response line.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// TCP transport for instrument communication
pub struct TcpTransport {
    /// Peer address (e.g., "192.168.1.50:5025")
    pub(crate) address: String,

    /// Default read timeout for one response line
    pub(crate) timeout: Duration,

    /// Line terminator for commands (typically "\n" for SCPI)
    pub(crate) line_terminator: String,

    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpTransport {
    /// Connect to `address`, failing if the connection is not up within `timeout`.
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        debug!("TCP connection to {} established", address);

        Ok(Self {
            address: address.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Set line terminator for commands
    pub fn with_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", command, self.line_terminator);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        debug!("TCP write sent: {}", command);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let timeout = self.timeout;
        self.read_line_timeout(timeout).await
    }

    async fn read_line_timeout(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        if read == 0 {
            return Err(TransportError::Closed);
        }

        let response = line.trim().to_string();
        debug!("TCP read: {}", response);
        Ok(response)
    }

    /// Discard buffered input and whatever the socket already holds.
    ///
    /// Raw sockets have no device clear, so bytes still in flight are not
    /// affected.
    async fn clear(&mut self) -> Result<(), TransportError> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);

        let mut discarded = buffered;
        let mut buf = [0u8; 256];
        loop {
            match self.reader.get_ref().try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        debug!("TCP clear on {} discarded {} bytes", self.address, discarded);
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "TcpTransport({} @ {}ms timeout)",
            self.address,
            self.timeout.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn echo_server() -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            let received = String::from_utf8_lossy(&buf[..n]).to_string();
            socket
                .write_all(b"AGILENT TECHNOLOGIES,34410A,MY001,2.35-2.35\n")
                .await
                .unwrap();
            received
        });
        (address, handle)
    }

    #[tokio::test]
    async fn test_tcp_ask_round_trip() {
        let (address, server) = echo_server().await;
        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2))
            .await
            .unwrap();

        let response = transport.ask("*IDN?").await.unwrap();
        assert_eq!(response, "AGILENT TECHNOLOGIES,34410A,MY001,2.35-2.35");
        assert_eq!(server.await.unwrap(), "*IDN?\n");
    }

    #[tokio::test]
    async fn test_tcp_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2))
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        let result = transport.read_line().await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_per_call_timeout_overrides_default() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket.write_all(b"+1.0E+00\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2))
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        let response = transport
            .read_line_timeout(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response, "+1.0E+00");
    }

    #[tokio::test]
    async fn test_clear_discards_unread_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (sent_tx, sent_rx) = tokio::sync::oneshot::channel();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"stale one\nstale two\n").await.unwrap();
            let _ = sent_tx.send(());
            let mut buf = vec![0u8; 64];
            let _ = socket.read(&mut buf).await;
            socket.write_all(b"fresh\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2))
            .await
            .unwrap();
        sent_rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        transport.clear().await.unwrap();
        assert_eq!(transport.ask("*IDN?").await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_describe() {
        let (address, _server) = echo_server().await;
        let transport = TcpTransport::connect(&address, Duration::from_millis(3000))
            .await
            .unwrap();
        let info = transport.describe();
        assert!(info.contains(&address));
        assert!(info.contains("3000ms"));
    }
}

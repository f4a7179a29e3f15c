//! Chat client connection.

use crate::error::ClientError;
use crate::tls::{create_tls_connector, TlsClientConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// TLS configuration.
    pub tls: TlsClientConfig,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            tls: TlsClientConfig::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: TlsClientConfig) -> Self {
        self.tls = tls;
        self
    }
}

/// A connected chat session.
///
/// The protocol is strict request/response: the server sends one greeting
/// line after the handshake, then echoes one line per line sent.
pub struct ChatClient {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
    line: String,
}

impl ChatClient {
    /// Connects and completes the TLS handshake. The greeting is left on
    /// the stream; read it with [`Self::recv_line`].
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        tracing::debug!("connecting to {}", config.addr);
        let tcp_stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.addr),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        tcp_stream.set_nodelay(true).ok();

        let host = config
            .tls
            .server_name
            .clone()
            .unwrap_or_else(|| config.addr.ip().to_string());
        let (connector, server_name) = create_tls_connector(&config.tls, &host)?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;
        tracing::debug!("TLS handshake complete");

        let (read_half, write_half) = tokio::io::split(tls_stream);
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            line: String::new(),
        })
    }

    /// Receives one line; `Ok(None)` means the server closed the
    /// connection.
    pub async fn recv_line(&mut self) -> Result<Option<String>, ClientError> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line).await?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.ends_with('\n') {
            self.line.pop();
            if self.line.ends_with('\r') {
                self.line.pop();
            }
        }
        Ok(Some(self.line.clone()))
    }

    /// Sends one line.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Sends one line and waits for the echoed response.
    pub async fn send_recv(&mut self, line: &str) -> Result<Option<String>, ClientError> {
        self.send_line(line).await?;
        self.recv_line().await
    }

    /// Closes the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

//! Session message transport.
//!
//! One session owns one handshaked, TLS-wrapped connection and exposes
//! line-based receive/send. End-of-stream (`Ok(None)`) is distinct from an
//! empty line (`Ok(Some(""))`). I/O failures come back as `Err` and the
//! caller decides whether to terminate.

use std::io;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use uuid::Uuid;

/// One TLS-wrapped client connection and its line cursor.
pub struct Session<S> {
    id: Uuid,
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    line: String,
}

impl<S: AsyncRead + AsyncWrite> Session<S> {
    /// Wraps a handshaked stream. The session takes ownership; dropping it
    /// releases the connection.
    pub fn new(id: Uuid, stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            id,
            reader: BufReader::new(read_half),
            writer: write_half,
            line: String::new(),
        }
    }

    /// Returns the client id assigned at accept time.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receives one line, without its trailing `\n` or `\r\n`.
    ///
    /// Returns `Ok(None)` when the peer has closed the connection.
    pub async fn receive_line(&mut self) -> io::Result<Option<String>> {
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

    /// Sends one line, appending `\n` and flushing.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts the write half down, signalling EOF to the peer.
    pub async fn close(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn session_pair() -> (tokio::io::DuplexStream, Session<tokio::io::DuplexStream>) {
        let (peer, server) = tokio::io::duplex(1024);
        (peer, Session::new(Uuid::new_v4(), server))
    }

    #[tokio::test]
    async fn test_receive_line_strips_newline() {
        let (mut peer, mut session) = session_pair();
        peer.write_all(b"hello\n").await.unwrap();

        assert_eq!(
            session.receive_line().await.unwrap(),
            Some("hello".to_string())
        );
    }

    #[tokio::test]
    async fn test_receive_line_strips_crlf() {
        let (mut peer, mut session) = session_pair();
        peer.write_all(b"hello\r\n").await.unwrap();

        assert_eq!(
            session.receive_line().await.unwrap(),
            Some("hello".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_line_is_not_end_of_stream() {
        let (mut peer, mut session) = session_pair();
        peer.write_all(b"\n").await.unwrap();
        drop(peer);

        assert_eq!(session.receive_line().await.unwrap(), Some(String::new()));
        assert_eq!(session.receive_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_receive_after_peer_close_yields_none() {
        let (peer, mut session) = session_pair();
        drop(peer);

        assert_eq!(session.receive_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (mut peer, mut session) = session_pair();
        session.send_line("response").await.unwrap();
        session.close().await.unwrap();

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "response\n");
    }

    #[tokio::test]
    async fn test_partial_last_line_without_newline() {
        let (mut peer, mut session) = session_pair();
        peer.write_all(b"trailing").await.unwrap();
        drop(peer);

        assert_eq!(
            session.receive_line().await.unwrap(),
            Some("trailing".to_string())
        );
        assert_eq!(session.receive_line().await.unwrap(), None);
    }
}

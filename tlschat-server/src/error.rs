//! Server error types.

use thiserror::Error;

/// Server errors.
///
/// `Bind` is fatal and aborts startup. `IdentityLoad`, `Handshake` and
/// `Transport` are confined to the connection that hit them. `Dispose`
/// failures are reported and the drain continues.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listening socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to load server identity: {0}")]
    IdentityLoad(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("dispose error: {0}")]
    Dispose(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Returns whether the error is confined to a single connection.
    ///
    /// Connection-scoped failures surface through the error notification
    /// channel and must never terminate the accept loop or other sessions.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            ServerError::IdentityLoad(_) | ServerError::Handshake(_) | ServerError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_scoped_classification() {
        assert!(ServerError::Handshake("bad record".into()).is_connection_scoped());
        assert!(ServerError::IdentityLoad("missing key".into()).is_connection_scoped());
        assert!(
            ServerError::Transport(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
                .is_connection_scoped()
        );

        let bind = ServerError::Bind(std::io::Error::from(std::io::ErrorKind::AddrInUse));
        assert!(!bind.is_connection_scoped());
        assert!(!ServerError::Config("cert_path not set".into()).is_connection_scoped());
    }
}

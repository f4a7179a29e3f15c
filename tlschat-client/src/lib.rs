//! # tlschat-client
//!
//! Client library for tlschat.
//!
//! Connects over TLS, reads the server greeting, then alternates sending a
//! line and reading the echoed response. Server certificate validation uses
//! system roots, a configured CA, or can be bypassed explicitly for
//! development.

pub mod client;
pub mod error;
pub mod tls;

pub use client::{ChatClient, ClientConfig};
pub use error::ClientError;
pub use tls::TlsClientConfig;

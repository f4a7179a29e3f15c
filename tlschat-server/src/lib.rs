//! # tlschat-server
//!
//! Connection lifecycle core for tlschat.
//!
//! This crate provides:
//! - A TCP accept loop that performs a TLS server handshake per connection
//! - One independent session task per client, line-in/line-out echo
//! - Lazy, load-once server identity shared by all handshakes
//! - A synchronous notification surface for front-ends to observe
//! - Cooperative shutdown that drains all tracked sessions

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod listener;
pub mod session;

pub use config::{Config, NetworkConfig, TlsConfig, TlsVersion};
pub use error::ServerError;
pub use events::{EventHub, ListenerEvent};
pub use identity::IdentityProvider;
pub use listener::{Listener, ListenerState};
pub use session::Session;

//! tlschat - TLS-secured line-oriented chat/echo server.
//!
//! Loads configuration, logs every listener notification, and runs the
//! accept loop until Ctrl-C.

use std::sync::Arc;
use tlschat_server::{Config, Listener, ListenerEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if TLSCHAT_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("TLSCHAT_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting tlschat server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  TLS versions: {:?}, client cert required: {}, revocation checking: {}",
        config.tls.protocol_versions,
        config.tls.require_client_cert,
        config.tls.check_revocation
    );

    let listener = Arc::new(Listener::new(config));

    // The core performs no logging of its own notifications; that is this
    // front-end's job.
    listener.on_event(|event| match event {
        ListenerEvent::StartedListening { local_addr } => {
            tracing::info!("Server started listening at {}", local_addr);
        }
        ListenerEvent::StoppedListening { local_addr } => {
            tracing::info!("Server stopped listening at {}", local_addr);
        }
        ListenerEvent::ClientConnected { client_id } => {
            tracing::info!("Client connected: {}", client_id);
        }
        ListenerEvent::ClientDisconnected { client_id } => {
            tracing::info!("Client disconnected: {}", client_id);
        }
        ListenerEvent::HandshakeCompleted { client_id } => {
            tracing::info!("TLS handshake completed with {}", client_id);
        }
        ListenerEvent::MessageReceived { client_id, text } => {
            tracing::info!("Message received from {}: {}", client_id, text);
        }
        ListenerEvent::Error {
            message,
            cause,
            client_id,
        } => match client_id {
            Some(id) => tracing::error!("[{}] {}: {}", id, message, cause),
            None => tracing::error!("{}: {}", message, cause),
        },
        ListenerEvent::DisposeStarted => {
            tracing::info!("Server dispose started");
        }
        ListenerEvent::DisposeCompleted => {
            tracing::info!("Server dispose completed");
        }
    });

    // Ctrl-C triggers the cooperative shutdown signal.
    let shutdown_listener = listener.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_listener.shutdown();
    });

    listener.listen().await?;

    tracing::info!("Server stopped");
    Ok(())
}

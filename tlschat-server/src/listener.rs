//! Accept loop and connection lifecycle.
//!
//! The listener owns the accept socket. Each accepted connection gets a
//! fresh client id and an independently spawned task that performs the TLS
//! handshake and drives the echo loop, so one slow or misbehaving client
//! can never stall acceptance or disrupt other sessions. Shutdown is
//! cooperative: a broadcast signal is observed before each accept and
//! inside every session loop.

use crate::config::Config;
use crate::error::ServerError;
use crate::events::{EventHub, ListenerEvent};
use crate::identity::IdentityProvider;
use crate::session::Session;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Listener lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Draining,
    Disposed,
}

/// TLS chat/echo listener.
pub struct Listener {
    config: Config,
    identity: Arc<IdentityProvider>,
    events: Arc<EventHub>,
    /// Ids of live connections, inserted at accept time and removed exactly
    /// once at termination (by the session task or by the dispose drain).
    sessions: Arc<Mutex<HashSet<Uuid>>>,
    shutdown: broadcast::Sender<()>,
    disposed: AtomicBool,
    state: Mutex<ListenerState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Listener {
    /// Creates a new listener. Nothing is bound and no identity is loaded
    /// until [`Self::listen`] runs.
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let identity = Arc::new(IdentityProvider::new(config.tls.clone()));
        Self {
            config,
            identity,
            events: Arc::new(EventHub::new()),
            sessions: Arc::new(Mutex::new(HashSet::new())),
            shutdown: shutdown_tx,
            disposed: AtomicBool::new(false),
            state: Mutex::new(ListenerState::Idle),
            local_addr: Mutex::new(None),
        }
    }

    /// Registers a notification handler. Handlers are invoked synchronously
    /// from listener tasks and must not block.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&ListenerEvent) + Send + Sync + 'static,
    {
        self.events.register(handler);
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Returns whether the listener has been disposed. Once true, never
    /// resets.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns the number of tracked live connections.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Binds the configured address and accepts connections until shutdown.
    ///
    /// Always ends by disposing the listener: on a clean shutdown signal,
    /// when the accept loop faults, or when binding fails. A bind failure
    /// is fatal and is also reported through the error notification.
    pub async fn listen(&self) -> Result<(), ServerError> {
        if self.is_disposed() {
            return Err(ServerError::Dispose("listener already disposed".into()));
        }

        let bound = TokioTcpListener::bind(self.config.network.bind_addr)
            .await
            .and_then(|listener| {
                let local_addr = listener.local_addr()?;
                Ok((listener, local_addr))
            });
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.emit_error("failed to bind listening socket", &e, None);
                self.dispose();
                return Err(ServerError::Bind(e));
            }
        };
        *self.local_addr.lock() = Some(local_addr);
        *self.state.lock() = ListenerState::Listening;
        self.events
            .emit(&ListenerEvent::StartedListening { local_addr });
        tracing::info!("listening on {}", local_addr);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            // Guards against accepting on a socket closed by dispose.
            if self.is_disposed() {
                break;
            }

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, peer_addr)) => {
                            self.spawn_client(tcp_stream, peer_addr);
                        }
                        Err(e) => {
                            self.emit_error("accept failed on listening socket", &e, None);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown signal received, draining");
                    break;
                }
            }
        }

        drop(listener);
        self.dispose();
        Ok(())
    }

    /// Assigns a client id and hands the connection to its own task.
    ///
    /// The id is minted and announced before any TLS negotiation; the
    /// accept loop never waits for a handshake.
    fn spawn_client(&self, tcp_stream: TcpStream, peer_addr: SocketAddr) {
        // A connection that races with dispose is closed silently: it must
        // not be announced or tracked once the drain has begun.
        if self.is_disposed() {
            tracing::debug!("dropping connection from {} during dispose", peer_addr);
            return;
        }

        let client_id = Uuid::new_v4();
        self.events
            .emit(&ListenerEvent::ClientConnected { client_id });
        self.sessions.lock().insert(client_id);
        tracing::debug!("[{}] accepted connection from {}", client_id, peer_addr);

        let identity = self.identity.clone();
        let events = self.events.clone();
        let sessions = self.sessions.clone();
        let greeting = self.config.network.greeting.clone();
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(handle_client(
            tcp_stream, client_id, identity, events, sessions, greeting, shutdown,
        ));
    }

    /// Signals cooperative shutdown: the accept loop and every session loop
    /// observe it and wind down, after which [`Self::listen`] disposes.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Stops the socket, drains all tracked sessions and marks the listener
    /// disposed. Idempotent; a second call does nothing.
    ///
    /// Best-effort: failures inside the drain surface as error
    /// notifications, never as a panic or return value.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = ListenerState::Draining;
        self.events.emit(&ListenerEvent::DisposeStarted);

        // Wake the accept loop and any session blocked on a read.
        let _ = self.shutdown.send(());

        if let Some(local_addr) = self.local_addr.lock().take() {
            self.events
                .emit(&ListenerEvent::StoppedListening { local_addr });
            tracing::info!("stopped listening on {}", local_addr);
        }

        let drained: Vec<Uuid> = self.sessions.lock().drain().collect();
        for client_id in drained {
            self.events
                .emit(&ListenerEvent::ClientDisconnected { client_id });
        }

        *self.state.lock() = ListenerState::Disposed;
        self.events.emit(&ListenerEvent::DisposeCompleted);
    }

    fn emit_error(&self, message: &str, cause: &dyn std::fmt::Display, client_id: Option<Uuid>) {
        self.events.emit(&ListenerEvent::Error {
            message: message.to_string(),
            cause: cause.to_string(),
            client_id,
        });
    }
}

/// Drives one connection from TLS handshake to termination.
///
/// Every failure in here is confined to this connection: it becomes an
/// error notification tagged with the client id and the task exits. The
/// disconnect notification fires exactly once per client, gated on the
/// registry removal so the dispose drain and this path never both emit it.
async fn handle_client(
    tcp_stream: TcpStream,
    client_id: Uuid,
    identity: Arc<IdentityProvider>,
    events: Arc<EventHub>,
    sessions: Arc<Mutex<HashSet<Uuid>>>,
    greeting: String,
    mut shutdown: broadcast::Receiver<()>,
) {
    let result = drive_session(
        tcp_stream, client_id, &identity, &events, &greeting, &mut shutdown,
    )
    .await;

    if let Err(e) = result {
        events.emit(&ListenerEvent::Error {
            message: "error while handling client connection".to_string(),
            cause: e.to_string(),
            client_id: Some(client_id),
        });
    }

    if sessions.lock().remove(&client_id) {
        events.emit(&ListenerEvent::ClientDisconnected { client_id });
    }
    tracing::debug!("[{}] connection task finished", client_id);
}

async fn drive_session(
    tcp_stream: TcpStream,
    client_id: Uuid,
    identity: &IdentityProvider,
    events: &EventHub,
    greeting: &str,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    // May block on first use only; afterwards the identity is cached.
    let acceptor = identity.acceptor().await?;

    let tls_stream = acceptor
        .accept(tcp_stream)
        .await
        .map_err(|e| ServerError::Handshake(e.to_string()))?;
    events.emit(&ListenerEvent::HandshakeCompleted { client_id });
    tracing::debug!("[{}] TLS handshake complete", client_id);

    let mut session = Session::new(client_id, tls_stream);
    let result = message_loop(&mut session, events, greeting, shutdown).await;

    // The connection is closed on every exit path; a close failure is
    // reported but does not change the outcome.
    if let Err(e) = session.close().await {
        events.emit(&ListenerEvent::Error {
            message: "error while closing client connection".to_string(),
            cause: e.to_string(),
            client_id: Some(client_id),
        });
    }

    result
}

/// Strict request/response: one line in, one echoed line out.
///
/// Exits on peer close, transport error, or the shutdown signal. The
/// signal interrupts a blocked read, so shutdown latency does not depend
/// on a silent peer.
async fn message_loop<S>(
    session: &mut Session<S>,
    events: &EventHub,
    greeting: &str,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite,
{
    session
        .send_line(greeting)
        .await
        .map_err(ServerError::Transport)?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("[{}] shutdown signal received", session.id());
                return Ok(());
            }
            received = session.receive_line() => {
                match received.map_err(ServerError::Transport)? {
                    Some(text) => {
                        events.emit(&ListenerEvent::MessageReceived {
                            client_id: session.id(),
                            text: text.clone(),
                        });
                        let response = format!("{}: {}", session.id(), text);
                        session
                            .send_line(&response)
                            .await
                            .map_err(ServerError::Transport)?;
                    }
                    None => {
                        tracing::debug!("[{}] connection closed by peer", session.id());
                        return Ok(());
                    }
                }
            }
        }
    }
}

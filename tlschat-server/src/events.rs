//! Listener notification surface.
//!
//! The listener reports everything it does through named events so that
//! front-ends can log or print them without the core doing any formatting
//! itself. Delivery is synchronous, in registration order, and best-effort;
//! a handler that blocks stalls the emitting task, so handlers must not
//! block.

use parking_lot::RwLock;
use std::net::SocketAddr;
use uuid::Uuid;

/// A notification emitted by the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// The listening socket is bound; emitted before any connection is accepted.
    StartedListening { local_addr: SocketAddr },
    /// The listening socket has been stopped during drain.
    StoppedListening { local_addr: SocketAddr },
    /// A connection was accepted and assigned an id, before TLS negotiation.
    ClientConnected { client_id: Uuid },
    /// A session ended, on any termination path.
    ClientDisconnected { client_id: Uuid },
    /// The TLS server handshake succeeded for this connection.
    HandshakeCompleted { client_id: Uuid },
    /// One line was received; `text` may be empty (an empty line is not
    /// a disconnect).
    MessageReceived { client_id: Uuid, text: String },
    /// Any failure, carrying the originating client id where applicable.
    Error {
        message: String,
        cause: String,
        client_id: Option<Uuid>,
    },
    DisposeStarted,
    DisposeCompleted,
}

type Handler = Box<dyn Fn(&ListenerEvent) + Send + Sync>;

/// Multicast fan-out for [`ListenerEvent`]s.
///
/// An explicit list of registered callbacks, invoked synchronously in
/// registration order.
#[derive(Default)]
pub struct EventHub {
    handlers: RwLock<Vec<Handler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Handlers cannot be unregistered; they live as
    /// long as the hub.
    pub fn register<F>(&self, handler: F)
    where
        F: Fn(&ListenerEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Box::new(handler));
    }

    /// Invokes every registered handler with the event, in registration
    /// order.
    pub fn emit(&self, event: &ListenerEvent) {
        for handler in self.handlers.read().iter() {
            handler(event);
        }
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_handlers_invoked_in_registration_order() {
        let hub = EventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            hub.register(move |_| order.lock().push(i));
        }

        hub.emit(&ListenerEvent::DisposeStarted);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(hub.handler_count(), 3);
    }

    #[test]
    fn test_emit_without_handlers_is_a_noop() {
        let hub = EventHub::new();
        hub.emit(&ListenerEvent::DisposeCompleted);
        assert_eq!(hub.handler_count(), 0);
    }

    #[test]
    fn test_every_handler_sees_every_event() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        hub.register(move |event| sink.lock().push(event.clone()));

        let client_id = Uuid::new_v4();
        hub.emit(&ListenerEvent::ClientConnected { client_id });
        hub.emit(&ListenerEvent::MessageReceived {
            client_id,
            text: String::new(),
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ListenerEvent::ClientConnected { client_id });
        assert_eq!(
            seen[1],
            ListenerEvent::MessageReceived {
                client_id,
                text: String::new()
            }
        );
    }
}

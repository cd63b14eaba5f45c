//! Fan-out of server messages to live connections.

use crate::protocol::ServerMessage;
use crate::session::Session;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

/// Transport connection reference, unique per socket for the process lifetime.
pub type ConnectionId = u64;

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialize and send.
    Message(ServerMessage),
    /// Close the socket after draining.
    Close,
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Outbound queues of every open connection.
#[derive(Debug, Default)]
pub struct Outbox {
    connections: HashMap<ConnectionId, OutboundSender>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's queue.
    #[instrument(skip(self, sender))]
    pub fn attach(&mut self, connection: ConnectionId, sender: OutboundSender) {
        debug!("Connection attached");
        self.connections.insert(connection, sender);
    }

    /// Forgets a connection.
    #[instrument(skip(self))]
    pub fn detach(&mut self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_some() {
            debug!("Connection detached");
        }
    }

    /// Whether the connection is known and its writer is still running.
    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Sends to one connection. Returns false if it is absent or closed.
    pub fn send(&self, connection: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&connection) {
            Some(sender) => {
                trace!(connection, kind = message.kind(), "Sending message");
                sender.send(Outbound::Message(message)).is_ok()
            }
            None => {
                trace!(connection, kind = message.kind(), "Skipping absent connection");
                false
            }
        }
    }

    /// Asks the connection's writer to close the socket.
    #[instrument(skip(self))]
    pub fn close(&mut self, connection: ConnectionId) {
        if let Some(sender) = self.connections.remove(&connection) {
            debug!("Closing connection");
            let _ = sender.send(Outbound::Close);
        }
    }

    /// Delivers `message` to every slot of `session` with a present, open
    /// connection. Returns how many connections received it.
    #[instrument(skip(self, session, message), fields(kind = message.kind()))]
    pub fn broadcast(&self, session: &Session, message: &ServerMessage) -> usize {
        let delivered = session
            .slots()
            .filter_map(|slot| *slot.connection())
            .filter(|connection| self.send(*connection, message.clone()))
            .count();
        debug!(delivered, "Broadcast complete");
        delivered
    }
}

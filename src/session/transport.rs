use crate::data::protocol::OutboundMessage;
use crate::error::TransportError;

/// Identifies one physical connection. Events from an older connection are
/// stale once a newer one has been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Open,
    Message(String),
    Close,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub connection: ConnectionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(connection: ConnectionId, kind: TransportEventKind) -> Self {
        Self { connection, kind }
    }
}

/// Bidirectional message channel. Calls return immediately; outcomes arrive
/// later as [`TransportEvent`]s delivered to the session.
pub trait Transport {
    /// Start a new connection. `Open` (or `Error`) follows as an event.
    fn connect(&mut self) -> Result<ConnectionId, TransportError>;

    fn send(&mut self, connection: ConnectionId, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Idempotent; closing an unknown or already closed connection is a no-op.
    fn close(&mut self, connection: ConnectionId);
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Records every call so tests can assert on the wire traffic.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        pub next_id: u64,
        pub connects: Vec<ConnectionId>,
        pub closed: Vec<ConnectionId>,
        pub sent: Vec<(ConnectionId, serde_json::Value)>,
        pub fail_connect: bool,
        pub fail_send: bool,
    }

    impl RecordingTransport {
        pub fn last_connection(&self) -> ConnectionId {
            *self.connects.last().expect("no connection opened")
        }

        pub fn sent_values(&self) -> Vec<serde_json::Value> {
            self.sent.iter().map(|(_, v)| v.clone()).collect()
        }

        pub fn sent_with_key(&self, key: &str) -> Vec<serde_json::Value> {
            self.sent
                .iter()
                .filter(|(_, v)| v.get(key).is_some())
                .map(|(_, v)| v.clone())
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn connect(&mut self) -> Result<ConnectionId, TransportError> {
            if self.fail_connect {
                return Err(TransportError::Connect("refused".to_string()));
            }
            self.next_id += 1;
            let id = ConnectionId(self.next_id);
            self.connects.push(id);
            Ok(id)
        }

        fn send(&mut self, connection: ConnectionId, message: &OutboundMessage) -> Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Send("broken pipe".to_string()));
            }
            let value = serde_json::to_value(message).map_err(|e| TransportError::Send(e.to_string()))?;
            self.sent.push((connection, value));
            Ok(())
        }

        fn close(&mut self, connection: ConnectionId) {
            if !self.closed.contains(&connection) {
                self.closed.push(connection);
            }
        }
    }
}

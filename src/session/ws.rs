use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use crate::data::protocol::OutboundMessage;
use crate::error::TransportError;
use crate::session::transport::{ConnectionId, Transport, TransportEvent, TransportEventKind};

struct ActiveSocket {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
}

/// WebSocket transport. Each connection runs its socket I/O on its own task
/// and reports back through the shared event channel.
pub struct WsTransport {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    next_id: u64,
    active: Option<ActiveSocket>,
}

impl WsTransport {
    pub fn new(url: String) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            url,
            events,
            next_id: 0,
            active: None,
        };
        (transport, rx)
    }
}

impl Transport for WsTransport {
    fn connect(&mut self) -> Result<ConnectionId, TransportError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if let Some(previous) = self.active.take() {
            debug!("Tearing down {} before reconnecting", previous.id);
        }

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        handle.spawn(run_socket(self.url.clone(), id, outbound_rx, self.events.clone()));
        self.active = Some(ActiveSocket { id, outbound });

        Ok(id)
    }

    fn send(&mut self, connection: ConnectionId, message: &OutboundMessage) -> Result<(), TransportError> {
        let socket = self
            .active
            .as_ref()
            .filter(|s| s.id == connection)
            .ok_or(TransportError::NotConnected)?;

        let json = message
            .to_json()
            .map_err(|e| TransportError::Send(e.to_string()))?;

        socket
            .outbound
            .send(Message::Text(json))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self, connection: ConnectionId) {
        if self.active.as_ref().map(|s| s.id) == Some(connection) {
            // dropping the sender makes the socket task send a close frame
            self.active = None;
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<TransportEvent>, id: ConnectionId, kind: TransportEventKind) {
    let _ = events.send(TransportEvent::new(id, kind));
}

async fn run_socket(
    url: String,
    id: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    info!("Connecting to {} ({})", url, id);
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            emit(&events, id, TransportEventKind::Error(e.to_string()));
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();
    emit(&events, id, TransportEventKind::Open);

    loop {
        tokio::select! {
            out = outbound.recv() => {
                match out {
                    Some(msg) => {
                        if let Err(e) = write.send(msg).await {
                            emit(&events, id, TransportEventKind::Error(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        emit(&events, id, TransportEventKind::Close);
                        break;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(&events, id, TransportEventKind::Message(text));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        emit(&events, id, TransportEventKind::Close);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error on {}: {}", id, e);
                        emit(&events, id, TransportEventKind::Error(e.to_string()));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!("Socket task for {} finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_outside_runtime_is_an_error() {
        let (mut transport, _rx) = WsTransport::new("ws://127.0.0.1:9".to_string());
        assert!(matches!(transport.connect(), Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_send_to_stale_connection_is_rejected() {
        let (mut transport, _rx) = WsTransport::new("ws://127.0.0.1:9".to_string());
        let first = transport.connect().unwrap();
        let second = transport.connect().unwrap();
        assert_ne!(first, second);

        assert_eq!(
            transport.send(first, &OutboundMessage::ping()),
            Err(TransportError::NotConnected)
        );

        transport.close(second);
        transport.close(second);
        assert_eq!(
            transport.send(second, &OutboundMessage::ping()),
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_error_event() {
        let (mut transport, mut rx) = WsTransport::new("ws://127.0.0.1:9".to_string());
        let id = transport.connect().unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.connection, id);
        assert!(matches!(event.kind, TransportEventKind::Error(_)));
    }
}

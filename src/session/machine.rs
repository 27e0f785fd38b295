use std::time::{Duration, Instant};
use tracing::debug;
use crate::data::protocol::{AuthorizeResponse, Credential, HistoryResponse, InboundMessage, OutboundMessage};
use crate::error::{AnalyzerError, ProtocolError, TransportError, ValidationError};
use crate::monitoring::{ConnectionStatus, Notifier};
use crate::session::transport::{ConnectionId, Transport, TransportEvent, TransportEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Ready,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Connecting => "CONNECTING",
            SessionState::AwaitingAuth => "AWAITING_AUTH",
            SessionState::Ready => "READY",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

type ActionFn<T> = Box<dyn FnOnce(&mut SessionStateMachine<T>) -> Result<(), TransportError>>;

/// An operation to run once the session is authorized.
pub struct DeferredAction<T: Transport> {
    label: String,
    run: ActionFn<T>,
}

impl<T: Transport> DeferredAction<T> {
    pub fn new(
        label: impl Into<String>,
        run: impl FnOnce(&mut SessionStateMachine<T>) -> Result<(), TransportError> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: Transport> std::fmt::Debug for DeferredAction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredAction").field("label", &self.label).finish()
    }
}

/// What a transport event meant for the layer above.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Idle,
    Ready,
    Disconnected,
    Failed(AnalyzerError),
    History(HistoryResponse),
}

/// Connection lifecycle, authorization handshake and the single deferred
/// action.
pub struct SessionStateMachine<T: Transport> {
    transport: T,
    token: Credential,
    state: SessionState,
    connection: Option<ConnectionId>,
    account_label: Option<String>,
    pending: Option<DeferredAction<T>>,
    notifier: Notifier,
    auth_timeout: Duration,
    auth_deadline: Option<Instant>,
}

impl<T: Transport> SessionStateMachine<T> {
    pub fn new(transport: T, token: Credential, notifier: Notifier, auth_timeout: Duration) -> Self {
        Self {
            transport,
            token,
            state: SessionState::Disconnected,
            connection: None,
            account_label: None,
            pending: None,
            notifier,
            auth_timeout,
            auth_deadline: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn account_label(&self) -> Option<&str> {
        self.account_label.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_label(&self) -> Option<&str> {
        self.pending.as_ref().map(DeferredAction::label)
    }

    pub fn auth_deadline(&self) -> Option<Instant> {
        self.auth_deadline
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Session {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn publish_status(&self) {
        self.notifier.status(ConnectionStatus {
            online: self.is_ready(),
            account_label: self.account_label.clone(),
        });
    }

    /// Open a fresh connection, closing any existing one first.
    pub fn connect(&mut self) -> Result<(), AnalyzerError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingToken.into());
        }

        if let Some(previous) = self.connection.take() {
            self.transport.close(previous);
        }
        self.account_label = None;

        match self.transport.connect() {
            Ok(id) => {
                self.connection = Some(id);
                self.auth_deadline = Some(Instant::now() + self.auth_timeout);
                self.set_state(SessionState::Connecting);
                self.notifier.info(format!("Connecting ({})...", id));
                self.publish_status();
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Close the connection and drop any pending action.
    pub fn disconnect(&mut self) {
        if let Some(id) = self.connection.take() {
            self.transport.close(id);
        }
        if let Some(action) = self.pending.take() {
            debug!("Dropping pending action on disconnect: {}", action.label);
        }
        self.account_label = None;
        self.auth_deadline = None;
        self.set_state(SessionState::Disconnected);
        self.notifier.info("Disconnected.");
        self.publish_status();
    }

    /// Run `action` now if authorized; otherwise keep it as the pending action
    /// (replacing any earlier one) and restart the connection.
    pub fn request_action(&mut self, action: DeferredAction<T>) -> Result<(), AnalyzerError> {
        if self.is_ready() {
            return self.run_action(action);
        }
        if self.token.is_empty() {
            return Err(ValidationError::MissingToken.into());
        }

        if let Some(previous) = self.pending.replace(action) {
            debug!("Pending action superseded: {}", previous.label);
        }
        self.notifier
            .warn("Connection lost or not established. Reconnecting and authorizing...");
        self.connect()
    }

    fn run_action(&mut self, action: DeferredAction<T>) -> Result<(), AnalyzerError> {
        debug!("Running action: {}", action.label);
        (action.run)(self).map_err(|e| self.fail(e.into()))
    }

    pub fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let connection = match (self.state, self.connection) {
            (SessionState::AwaitingAuth | SessionState::Ready, Some(id)) => id,
            _ => return Err(TransportError::NotConnected),
        };
        self.transport.send(connection, message)
    }

    /// Send a ping while authorized.
    pub fn keepalive(&mut self) -> Result<(), AnalyzerError> {
        if !self.is_ready() {
            return Ok(());
        }
        self.send(&OutboundMessage::ping())
            .map_err(|e| self.fail(e.into()))
    }

    /// Fail the session when the handshake has not finished by its deadline.
    pub fn check_deadline(&mut self, now: Instant) -> SessionSignal {
        let handshaking = matches!(self.state, SessionState::Connecting | SessionState::AwaitingAuth);
        let expired = self.auth_deadline.map_or(false, |deadline| now >= deadline);
        if !(handshaking && expired) {
            return SessionSignal::Idle;
        }

        let timeout = self.auth_timeout;
        SessionSignal::Failed(self.fail(TransportError::AuthTimeout(timeout).into()))
    }

    pub fn on_event(&mut self, event: TransportEvent) -> SessionSignal {
        if self.connection != Some(event.connection) {
            debug!("Ignoring event from stale {}: {:?}", event.connection, event.kind);
            return SessionSignal::Idle;
        }

        match event.kind {
            TransportEventKind::Open => self.on_open(),
            TransportEventKind::Message(text) => self.dispatch(&text),
            TransportEventKind::Close => self.on_close(),
            TransportEventKind::Error(cause) => {
                SessionSignal::Failed(self.fail(TransportError::Socket(cause).into()))
            }
        }
    }

    fn on_open(&mut self) -> SessionSignal {
        if self.state != SessionState::Connecting {
            return SessionSignal::Idle;
        }
        self.set_state(SessionState::AwaitingAuth);
        self.notifier
            .info("WebSocket connection established. Requesting authorization...");

        let authorize = OutboundMessage::authorize(&self.token);
        match self.send(&authorize) {
            Ok(()) => SessionSignal::Idle,
            Err(e) => SessionSignal::Failed(self.fail(e.into())),
        }
    }

    fn dispatch(&mut self, text: &str) -> SessionSignal {
        let message = match InboundMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                debug!("Ignoring undecodable frame: {}", e);
                return SessionSignal::Idle;
            }
        };

        match message {
            InboundMessage::Error(err) => {
                debug!("API error on {:?} (req_id {:?})", err.msg_type, err.req_id);
                SessionSignal::Failed(self.fail(
                    ProtocolError::Api {
                        code: err.code,
                        message: err.message,
                    }
                    .into(),
                ))
            }
            InboundMessage::Authorize(auth) => self.on_authorize(auth),
            InboundMessage::History(history) => SessionSignal::History(history),
            InboundMessage::Pong => {
                debug!("Keepalive acknowledged");
                SessionSignal::Idle
            }
            InboundMessage::Other(msg_type) => {
                debug!("Ignoring message type {:?}", msg_type);
                SessionSignal::Idle
            }
        }
    }

    fn on_authorize(&mut self, auth: AuthorizeResponse) -> SessionSignal {
        if self.state != SessionState::AwaitingAuth {
            debug!("Unexpected authorize response in {}", self.state);
            return SessionSignal::Idle;
        }

        let Some(label) = auth.account_label() else {
            return SessionSignal::Failed(self.fail(
                ProtocolError::Unauthorized("Check your API token.".to_string()).into(),
            ));
        };

        self.account_label = Some(label.clone());
        self.auth_deadline = None;
        self.set_state(SessionState::Ready);
        self.notifier
            .success(format!("Authorization successful. Account: {}", label));
        self.publish_status();

        if let Err(e) = self.send(&OutboundMessage::ping()) {
            return SessionSignal::Failed(self.fail(e.into()));
        }

        if let Some(action) = self.pending.take() {
            self.notifier
                .info(format!("Authorization successful. Resuming: {}", action.label));
            if let Err(e) = self.run_action(action) {
                return SessionSignal::Failed(e);
            }
        }

        SessionSignal::Ready
    }

    fn on_close(&mut self) -> SessionSignal {
        self.connection = None;
        self.auth_deadline = None;
        if self.state == SessionState::Failed {
            return SessionSignal::Idle;
        }

        self.account_label = None;
        self.set_state(SessionState::Disconnected);
        self.notifier.error("WebSocket connection closed.");
        self.publish_status();
        SessionSignal::Disconnected
    }

    /// Terminal for the current connection: close it, drop the pending action
    /// and report.
    fn fail(&mut self, err: AnalyzerError) -> AnalyzerError {
        if let Some(id) = self.connection.take() {
            self.transport.close(id);
        }
        if let Some(action) = self.pending.take() {
            debug!("Discarding pending action: {}", action.label);
        }
        self.account_label = None;
        self.auth_deadline = None;
        self.set_state(SessionState::Failed);
        self.notifier.failure(None, &err);
        self.publish_status();
        err
    }
}

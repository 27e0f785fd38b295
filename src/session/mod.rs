pub mod machine;
pub mod transport;
pub mod ws;

pub use machine::{DeferredAction, SessionSignal, SessionState, SessionStateMachine};
pub use transport::{ConnectionId, Transport, TransportEvent, TransportEventKind};

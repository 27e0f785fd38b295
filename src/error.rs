use std::time::Duration;
use crate::analysis::types::ContractKind;

/// Connection-level failures. Any of these moves the session to `Failed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("WebSocket error: {0}")]
    Socket(String),

    #[error("WebSocket is not open")]
    NotConnected,

    #[error("Connection closed before the response arrived")]
    Closed,

    #[error("Authorization timed out after {0:?}")]
    AuthTimeout(Duration),
}

/// API-level failures reported by the server.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("API error [{code}]: {message}")]
    Api { code: String, message: String },

    #[error("Authorization failed: {0}")]
    Unauthorized(String),
}

/// Bad caller input. Never touches session state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Target digit is required for {0} analysis")]
    MissingTargetDigit(ContractKind),

    #[error("Target digit must be between 0 and 9, got {0}")]
    TargetDigitOutOfRange(u8),

    #[error("Tick count must be between 1 and {max}, got {requested}")]
    TickCountOutOfRange { requested: u64, max: u32 },

    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("API token is required to connect")]
    MissingToken,
}

/// History could not be turned into a usable tick series.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataAcquisitionError {
    #[error("History response carried no price list")]
    MissingPrices,

    #[error("None of the {received} history prices could be parsed")]
    NoParsablePrices { received: usize },

    #[error("No history response within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataAcquisition(#[from] DataAcquisitionError),
}

impl AnalyzerError {
    /// Short category name for rendering next to the cause.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::Transport(_) => "transport",
            AnalyzerError::Protocol(_) => "protocol",
            AnalyzerError::Validation(_) => "validation",
            AnalyzerError::DataAcquisition(_) => "data",
        }
    }

    /// Whether the error ended the current connection.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AnalyzerError::Transport(_) | AnalyzerError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_fatality() {
        let err: AnalyzerError = TransportError::NotConnected.into();
        assert_eq!(err.kind(), "transport");
        assert!(err.is_session_fatal());

        let err: AnalyzerError = ValidationError::EmptySymbol.into();
        assert_eq!(err.kind(), "validation");
        assert!(!err.is_session_fatal());

        let err: AnalyzerError = DataAcquisitionError::MissingPrices.into();
        assert_eq!(err.kind(), "data");
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_messages_are_renderable() {
        let err: AnalyzerError = ValidationError::MissingTargetDigit(ContractKind::MatchesDiffers).into();
        assert_eq!(err.to_string(), "Target digit is required for MATCHES_DIFFERS analysis");

        let err: AnalyzerError = ProtocolError::Api {
            code: "InvalidToken".to_string(),
            message: "The token is invalid.".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "API error [InvalidToken]: The token is invalid.");
    }
}

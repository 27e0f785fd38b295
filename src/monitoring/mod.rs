pub mod console;
pub mod logger;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use crate::analysis::types::AnalysisReport;
use crate::error::AnalyzerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub online: bool,
    pub account_label: Option<String>,
}

impl ConnectionStatus {
    pub fn offline() -> Self {
        Self {
            online: false,
            account_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub request_id: Option<u64>,
    pub kind: &'static str,
    pub cause: String,
}

/// What the core hands to the presentation side.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Status(ConnectionStatus),
    Log(LogEntry),
    Report(AnalysisReport),
    Failure(FailureReport),
}

/// Fire-and-forget sender for notices. Every log entry is mirrored to
/// `tracing` so headless runs still see it.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that only writes to `tracing`.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    fn emit(&self, notice: Notice) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(notice);
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.emit(Notice::Log(LogEntry {
            at: Local::now(),
            level,
            message,
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn status(&self, status: ConnectionStatus) {
        self.emit(Notice::Status(status));
    }

    pub fn report(&self, report: AnalysisReport) {
        self.emit(Notice::Report(report));
    }

    pub fn failure(&self, request_id: Option<u64>, err: &AnalyzerError) {
        self.error(format!("{} error: {}", err.kind(), err));
        self.emit(Notice::Failure(FailureReport {
            request_id,
            kind: err.kind(),
            cause: err.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_failure_emits_log_then_failure() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.failure(Some(4), &ValidationError::EmptySymbol.into());

        match rx.try_recv().unwrap() {
            Notice::Log(entry) => assert_eq!(entry.level, LogLevel::Error),
            other => panic!("expected log, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            Notice::Failure(report) => {
                assert_eq!(report.request_id, Some(4));
                assert_eq!(report.kind, "validation");
                assert_eq!(report.cause, "Symbol must not be empty");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_silent_notifier_does_not_panic() {
        let notifier = Notifier::silent();
        notifier.info("nobody listening");
        notifier.status(ConnectionStatus::offline());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.success("still fine");
    }
}

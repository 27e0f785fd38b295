use std::time::{Duration, Instant};
use tracing::debug;
use crate::analysis::engine::{analyze, digit_distribution};
use crate::analysis::types::{AnalysisReport, ContractSpec};
use crate::data::protocol::{HistoryResponse, OutboundMessage, TicksHistoryRequest};
use crate::data::types::TickBuffer;
use crate::error::{AnalyzerError, DataAcquisitionError, TransportError, ValidationError};
use crate::monitoring::Notifier;
use crate::session::{DeferredAction, SessionSignal, SessionStateMachine, Transport, TransportEvent};

/// The single history fetch currently awaited.
#[derive(Debug, Clone, PartialEq)]
pub struct OutstandingRequest {
    pub id: u64,
    pub symbol: String,
    pub count: u32,
    pub spec: ContractSpec,
    pub deadline: Instant,
}

impl OutstandingRequest {
    /// Correlate by echoed `req_id`; fall back to the echoed symbol only when
    /// the server dropped `req_id`.
    fn matches(&self, history: &HistoryResponse) -> bool {
        match history.req_id {
            Some(id) => id == self.id,
            None => history.symbol.as_deref() == Some(self.symbol.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed(AnalysisReport),
    Failed { request_id: u64, error: AnalyzerError },
}

/// Turns analysis requests into history fetches and delivers the computed
/// results.
pub struct RequestOrchestrator<T: Transport> {
    session: SessionStateMachine<T>,
    buffer: TickBuffer,
    outstanding: Option<OutstandingRequest>,
    next_request_id: u64,
    max_ticks: u32,
    history_timeout: Duration,
    notifier: Notifier,
}

impl<T: Transport + 'static> RequestOrchestrator<T> {
    pub fn new(
        session: SessionStateMachine<T>,
        max_ticks: u32,
        history_timeout: Duration,
        notifier: Notifier,
    ) -> Self {
        Self {
            session,
            buffer: TickBuffer::with_capacity(max_ticks as usize),
            outstanding: None,
            next_request_id: 1,
            max_ticks,
            history_timeout,
            notifier,
        }
    }

    pub fn session(&self) -> &SessionStateMachine<T> {
        &self.session
    }

    pub fn buffer(&self) -> &TickBuffer {
        &self.buffer
    }

    pub fn outstanding(&self) -> Option<&OutstandingRequest> {
        self.outstanding.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_none()
    }

    /// Validate and issue a history fetch for `symbol`. The fetch runs now if
    /// the session is ready, otherwise after connect + authorize. Returns the
    /// correlation id of the new request.
    pub fn run_analysis(
        &mut self,
        symbol: &str,
        requested_count: u64,
        spec: ContractSpec,
    ) -> Result<u64, AnalyzerError> {
        let symbol = symbol.trim().to_string();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        let count = u32::try_from(requested_count)
            .ok()
            .filter(|c| (1..=self.max_ticks).contains(c))
            .ok_or(ValidationError::TickCountOutOfRange {
                requested: requested_count,
                max: self.max_ticks,
            })?;
        spec.validate()?;

        let id = self.next_request_id;
        self.next_request_id += 1;

        if let Some(previous) = self.outstanding.take() {
            debug!("Request {} superseded by {}", previous.id, id);
        }
        self.outstanding = Some(OutstandingRequest {
            id,
            symbol: symbol.clone(),
            count,
            spec,
            deadline: Instant::now() + self.history_timeout,
        });

        let label = format!("fetch {} ticks of {}", count, symbol);
        let action = DeferredAction::new(label, move |session: &mut SessionStateMachine<T>| {
            session
                .notifier()
                .info(format!("Requesting {} ticks for {}...", count, symbol));
            session.send(&OutboundMessage::TicksHistory(TicksHistoryRequest::latest(
                &symbol, count, id,
            )))
        });

        if let Err(e) = self.session.request_action(action) {
            self.outstanding = None;
            return Err(e);
        }
        Ok(id)
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Option<RequestOutcome> {
        match self.session.on_event(event) {
            SessionSignal::History(history) => self.on_history(history),
            SessionSignal::Failed(error) => self
                .outstanding
                .take()
                .map(|req| RequestOutcome::Failed { request_id: req.id, error }),
            SessionSignal::Disconnected => {
                // a fetch still pending in the session resumes on reconnect;
                // one already sent is lost with the socket
                if self.session.has_pending() {
                    return None;
                }
                let req = self.outstanding.take()?;
                Some(self.fail_request(req.id, TransportError::Closed.into()))
            }
            SessionSignal::Ready | SessionSignal::Idle => None,
        }
    }

    fn on_history(&mut self, history: HistoryResponse) -> Option<RequestOutcome> {
        let matched = self
            .outstanding
            .as_ref()
            .map_or(false, |req| req.matches(&history));
        if !matched {
            debug!("Discarding stale history response (req_id {:?})", history.req_id);
            return None;
        }
        let req = self.outstanding.take()?;

        let ticks = match history.parse_ticks() {
            None => return Some(self.fail_request(req.id, DataAcquisitionError::MissingPrices.into())),
            Some(ticks) if ticks.is_empty() => {
                let err = DataAcquisitionError::NoParsablePrices {
                    received: history.received(),
                };
                return Some(self.fail_request(req.id, err.into()));
            }
            Some(ticks) => ticks,
        };

        let loaded = self.buffer.replace(ticks);
        self.notifier
            .success(format!("Received {} ticks for analysis.", loaded));
        self.notifier.warn(format!(
            "Starting analysis for {} on {}...",
            req.spec.kind, req.symbol
        ));

        let result = match analyze(&self.buffer, &req.spec) {
            Ok(result) => result,
            Err(e) => return Some(self.fail_request(req.id, e.into())),
        };
        let distribution = req
            .spec
            .kind
            .is_digit_based()
            .then(|| digit_distribution(&self.buffer));

        let report = AnalysisReport {
            request_id: req.id,
            symbol: req.symbol,
            contract: req.spec,
            tick_count: loaded,
            last_tick_epoch: self.buffer.ticks().last().and_then(|tick| tick.epoch),
            result,
            distribution,
        };
        self.notifier.report(report.clone());
        self.notifier.success("Analysis complete.");

        Some(RequestOutcome::Completed(report))
    }

    fn fail_request(&self, request_id: u64, error: AnalyzerError) -> RequestOutcome {
        self.notifier.failure(Some(request_id), &error);
        RequestOutcome::Failed { request_id, error }
    }

    /// Expire the handshake and the outstanding fetch when their deadlines
    /// have passed.
    pub fn check_deadlines(&mut self, now: Instant) -> Option<RequestOutcome> {
        if let SessionSignal::Failed(error) = self.session.check_deadline(now) {
            return self
                .outstanding
                .take()
                .map(|req| RequestOutcome::Failed { request_id: req.id, error });
        }

        let expired = self
            .outstanding
            .as_ref()
            .map_or(false, |req| now >= req.deadline);
        if !expired {
            return None;
        }
        let req = self.outstanding.take()?;
        let timeout = self.history_timeout;
        Some(self.fail_request(req.id, DataAcquisitionError::Timeout(timeout).into()))
    }

    /// Earliest instant at which [`Self::check_deadlines`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let request = self.outstanding.as_ref().map(|req| req.deadline);
        match (self.session.auth_deadline(), request) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn keepalive(&mut self) -> Option<RequestOutcome> {
        match self.session.keepalive() {
            Ok(()) => None,
            Err(error) => self
                .outstanding
                .take()
                .map(|req| RequestOutcome::Failed { request_id: req.id, error }),
        }
    }

    pub fn shutdown(&mut self) {
        self.outstanding = None;
        self.session.disconnect();
    }
}

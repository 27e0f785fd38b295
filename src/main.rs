mod analysis;
mod config;
mod data;
mod error;
mod monitoring;
mod orchestrator;
mod session;

use anyhow::Result;
use std::time::{Duration, Instant};
use config::{Config, EnvConfig};
use data::protocol::Credential;
use monitoring::logger::CsvLogger;
use monitoring::{console, ConnectionStatus, Notifier};
use orchestrator::{RequestOrchestrator, RequestOutcome};
use session::ws::WsTransport;
use session::SessionStateMachine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Tick analyzer starting...");

    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    tracing::info!("Loading configuration from {}", config_path);
    let config = Config::load(&config_path)?;
    let env_config = EnvConfig::load()?;

    let spec = config.analysis.contract_spec();
    tracing::info!("Symbol: {}", config.analysis.symbol);
    tracing::info!("Contract: {} (target digit {:?})", spec.kind, spec.target_digit);
    tracing::info!("Ticks per run: {} x {} run(s)", config.analysis.tick_count, config.analysis.runs);

    let journal = if config.monitoring.csv_logging {
        tracing::info!("CSV journal: {}", config.monitoring.csv_log_path);
        Some(CsvLogger::new(config.monitoring.csv_log_path.clone())?)
    } else {
        None
    };

    let (notifier, notices) = Notifier::channel();
    let presenter = tokio::spawn(console::run(notices, journal));

    let (transport, mut events) = WsTransport::new(config.endpoint(&env_config));
    let session = SessionStateMachine::new(
        transport,
        Credential::new(env_config.api_token),
        notifier.clone(),
        config.connection.auth_timeout(),
    );
    let mut orchestrator = RequestOrchestrator::new(
        session,
        config.analysis.max_ticks,
        config.connection.history_timeout(),
        notifier.clone(),
    );
    notifier.status(ConnectionStatus::offline());

    let mut remaining = config.analysis.runs.max(1);
    let issue = |orchestrator: &mut RequestOrchestrator<WsTransport>| {
        match orchestrator.run_analysis(&config.analysis.symbol, config.analysis.tick_count, spec) {
            Ok(id) => {
                tracing::debug!("Issued request {}", id);
                true
            }
            Err(e) => {
                if !e.is_session_fatal() {
                    notifier.failure(None, &e);
                }
                false
            }
        }
    };

    let mut running = issue(&mut orchestrator);

    let keepalive_every = config.connection.keepalive_interval();
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + keepalive_every.unwrap_or(Duration::from_secs(3600)),
        keepalive_every.unwrap_or(Duration::from_secs(3600)),
    );

    while running {
        let deadline = orchestrator.next_deadline();
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        let outcome = tokio::select! {
            event = events.recv() => match event {
                Some(event) => orchestrator.handle_event(event),
                None => break,
            },
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)), if deadline.is_some() => {
                orchestrator.check_deadlines(Instant::now())
            }
            _ = keepalive.tick(), if keepalive_every.is_some() => orchestrator.keepalive(),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        if let Some(outcome) = outcome {
            if let RequestOutcome::Failed { request_id, error } = &outcome {
                tracing::warn!("Request {} failed: {}", request_id, error);
            }
            remaining -= 1;
            running = remaining > 0 && issue(&mut orchestrator);
        }
    }

    tracing::info!("Shutting down...");
    orchestrator.shutdown();
    drop(orchestrator);
    drop(notifier);
    presenter.await?;

    Ok(())
}
